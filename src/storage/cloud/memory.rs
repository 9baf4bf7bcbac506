//! In-process object service.
//!
//! Behaves like a small S3: buckets must exist before writes, listings come
//! back in key order one page at a time, and presigned URLs carry an expiry
//! and a keyed blake3 signature.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use super::client::{ListPage, ObjectClient, ObjectInfo, RemoteObject};
use crate::error::{lock_err, StoreError, StoreResult};

const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
    content_encoding: Option<String>,
    last_modified: DateTime<Utc>,
}

type Buckets = BTreeMap<String, BTreeMap<String, StoredObject>>;

/// An object service held entirely in memory.
#[derive(Debug)]
pub struct MemoryObjectService {
    name: String,
    endpoint: String,
    page_size: usize,
    signing_key: [u8; 32],
    buckets: Mutex<Buckets>,
}

impl MemoryObjectService {
    /// Create an empty service. `name` identifies it in URLs.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            endpoint: format!("memory://{name}"),
            page_size: DEFAULT_PAGE_SIZE,
            signing_key: *blake3::hash(uuid::Uuid::new_v4().as_bytes()).as_bytes(),
            buckets: Mutex::new(BTreeMap::new()),
        }
    }

    /// Limit listings to `page_size` keys per page.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Names of existing buckets.
    pub fn buckets(&self) -> StoreResult<Vec<String>> {
        let buckets = self.buckets.lock().map_err(|_| lock_err("object service"))?;
        Ok(buckets.keys().cloned().collect())
    }

    /// Resolve a URL produced by [`ObjectClient::presign_get`].
    ///
    /// # Errors
    /// `Backend` if the signature is wrong or the URL has expired.
    pub fn fetch_presigned(&self, url: &str) -> StoreResult<Vec<u8>> {
        let rest = url
            .strip_prefix(&format!("{}/", self.endpoint))
            .ok_or_else(|| StoreError::backend(format!("URL is not for {}: {url}", self.name)))?;
        let (path, query) = rest
            .split_once('?')
            .ok_or_else(|| StoreError::backend("presigned URL has no query"))?;
        let (bucket, key) = path
            .split_once('/')
            .ok_or_else(|| StoreError::backend("presigned URL has no key"))?;

        let mut expires = None;
        let mut signature = None;
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("expires", v)) => expires = v.parse::<i64>().ok(),
                Some(("signature", v)) => signature = Some(v),
                _ => {}
            }
        }
        let expires = expires.ok_or_else(|| StoreError::backend("presigned URL has no expiry"))?;
        let signature =
            signature.ok_or_else(|| StoreError::backend("presigned URL has no signature"))?;

        if self.sign(bucket, key, expires) != signature {
            return Err(StoreError::backend("presigned URL signature mismatch"));
        }
        let deadline = Utc
            .timestamp_opt(expires, 0)
            .single()
            .ok_or_else(|| StoreError::backend("presigned URL expiry out of range"))?;
        if Utc::now() > deadline {
            return Err(StoreError::backend("presigned URL expired"));
        }

        self.get_object(bucket, key)?
            .map(|obj| obj.bytes)
            .ok_or_else(|| StoreError::not_found(bucket, key))
    }

    fn sign(&self, bucket: &str, key: &str, expires: i64) -> String {
        let mut hasher = blake3::Hasher::new_keyed(&self.signing_key);
        hasher.update(bucket.as_bytes());
        hasher.update(b"/");
        hasher.update(key.as_bytes());
        hasher.update(&expires.to_le_bytes());
        hasher.finalize().to_hex().to_string()
    }

    fn with_bucket<T>(
        &self,
        bucket: &str,
        f: impl FnOnce(&mut BTreeMap<String, StoredObject>) -> T,
    ) -> StoreResult<T> {
        let mut buckets = self.buckets.lock().map_err(|_| lock_err("object service"))?;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| StoreError::backend(format!("NoSuchBucket: {bucket}")))?;
        Ok(f(objects))
    }
}

impl ObjectClient for MemoryObjectService {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn create_bucket(&self, bucket: &str) -> StoreResult<bool> {
        let mut buckets = self.buckets.lock().map_err(|_| lock_err("object service"))?;
        if buckets.contains_key(bucket) {
            return Ok(false);
        }
        buckets.insert(bucket.to_string(), BTreeMap::new());
        Ok(true)
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
        content_encoding: Option<&str>,
    ) -> StoreResult<()> {
        let object = StoredObject {
            bytes,
            content_type: content_type.to_string(),
            content_encoding: content_encoding.map(str::to_string),
            last_modified: Utc::now(),
        };
        self.with_bucket(bucket, |objects| {
            objects.insert(key.to_string(), object);
        })
    }

    fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Option<RemoteObject>> {
        self.with_bucket(bucket, |objects| {
            objects.get(key).map(|o| RemoteObject {
                bytes: o.bytes.clone(),
                content_type: o.content_type.clone(),
                content_encoding: o.content_encoding.clone(),
            })
        })
    }

    fn head_object(&self, bucket: &str, key: &str) -> StoreResult<bool> {
        self.with_bucket(bucket, |objects| objects.contains_key(key))
    }

    fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        self.with_bucket(bucket, |objects| {
            objects.remove(key);
        })
    }

    fn list_page(&self, bucket: &str, prefix: &str, token: Option<&str>) -> StoreResult<ListPage> {
        let page_size = self.page_size;
        self.with_bucket(bucket, |objects| {
            let start = match token {
                Some(after) => Bound::Excluded(after.to_string()),
                None => Bound::Included(prefix.to_string()),
            };
            let mut page: Vec<ObjectInfo> = objects
                .range((start, Bound::Unbounded))
                .take_while(|(k, _)| k.starts_with(prefix))
                .take(page_size + 1)
                .map(|(k, o)| ObjectInfo {
                    key: k.clone(),
                    size: o.bytes.len() as u64,
                    last_modified: o.last_modified,
                })
                .collect();

            let next = if page.len() > page_size {
                page.truncate(page_size);
                page.last().map(|o| o.key.clone())
            } else {
                None
            };
            ListPage {
                objects: page,
                next,
            }
        })
    }

    fn presign_get(&self, bucket: &str, key: &str, expires: Duration) -> StoreResult<String> {
        let ttl = chrono::Duration::from_std(expires)
            .map_err(|e| StoreError::backend(format!("presign expiry out of range: {e}")))?;
        let deadline = (Utc::now() + ttl).timestamp();
        Ok(format!(
            "{}/{bucket}/{key}?expires={deadline}&signature={}",
            self.endpoint,
            self.sign(bucket, key, deadline)
        ))
    }
}
