//! Cloud object store backend.
//!
//! [`CloudStore`] speaks to any service behind the [`ObjectClient`] trait:
//! [`MemoryObjectService`] in-process, or [`S3Client`] with the `s3` feature.

mod client;
mod memory;
#[cfg(feature = "s3")]
mod s3;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

pub use client::{ListPage, ObjectClient, ObjectInfo, RemoteObject};
pub use memory::MemoryObjectService;
#[cfg(feature = "s3")]
pub use s3::{S3Client, S3Config};

use crate::codec;
use crate::error::{StoreError, StoreResult};
use crate::namespace::{join_path, Namespace};
use crate::storage::{Keys, ObjectStore};
use crate::store::Store;
use crate::value::{Payload, Value};

/// Default lifetime of a presigned URL: one week.
pub const DEFAULT_PRESIGN_EXPIRY: Duration = Duration::from_secs(60 * 60 * 24 * 7);

/// Store backed by a cloud object service.
#[derive(Debug, Clone)]
pub struct CloudStore {
    ns: Namespace,
    client: Arc<dyn ObjectClient>,
}

impl CloudStore {
    /// Open a bucket, creating it if the service doesn't have it yet.
    ///
    /// A bucket of the form `name/extra` addresses bucket `name` with `extra`
    /// placed in front of `prefix`.
    pub fn open(client: Arc<dyn ObjectClient>, bucket: &str, prefix: &str) -> StoreResult<Self> {
        let (bucket, extra) = bucket.split_once('/').unwrap_or((bucket, ""));
        let ns = Namespace::new(bucket, &join_path([extra, prefix]))?;
        if client.create_bucket(ns.bucket())? {
            tracing::info!(bucket = ns.bucket(), endpoint = client.endpoint(), "created bucket");
        }
        Ok(Self { ns, client })
    }

    /// Client this store talks to.
    #[must_use]
    pub fn client(&self) -> &Arc<dyn ObjectClient> {
        &self.client
    }

    /// A time-limited URL that reads `key` without credentials.
    pub fn presigned_url(&self, key: &str, expires: Duration) -> StoreResult<String> {
        self.client
            .presign_get(self.ns.bucket(), &self.ns.join(key), expires)
    }

    /// Virtual-hosted style URL of an object in a public bucket.
    #[must_use]
    pub fn public_url(&self, key: &str) -> String {
        format!(
            "http://{}.{}/{}",
            self.ns.bucket(),
            client::endpoint_host(self.client.endpoint()),
            self.ns.join(key)
        )
    }

    /// Write already-encoded bytes with an explicit content type.
    pub fn put_bytes(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> StoreResult<()> {
        self.put_raw(key, bytes, content_type, None)
    }

    /// Write already-encoded bytes with a content type and content encoding.
    pub fn put_raw(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
        content_encoding: Option<&str>,
    ) -> StoreResult<()> {
        let path = self.ns.join(key);
        tracing::debug!(bucket = self.ns.bucket(), key = %path, size = bytes.len(), content_type, "cloud put");
        self.client
            .put_object(self.ns.bucket(), &path, bytes, content_type, content_encoding)
    }
}

impl ObjectStore for CloudStore {
    fn namespace(&self) -> &Namespace {
        &self.ns
    }

    fn put(&self, key: &str, payload: Payload) -> StoreResult<()> {
        let encoded = codec::encode(payload)?;
        self.put_bytes(key, encoded.bytes, &encoded.content_type)
    }

    fn get(&self, key: &str) -> StoreResult<Value> {
        let path = self.ns.join(key);
        let object = self
            .client
            .get_object(self.ns.bucket(), &path)?
            .ok_or_else(|| StoreError::not_found(self.ns.bucket(), &path))?;
        codec::decode_remote(
            object.bytes,
            &object.content_type,
            object.content_encoding.as_deref(),
            &path,
        )
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        self.client.head_object(self.ns.bucket(), &self.ns.join(key))
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        let path = self.ns.join(key);
        tracing::debug!(bucket = self.ns.bucket(), key = %path, "cloud delete");
        self.client.delete_object(self.ns.bucket(), &path)
    }

    fn list(&self, prefix: &str, recursive: bool) -> StoreResult<Keys> {
        let scope = self.ns.scope(prefix, recursive)?;
        let pages = Pages {
            client: Arc::clone(&self.client),
            bucket: self.ns.bucket().to_string(),
            prefix: scope.matched().to_string(),
            token: None,
            buffered: VecDeque::new(),
            done: false,
        };
        Ok(scope.apply(pages))
    }

    fn sub(&self, parts: &[&str]) -> StoreResult<Store> {
        Ok(Store::Cloud(Self {
            ns: self.ns.child(parts),
            client: Arc::clone(&self.client),
        }))
    }
}

/// Pulls listing pages only when the previous one is used up.
struct Pages {
    client: Arc<dyn ObjectClient>,
    bucket: String,
    prefix: String,
    token: Option<String>,
    buffered: VecDeque<String>,
    done: bool,
}

impl Iterator for Pages {
    type Item = StoreResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.buffered.is_empty() {
            if self.done {
                return None;
            }
            match self
                .client
                .list_page(&self.bucket, &self.prefix, self.token.as_deref())
            {
                Ok(page) => {
                    self.buffered.extend(page.objects.into_iter().map(|o| o.key));
                    self.token = page.next;
                    self.done = self.token.is_none();
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        self.buffered.pop_front().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn store(service: &Arc<MemoryObjectService>, bucket: &str) -> CloudStore {
        let client: Arc<dyn ObjectClient> = service.clone();
        CloudStore::open(client, bucket, "").unwrap()
    }

    #[test]
    fn test_open_creates_bucket() {
        let svc = Arc::new(MemoryObjectService::new("cloud-open"));
        store(&svc, "fresh");
        assert_eq!(svc.buckets().unwrap(), vec!["fresh".to_string()]);
    }

    #[test]
    fn test_bucket_with_path_splits() {
        let svc = Arc::new(MemoryObjectService::new("cloud-split"));
        let client: Arc<dyn ObjectClient> = svc.clone();
        let s = CloudStore::open(client, "media/archive", "2024").unwrap();
        assert_eq!(s.namespace().bucket(), "media");
        assert_eq!(s.namespace().prefix(), "archive/2024");

        s.put("a", "x".into()).unwrap();
        assert!(svc.head_object("media", "archive/2024/a").unwrap());
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let svc = Arc::new(MemoryObjectService::new("cloud-del"));
        let s = store(&svc, "b");
        s.delete("never-written").unwrap();
    }

    #[test]
    fn test_gzip_transparent() {
        let svc = Arc::new(MemoryObjectService::new("cloud-gz"));
        let s = store(&svc, "b");

        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"log line").unwrap();
        let gz = enc.finish().unwrap();

        s.put_raw("log", gz.clone(), codec::TEXT_UTF8, Some("gzip")).unwrap();
        assert_eq!(s.get("log").unwrap(), Value::Bytes(b"log line".to_vec()));

        s.put_bytes("dump.gz", gz, codec::OCTET_STREAM).unwrap();
        assert_eq!(s.get("dump.gz").unwrap(), Value::Bytes(b"log line".to_vec()));
    }

    #[test]
    fn test_unknown_content_type() {
        let svc = Arc::new(MemoryObjectService::new("cloud-ct"));
        let s = store(&svc, "b");
        s.put_bytes("img", vec![0x89, b'P'], "image/png").unwrap();
        assert!(matches!(
            s.get("img"),
            Err(StoreError::UnsupportedContentType { .. })
        ));
    }

    #[test]
    fn test_listing_spans_pages() {
        let svc = Arc::new(MemoryObjectService::new("cloud-pages").with_page_size(3));
        let s = store(&svc, "b");
        for i in 0..10 {
            s.put(&format!("k{i:02}"), "v".into()).unwrap();
        }
        let keys: Vec<_> = s.list("", true).unwrap().map(Result::unwrap).collect();
        assert_eq!(keys.len(), 10);
        assert_eq!(keys[0], "k00");
        assert_eq!(keys[9], "k09");
    }

    #[test]
    fn test_urls() {
        let svc = Arc::new(MemoryObjectService::new("cloud-url"));
        let s = CloudStore::open(svc.clone(), "pub", "assets").unwrap();
        s.put("logo", "svg".into()).unwrap();

        assert_eq!(s.public_url("logo"), "http://pub.cloud-url/assets/logo");

        let url = s.presigned_url("logo", Duration::from_secs(30)).unwrap();
        assert_eq!(svc.fetch_presigned(&url).unwrap(), b"svg");
    }
}
