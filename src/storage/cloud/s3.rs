//! S3-compatible client over the blocking `rust-s3` API.

use std::time::Duration;

use s3::bucket::Bucket;
use s3::bucket_ops::BucketConfiguration;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::region::Region;

use super::client::{ListPage, ObjectClient, ObjectInfo, RemoteObject};
use crate::error::{StoreError, StoreResult};

/// Connection parameters for an S3-compatible service.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Service URL.
    pub endpoint: String,
    /// Region, `us-east-1` when unset.
    pub region: Option<String>,
    /// Access key.
    pub access_key: Option<String>,
    /// Secret key.
    pub secret_key: Option<String>,
}

/// Client for S3 and S3-compatible services (MinIO, R2, Spaces).
///
/// Uses path-style addressing so it works against any endpoint.
#[derive(Debug, Clone)]
pub struct S3Client {
    endpoint: String,
    region: Region,
    credentials: Credentials,
}

impl S3Client {
    /// Build a client. No request is made until first use.
    pub fn new(config: &S3Config) -> StoreResult<Self> {
        let credentials = Credentials::new(
            config.access_key.as_deref(),
            config.secret_key.as_deref(),
            None,
            None,
            None,
        )
        .map_err(|e| StoreError::backend(format!("s3 credentials: {e}")))?;
        let region = Region::Custom {
            region: config
                .region
                .clone()
                .unwrap_or_else(|| "us-east-1".to_string()),
            endpoint: config.endpoint.clone(),
        };
        Ok(Self {
            endpoint: config.endpoint.clone(),
            region,
            credentials,
        })
    }

    fn bucket(&self, name: &str) -> StoreResult<Box<Bucket>> {
        Bucket::new(name, self.region.clone(), self.credentials.clone())
            .map(|b| b.with_path_style())
            .map_err(backend_err)
    }
}

fn backend_err(err: S3Error) -> StoreError {
    StoreError::backend(format!("s3: {err}"))
}

const fn is_missing(err: &S3Error) -> bool {
    matches!(err, S3Error::HttpFailWithBody(404, _))
}

impl ObjectClient for S3Client {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn create_bucket(&self, bucket: &str) -> StoreResult<bool> {
        match Bucket::create_with_path_style(
            bucket,
            self.region.clone(),
            self.credentials.clone(),
            BucketConfiguration::default(),
        ) {
            Ok(response) => Ok(response.success()),
            // 409: BucketAlreadyOwnedByYou / BucketAlreadyExists
            Err(S3Error::HttpFailWithBody(409, _)) => Ok(false),
            Err(e) => Err(backend_err(e)),
        }
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
        content_encoding: Option<&str>,
    ) -> StoreResult<()> {
        let mut target = self.bucket(bucket)?;
        if let Some(encoding) = content_encoding {
            target.add_header("Content-Encoding", encoding);
        }
        target
            .put_object_with_content_type(key, &bytes, content_type)
            .map(|_| ())
            .map_err(backend_err)
    }

    fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Option<RemoteObject>> {
        match self.bucket(bucket)?.get_object(key) {
            Ok(response) => {
                let headers = response.headers();
                let content_type = headers
                    .get("content-type")
                    .cloned()
                    .unwrap_or_else(|| crate::codec::OCTET_STREAM.to_string());
                let content_encoding = headers.get("content-encoding").cloned();
                Ok(Some(RemoteObject {
                    bytes: response.bytes().to_vec(),
                    content_type,
                    content_encoding,
                }))
            }
            Err(e) if is_missing(&e) => Ok(None),
            Err(e) => Err(backend_err(e)),
        }
    }

    fn head_object(&self, bucket: &str, key: &str) -> StoreResult<bool> {
        match self.bucket(bucket)?.head_object(key) {
            Ok((_, status)) => Ok(status == 200),
            Err(e) if is_missing(&e) => Ok(false),
            Err(e) => Err(backend_err(e)),
        }
    }

    fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        match self.bucket(bucket)?.delete_object(key) {
            Ok(_) => Ok(()),
            Err(e) if is_missing(&e) => Ok(()),
            Err(e) => Err(backend_err(e)),
        }
    }

    fn list_page(&self, bucket: &str, prefix: &str, token: Option<&str>) -> StoreResult<ListPage> {
        let (result, _) = self
            .bucket(bucket)?
            .list_page(
                prefix.to_string(),
                None,
                token.map(str::to_string),
                None,
                None,
            )
            .map_err(backend_err)?;

        let objects = result
            .contents
            .into_iter()
            .map(|o| ObjectInfo {
                key: o.key,
                size: o.size,
                last_modified: chrono::DateTime::parse_from_rfc3339(&o.last_modified)
                    .map(|t| t.with_timezone(&chrono::Utc))
                    .unwrap_or_default(),
            })
            .collect();
        let next = if result.is_truncated {
            result.next_continuation_token
        } else {
            None
        };
        Ok(ListPage { objects, next })
    }

    fn presign_get(&self, bucket: &str, key: &str, expires: Duration) -> StoreResult<String> {
        let secs = u32::try_from(expires.as_secs())
            .map_err(|_| StoreError::backend("presign expiry too large"))?;
        self.bucket(bucket)?
            .presign_get(key, secs, None)
            .map_err(backend_err)
    }
}
