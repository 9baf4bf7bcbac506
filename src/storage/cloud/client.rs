//! The seam between [`CloudStore`](super::CloudStore) and an object storage service.

use std::fmt::Debug;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::StoreResult;

/// An object as returned by a GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    /// Object body.
    pub bytes: Vec<u8>,
    /// Stored content type.
    pub content_type: String,
    /// Stored content encoding, if any.
    pub content_encoding: Option<String>,
}

/// Metadata for one listed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Bucket-relative key.
    pub key: String,
    /// Body size in bytes.
    pub size: u64,
    /// Last write time.
    pub last_modified: DateTime<Utc>,
}

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Objects on this page.
    pub objects: Vec<ObjectInfo>,
    /// Continuation token for the next page, if any.
    pub next: Option<String>,
}

/// Operations a cloud object service must provide.
///
/// Implementations report a missing object as `Ok(None)`/`Ok(false)` and
/// any service failure as `StoreError::Backend`.
pub trait ObjectClient: Send + Sync + Debug {
    /// Base URL of the service, used for public URLs.
    fn endpoint(&self) -> &str;

    /// Create a bucket. Returns `false` if it already existed.
    fn create_bucket(&self, bucket: &str) -> StoreResult<bool>;

    /// Write an object.
    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
        content_encoding: Option<&str>,
    ) -> StoreResult<()>;

    /// Read an object; `None` when absent.
    fn get_object(&self, bucket: &str, key: &str) -> StoreResult<Option<RemoteObject>>;

    /// Whether an object exists.
    fn head_object(&self, bucket: &str, key: &str) -> StoreResult<bool>;

    /// Delete an object. Deleting a missing object is not an error.
    fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()>;

    /// Fetch one page of keys starting with `prefix`, in key order.
    fn list_page(&self, bucket: &str, prefix: &str, token: Option<&str>) -> StoreResult<ListPage>;

    /// A time-limited URL that reads one object without credentials.
    fn presign_get(&self, bucket: &str, key: &str, expires: Duration) -> StoreResult<String>;
}

/// Host part of an endpoint URL: `http://minio:9000/x` gives `minio:9000`.
pub(crate) fn endpoint_host(endpoint: &str) -> &str {
    let rest = endpoint
        .split_once("://")
        .map_or(endpoint, |(_, rest)| rest);
    rest.split('/').next().unwrap_or(rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_host() {
        assert_eq!(endpoint_host("http://minio:9000"), "minio:9000");
        assert_eq!(endpoint_host("https://s3.example.com/base/"), "s3.example.com");
        assert_eq!(endpoint_host("memory://test"), "test");
        assert_eq!(endpoint_host("bare.host"), "bare.host");
    }
}
