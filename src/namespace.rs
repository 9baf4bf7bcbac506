//! Hierarchical key namespaces.
//!
//! A store is addressed by `(bucket, prefix)`. Keys passed to store operations
//! are relative to the prefix; the backend sees `prefix/key` inside the bucket.

use std::collections::HashSet;
use std::fmt;

use crate::error::{StoreError, StoreResult};

/// Join path fragments with `/`, dropping empty segments.
///
/// Each fragment may itself contain slashes, so `join_path(["a/b", "c"])`
/// and `join_path(["a", "b/c"])` agree.
///
/// ```
/// use kyrostore::namespace::join_path;
///
/// assert_eq!(join_path(["a/", "/b", "", "c"]), "a/b/c");
/// ```
pub fn join_path<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for part in parts {
        for seg in part.as_ref().split('/').filter(|s| !s.is_empty()) {
            if !out.is_empty() {
                out.push('/');
            }
            out.push_str(seg);
        }
    }
    out
}

/// The `(bucket, prefix)` identity of a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    bucket: String,
    prefix: String,
}

impl Namespace {
    /// Create a namespace, validating the bucket name.
    ///
    /// # Errors
    /// `InvalidBucketName` if the bucket is empty or contains `_`.
    pub fn new(bucket: impl Into<String>, prefix: &str) -> StoreResult<Self> {
        let bucket = bucket.into();
        if bucket.is_empty() || bucket.contains('_') {
            return Err(StoreError::InvalidBucketName { bucket });
        }
        Ok(Self {
            bucket,
            prefix: join_path([prefix]),
        })
    }

    /// Bucket name.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Normalized prefix, empty at the bucket root.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// A namespace with the same bucket and a longer prefix.
    #[must_use]
    pub fn child(&self, parts: &[&str]) -> Self {
        Self {
            bucket: self.bucket.clone(),
            prefix: join_path(std::iter::once(self.prefix.as_str()).chain(parts.iter().copied())),
        }
    }

    /// Bucket-relative path of a key.
    #[must_use]
    pub fn join(&self, key: &str) -> String {
        join_path([self.prefix.as_str(), key])
    }

    /// `bucket/prefix/key`, the flat form used by the kv service.
    #[must_use]
    pub fn join_bucket(&self, key: &str) -> String {
        join_path([self.bucket.as_str(), self.prefix.as_str(), key])
    }

    /// Strip this namespace's prefix from a bucket-relative path.
    #[must_use]
    pub fn relative<'a>(&self, path: &'a str) -> Option<&'a str> {
        if self.prefix.is_empty() {
            return Some(path);
        }
        path.strip_prefix(self.prefix.as_str())?.strip_prefix('/')
    }

    /// Work out which bucket-relative paths a `list(prefix, recursive)` call covers.
    ///
    /// # Errors
    /// `InvalidKey` if `prefix` or the store prefix has a `.` or `..` segment.
    pub fn scope(&self, prefix: &str, recursive: bool) -> StoreResult<ListScope> {
        let mut segments = self.prefix.split('/').chain(prefix.split('/'));
        if segments.any(|seg| seg == "." || seg == "..") {
            return Err(StoreError::InvalidKey {
                key: prefix.to_string(),
                reason: "relative path segments are not allowed".to_string(),
            });
        }

        let strip = if self.prefix.is_empty() {
            0
        } else {
            self.prefix.len() + 1
        };

        if let Some(raw) = prefix.strip_suffix('*') {
            // raw name match: "P/ab*" covers "P/abc" and "P/ab/x"
            let mut matched = self.join(raw);
            if (raw.is_empty() || raw.ends_with('/')) && !matched.is_empty() {
                matched.push('/');
            }
            let base = matched.rfind('/').map_or(0, |i| i + 1);
            return Ok(ListScope {
                matched,
                strip,
                base: base.max(strip),
                recursive,
            });
        }

        let mut matched = self.join(prefix);
        if !matched.is_empty() {
            matched.push('/');
        }
        Ok(ListScope {
            base: matched.len(),
            matched,
            strip,
            recursive,
        })
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.bucket, self.prefix)
    }
}

/// The filter behind a listing.
///
/// `matched` is the bucket-relative string every listed path starts with.
/// Listed keys are made relative to the store prefix; in non-recursive mode
/// anything below `base` collapses to a single `dir/` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListScope {
    matched: String,
    strip: usize,
    base: usize,
    recursive: bool,
}

impl ListScope {
    /// The literal prefix to hand to a backend's own listing call.
    #[must_use]
    pub fn matched(&self) -> &str {
        &self.matched
    }

    /// Map a bucket-relative path to the key a listing yields, if any.
    #[must_use]
    pub fn accept(&self, path: &str) -> Option<String> {
        if !path.starts_with(self.matched.as_str()) || path.len() <= self.base {
            return None;
        }
        let rest = &path[self.base..];
        let head = &path[self.strip..self.base];
        if !self.recursive {
            if let Some(i) = rest.find('/') {
                return Some(format!("{head}{}", &rest[..=i]));
            }
        }
        Some(format!("{head}{rest}"))
    }

    /// Filter a stream of bucket-relative paths into listed keys.
    ///
    /// Collapsed directory entries are reported once.
    pub fn apply<'a, I>(self, paths: I) -> Box<dyn Iterator<Item = StoreResult<String>> + Send + 'a>
    where
        I: Iterator<Item = StoreResult<String>> + Send + 'a,
    {
        let mut seen_dirs = HashSet::new();
        Box::new(paths.filter_map(move |path| match path {
            Err(e) => Some(Err(e)),
            Ok(path) => {
                let key = self.accept(&path)?;
                if key.ends_with('/') && !seen_dirs.insert(key.clone()) {
                    return None;
                }
                Some(Ok(key))
            }
        }))
    }
}
