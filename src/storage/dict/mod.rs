//! Embedded dictionary backend.
//!
//! Every key of a bucket lives in a single append-only file,
//! `<path>/<bucket>.dict`. Values are stored as packed codec envelopes.

mod log;
mod record;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use log::{CompactionStats, DictFile};

use crate::codec;
use crate::error::{StoreError, StoreResult};
use crate::namespace::Namespace;
use crate::storage::{Keys, ObjectStore};
use crate::store::Store;
use crate::value::{Payload, Value};

/// Store backed by an embedded dictionary file.
///
/// Sub-stores share the parent's [`DictFile`]. Separate handles opened on the
/// same file, in this process or another, see each other's writes.
#[derive(Debug, Clone)]
pub struct DictStore {
    ns: Namespace,
    dir: PathBuf,
    file: Arc<DictFile>,
}

impl DictStore {
    /// Open the dictionary for `ns.bucket()` under `dir`, creating it if absent.
    pub fn open(dir: &Path, ns: Namespace, sync_on_write: bool) -> StoreResult<Self> {
        fs::create_dir_all(dir)?;
        let file = DictFile::open(&dir.join(format!("{}.dict", ns.bucket())), sync_on_write)?;
        Ok(Self {
            ns,
            dir: dir.to_path_buf(),
            file: Arc::new(file),
        })
    }

    /// Directory holding the dictionary files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Rewrite the dictionary file, dropping overwritten and deleted entries.
    pub fn compact(&self) -> StoreResult<CompactionStats> {
        self.file.compact()
    }

    fn child(&self, ns: Namespace) -> Self {
        Self {
            ns,
            dir: self.dir.clone(),
            file: Arc::clone(&self.file),
        }
    }
}

impl ObjectStore for DictStore {
    fn namespace(&self) -> &Namespace {
        &self.ns
    }

    fn put(&self, key: &str, payload: Payload) -> StoreResult<()> {
        let path = self.ns.join(key);
        let packed = codec::encode_packed(payload)?;
        tracing::debug!(bucket = self.ns.bucket(), key = %path, size = packed.len(), "dict put");
        self.file.put(&path, packed)
    }

    fn get(&self, key: &str) -> StoreResult<Value> {
        let path = self.ns.join(key);
        match self.file.get(&path)? {
            Some(buf) => codec::decode_packed(&buf),
            None => Err(StoreError::not_found(self.ns.bucket(), path)),
        }
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        self.file.contains(&self.ns.join(key))
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        let path = self.ns.join(key);
        if self.file.remove(&path)? {
            tracing::debug!(bucket = self.ns.bucket(), key = %path, "dict delete");
            Ok(())
        } else {
            Err(StoreError::not_found(self.ns.bucket(), path))
        }
    }

    fn list(&self, prefix: &str, recursive: bool) -> StoreResult<Keys> {
        let scope = self.ns.scope(prefix, recursive)?;
        let keys = self.file.keys()?;
        Ok(scope.apply(keys.into_iter().map(Ok)))
    }

    fn sub(&self, parts: &[&str]) -> StoreResult<Store> {
        Ok(Store::Dict(self.child(self.ns.child(parts))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store(dir: &Path) -> DictStore {
        DictStore::open(dir, Namespace::new("test", "root").unwrap(), false).unwrap()
    }

    #[test]
    fn test_file_location() {
        let dir = tempdir().unwrap();
        let s = store(dir.path());
        s.put("k", "v".into()).unwrap();
        assert!(dir.path().join("test.dict").exists());
    }

    #[test]
    fn test_missing_delete_is_not_found() {
        let dir = tempdir().unwrap();
        let err = store(dir.path()).delete("nope").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_sub_shares_file() {
        let dir = tempdir().unwrap();
        let s = store(dir.path());
        let child = s.sub(&["child"]).unwrap();
        child.put("k", "v".into()).unwrap();

        assert_eq!(s.get("child/k").unwrap(), Value::from("v"));
    }

    #[test]
    fn test_independent_handles() {
        let dir = tempdir().unwrap();
        let a = store(dir.path());
        let b = store(dir.path());

        a.put("shared", "from a".into()).unwrap();
        assert_eq!(b.get("shared").unwrap(), Value::from("from a"));
        b.delete("shared").unwrap();
        assert!(!a.exists("shared").unwrap());
    }

    #[test]
    fn test_compact_keeps_values() {
        let dir = tempdir().unwrap();
        let s = store(dir.path());
        for i in 0..10 {
            s.put("k", Value::Json(serde_json::json!(i)).into()).unwrap();
        }
        let stats = s.compact().unwrap();
        assert_eq!(stats.live_keys, 1);
        assert_eq!(s.get("k").unwrap(), Value::Json(serde_json::json!(9)));
    }
}
