//! File-per-key backend.
//!
//! Each key is one file at `<path>/<bucket>/<prefix>/<key>` holding a packed
//! codec envelope. Writes land in a uniquely named sibling and are renamed
//! into place.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;
use walkdir::WalkDir;

use crate::codec;
use crate::error::{StoreError, StoreResult};
use crate::namespace::Namespace;
use crate::storage::{Keys, ObjectStore};
use crate::store::Store;
use crate::value::{Payload, Value};

const TMP_MARKER: &str = ".kstmp-";

/// Store backed by one file per key.
#[derive(Debug, Clone)]
pub struct FileStore {
    ns: Namespace,
    root: PathBuf,
}

impl FileStore {
    /// Open the bucket directory under `path`, creating it if absent.
    pub fn open(path: &Path, ns: Namespace) -> StoreResult<Self> {
        let root = path.join(ns.bucket());
        fs::create_dir_all(&root)?;
        Ok(Self { ns, root })
    }

    /// The bucket directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path of a key.
    pub fn file_path(&self, key: &str) -> StoreResult<PathBuf> {
        let rel = self.ns.join(key);
        if rel.is_empty() {
            return Err(StoreError::InvalidKey {
                key: key.to_string(),
                reason: "empty key".to_string(),
            });
        }
        if rel.split('/').any(|seg| seg == "." || seg == "..") {
            return Err(StoreError::InvalidKey {
                key: key.to_string(),
                reason: "relative path segments are not allowed".to_string(),
            });
        }
        if rel.contains(TMP_MARKER) {
            return Err(StoreError::InvalidKey {
                key: key.to_string(),
                reason: format!("keys may not contain '{TMP_MARKER}'"),
            });
        }
        Ok(self.root.join(rel))
    }

    fn read(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let path = self.file_path(key)?;
        match fs::read(&path) {
            Ok(buf) => Ok(Some(buf)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            // a directory at the key's path means "no such object"
            Err(_) if path.is_dir() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl ObjectStore for FileStore {
    fn namespace(&self) -> &Namespace {
        &self.ns
    }

    fn put(&self, key: &str, payload: Payload) -> StoreResult<()> {
        let path = self.file_path(key)?;
        let packed = codec::encode_packed(payload)?;

        let parent = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent)?;

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let tmp = parent.join(format!("{name}{TMP_MARKER}{}", Uuid::new_v4().simple()));
        let written = fs::File::create(&tmp).and_then(|mut f| {
            f.write_all(&packed)?;
            f.sync_all()
        });
        if let Err(e) = written.and_then(|()| fs::rename(&tmp, &path)) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        tracing::debug!(path = %path.display(), size = packed.len(), "file put");
        Ok(())
    }

    fn get(&self, key: &str) -> StoreResult<Value> {
        match self.read(key)? {
            Some(buf) => codec::decode_packed(&buf),
            None => Err(StoreError::not_found(self.ns.bucket(), self.ns.join(key))),
        }
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.file_path(key)?.is_file())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        let path = self.file_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "file delete");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound || path.is_dir() => {
                Err(StoreError::not_found(self.ns.bucket(), self.ns.join(key)))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, prefix: &str, recursive: bool) -> StoreResult<Keys> {
        let scope = self.ns.scope(prefix, recursive)?;
        let root = self.root.clone();

        // walk from the deepest directory the scope pins down
        let fixed = match scope.matched().rfind('/') {
            Some(i) => &scope.matched()[..i],
            None => "",
        };
        let start = root.join(fixed);
        if !start.is_dir() {
            return Ok(Box::new(std::iter::empty()));
        }

        let paths = WalkDir::new(start)
            .sort_by_file_name()
            .into_iter()
            .filter_map(move |entry| match entry {
                Err(e) => Some(Err(StoreError::backend(format!("directory walk: {e}")))),
                Ok(entry) if !entry.file_type().is_file() => None,
                Ok(entry) => {
                    let rel = entry.path().strip_prefix(&root).ok()?;
                    let rel = rel
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    (!rel.contains(TMP_MARKER)).then_some(Ok(rel))
                }
            });
        Ok(scope.apply(paths))
    }

    fn sub(&self, parts: &[&str]) -> StoreResult<Store> {
        Ok(Store::File(Self {
            ns: self.ns.child(parts),
            root: self.root.clone(),
        }))
    }
}
