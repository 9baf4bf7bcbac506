//! The [`Store`] handle: any backend behind one concrete type.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::BackendKind;
use crate::error::StoreResult;
use crate::namespace::Namespace;
use crate::storage::cloud::CloudStore;
use crate::storage::dict::DictStore;
use crate::storage::file::FileStore;
use crate::storage::kv::KvStore;
use crate::storage::{Keys, ObjectQueue, ObjectSet, ObjectStore};
use crate::value::{Payload, Value};

/// A store on one of the four backends.
///
/// Cloning is cheap; clones share the underlying file or connection.
#[derive(Debug, Clone)]
pub enum Store {
    /// Embedded dictionary.
    Dict(DictStore),
    /// File per key.
    File(FileStore),
    /// Cloud object storage.
    Cloud(CloudStore),
    /// Kv service.
    Kv(KvStore),
}

macro_rules! dispatch {
    ($self:ident, $s:ident => $body:expr) => {
        match $self {
            Store::Dict($s) => $body,
            Store::File($s) => $body,
            Store::Cloud($s) => $body,
            Store::Kv($s) => $body,
        }
    };
}

impl Store {
    /// Which backend this is.
    #[must_use]
    pub const fn kind(&self) -> BackendKind {
        match self {
            Self::Dict(_) => BackendKind::Dict,
            Self::File(_) => BackendKind::File,
            Self::Cloud(_) => BackendKind::Cloud,
            Self::Kv(_) => BackendKind::Kv,
        }
    }

    /// Serialize `value` as JSON and store it.
    pub fn put_value<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StoreResult<()> {
        self.put(key, Payload::serialize(value)?)
    }

    /// Read a value and deserialize it as `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> StoreResult<T> {
        self.get(key)?.deserialize()
    }

    /// Every key below this store's prefix, collected.
    pub fn keys(&self) -> StoreResult<Vec<String>> {
        self.list("", true)?.collect()
    }

    /// Delete every key below this store's prefix. Returns how many went.
    pub fn clear(&self) -> StoreResult<usize> {
        let keys = self.keys()?;
        for key in &keys {
            match self.delete(key) {
                Err(e) if e.is_not_found() => {}
                other => other?,
            }
        }
        Ok(keys.len())
    }
}

impl ObjectStore for Store {
    fn namespace(&self) -> &Namespace {
        dispatch!(self, s => s.namespace())
    }

    fn put(&self, key: &str, payload: Payload) -> StoreResult<()> {
        dispatch!(self, s => s.put(key, payload))
    }

    fn get(&self, key: &str) -> StoreResult<Value> {
        dispatch!(self, s => s.get(key))
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        dispatch!(self, s => s.exists(key))
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        dispatch!(self, s => s.delete(key))
    }

    fn list(&self, prefix: &str, recursive: bool) -> StoreResult<Keys> {
        dispatch!(self, s => s.list(prefix, recursive))
    }

    fn sub(&self, parts: &[&str]) -> StoreResult<Store> {
        dispatch!(self, s => s.sub(parts))
    }

    fn set(&self, name: &str) -> StoreResult<Box<dyn ObjectSet>> {
        dispatch!(self, s => s.set(name))
    }

    fn queue(&self, name: &str, max_len: Option<usize>) -> StoreResult<Box<dyn ObjectQueue>> {
        dispatch!(self, s => s.queue(name, max_len))
    }
}

/// Two stores are equal when they address the same namespace on the same
/// kind of backend.
impl PartialEq for Store {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind() && self.namespace() == other.namespace()
    }
}

impl fmt::Display for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind(), self.namespace())
    }
}

impl From<DictStore> for Store {
    fn from(store: DictStore) -> Self {
        Self::Dict(store)
    }
}

impl From<FileStore> for Store {
    fn from(store: FileStore) -> Self {
        Self::File(store)
    }
}

impl From<CloudStore> for Store {
    fn from(store: CloudStore) -> Self {
        Self::Cloud(store)
    }
}

impl From<KvStore> for Store {
    fn from(store: KvStore) -> Self {
        Self::Kv(store)
    }
}
