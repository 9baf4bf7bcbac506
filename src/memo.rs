//! Memoize computed values in a store.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreResult;
use crate::storage::ObjectStore;
use crate::store::Store;
use crate::value::{BinaryObject, Value};

const MEMO_DIR: &str = "memo";

/// Caches function results under `memo/<name>-<args hash>`.
///
/// The key covers the function name and the serialized arguments only;
/// anything else the computation depends on is not part of it.
#[derive(Debug, Clone)]
pub struct Memo {
    store: Store,
}

impl Memo {
    /// Memoize into `store`.
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// The key a call with `args` is cached under.
    pub fn key<A: Serialize + ?Sized>(name: &str, args: &A) -> StoreResult<String> {
        let encoded = serde_json::to_vec(args)?;
        let digest = blake3::hash(&encoded);
        Ok(format!("{MEMO_DIR}/{name}-{}", digest.to_hex()))
    }

    /// The cached result for `(name, args)`, computing and storing it first
    /// if there is none.
    pub fn get_or_insert_with<A, T, F>(&self, name: &str, args: &A, compute: F) -> StoreResult<T>
    where
        A: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        let key = Self::key(name, args)?;
        match self.store.get(&key) {
            Ok(value) => {
                tracing::debug!(key, "memo hit");
                return value.deserialize();
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        let result = compute();
        self.store
            .put(&key, Value::Object(BinaryObject::pack(&result)?).into())?;
        Ok(result)
    }

    /// Drop the cached result for `(name, args)`. Returns whether one existed.
    pub fn invalidate<A: Serialize + ?Sized>(&self, name: &str, args: &A) -> StoreResult<bool> {
        let key = Self::key(name, args)?;
        if !self.store.exists(&key)? {
            return Ok(false);
        }
        match self.store.delete(&key) {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}
