//! Set and queue collections.
//!
//! Backends with native collection types hand out their own implementations
//! (see [`KvSet`](crate::storage::kv::KvSet)). Everything else gets the
//! generic versions here, which keep the whole collection in a single entry.
//!
//! # Atomicity
//!
//! Generic collections read the entry, modify it in memory and write it back.
//! Two writers racing on the same collection can lose each other's updates.
//! Use a kv store when several processes mutate one collection.

mod queue;
mod set;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

pub use queue::GenericQueue;
pub use set::GenericSet;
pub use crate::storage::{ObjectQueue, ObjectSet};

use crate::codec;
use crate::error::{StoreError, StoreResult};
use crate::storage::ObjectStore;
use crate::store::Store;
use crate::value::{BinaryObject, Payload, Value};

/// Encode a member the same way for every collection type.
pub(crate) fn encode_member(member: &Value) -> StoreResult<Vec<u8>> {
    codec::encode_packed(Payload::Value(member.clone()))
}

pub(crate) fn decode_member(raw: &[u8]) -> StoreResult<Value> {
    codec::decode_packed(raw)
}

/// What a generic collection entry holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum Body {
    Set {
        scored: bool,
        members: BTreeMap<Vec<u8>, f64>,
    },
    Queue {
        /// Oldest at the front.
        items: VecDeque<Vec<u8>>,
    },
}

/// Reads and writes one collection entry.
#[derive(Debug, Clone)]
struct Entry {
    store: Store,
    key: String,
    expected: &'static str,
}

impl Entry {
    fn load(&self) -> StoreResult<Option<Body>> {
        match self.store.get(&self.key) {
            Ok(Value::Object(obj)) => obj
                .unpack::<Body>()
                .map(Some)
                .map_err(|_| self.mismatch()),
            Ok(_) => Err(self.mismatch()),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn save(&self, body: &Body) -> StoreResult<()> {
        self.store
            .put(&self.key, BinaryObject::pack(body)?.into())
    }

    fn remove(&self) -> StoreResult<()> {
        match self.store.delete(&self.key) {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }

    fn mismatch(&self) -> StoreError {
        StoreError::type_mismatch(self.store.namespace().join(&self.key), self.expected)
    }
}
