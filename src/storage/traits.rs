//! Abstract storage traits for kyrostore.
//!
//! Every backend implements [`ObjectStore`]; collections come back as
//! [`ObjectSet`] and [`ObjectQueue`] trait objects so callers never need to
//! know whether they are backend-native or generic.

use std::any::Any;
use std::time::Duration;

use crate::collection::{GenericQueue, GenericSet};
use crate::error::StoreResult;
use crate::namespace::Namespace;
use crate::store::Store;
use crate::value::{Payload, Value};

/// Lazily produced listing keys, relative to the listing store's prefix.
pub type Keys = Box<dyn Iterator<Item = StoreResult<String>> + Send>;

/// The uniform store interface.
///
/// # Errors
/// - `NotFound`: `get` of a missing key; `delete` of a missing key on the
///   dictionary and file backends
/// - `UnsupportedContentType`: a stored object whose type the codec can't decode
/// - `Backend`/`Io`: the underlying service or filesystem failed
pub trait ObjectStore: Send + Sync {
    /// The `(bucket, prefix)` this handle addresses.
    fn namespace(&self) -> &Namespace;

    /// Encode and write a value.
    fn put(&self, key: &str, payload: Payload) -> StoreResult<()>;

    /// Read and decode a value.
    fn get(&self, key: &str) -> StoreResult<Value>;

    /// Whether a key is present. Never fails with `NotFound`.
    fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Remove a key.
    fn delete(&self, key: &str) -> StoreResult<()>;

    /// List keys under `prefix`.
    ///
    /// Non-recursive listings collapse deeper keys into one `dir/` entry. A
    /// trailing `*` matches raw name prefixes instead of a directory.
    fn list(&self, prefix: &str, recursive: bool) -> StoreResult<Keys>;

    /// A handle on the same backend with a longer prefix.
    fn sub(&self, parts: &[&str]) -> StoreResult<Store>;

    /// A named set stored in this namespace.
    ///
    /// The default is a [`GenericSet`]; backends with native sets override it.
    fn set(&self, name: &str) -> StoreResult<Box<dyn ObjectSet>> {
        Ok(Box::new(GenericSet::new(self.sub(&[])?, name)))
    }

    /// A named queue stored in this namespace, optionally bounded.
    fn queue(&self, name: &str, max_len: Option<usize>) -> StoreResult<Box<dyn ObjectQueue>> {
        Ok(Box::new(GenericQueue::new(self.sub(&[])?, name, max_len)))
    }
}

/// A named set of members, optionally scored.
///
/// Members compare by their encoded form, so `Value::from("a")` and
/// `Value::from(b"a".to_vec())` are distinct members.
pub trait ObjectSet: Send + Sync {
    /// Add a member. Returns `true` if it was not already present.
    fn add(&self, member: &Value) -> StoreResult<bool>;

    /// Add a member with a score, switching an empty set to sorted mode.
    fn add_scored(&self, member: &Value, score: f64) -> StoreResult<bool>;

    /// Remove a member. Returns `true` if it was present.
    fn remove(&self, member: &Value) -> StoreResult<bool>;

    /// Whether `member` is in the set.
    fn contains(&self, member: &Value) -> StoreResult<bool>;

    /// A random member without removing it.
    fn random_member(&self) -> StoreResult<Option<Value>>;

    /// Remove and return a random member.
    fn pop(&self) -> StoreResult<Option<Value>>;

    /// All members, in no particular order.
    fn members(&self) -> StoreResult<Vec<Value>>;

    /// Members with scores, lowest score first. Unscored members rank as `0.0`.
    fn ranked(&self) -> StoreResult<Vec<(Value, f64)>>;

    /// Number of members.
    fn len(&self) -> StoreResult<usize>;

    /// Whether the set has no members.
    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Remove every member.
    fn clear(&self) -> StoreResult<()>;

    /// Move a member into `dest`. Returns `true` if it was present here.
    fn move_member(&self, member: &Value, dest: &dyn ObjectSet) -> StoreResult<bool>;

    /// Downcasting hook for backend-native moves.
    fn as_any(&self) -> &dyn Any;
}

/// A named FIFO queue with optional maximum length.
///
/// Pushing onto a full bounded queue drops the oldest entries.
pub trait ObjectQueue: Send + Sync {
    /// Append an item, trimming the oldest past `max_len`.
    fn push(&self, item: &Value) -> StoreResult<()>;

    /// Remove and return the most recently pushed item.
    fn unpush(&self) -> StoreResult<Option<Value>>;

    /// Remove and return the oldest item.
    fn pop(&self) -> StoreResult<Option<Value>>;

    /// Pop, waiting for an item to arrive.
    ///
    /// `None` waits indefinitely; `Some(Duration::ZERO)` does not wait at all.
    /// Returns `Ok(None)` when the wait expires.
    fn pop_blocking(&self, timeout: Option<Duration>) -> StoreResult<Option<Value>>;

    /// The item `pop` would return, without removing it.
    fn peek(&self) -> StoreResult<Option<Value>>;

    /// Up to `n` of the newest items, newest first.
    fn head(&self, n: usize) -> StoreResult<Vec<Value>>;

    /// Up to `n` of the oldest items, oldest first.
    fn tail(&self, n: usize) -> StoreResult<Vec<Value>>;

    /// Whether `item` is queued.
    fn contains(&self, item: &Value) -> StoreResult<bool>;

    /// Number of queued items.
    fn len(&self) -> StoreResult<usize>;

    /// Whether the queue is empty.
    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Remove every item.
    fn clear(&self) -> StoreResult<()>;

    /// The bound given at creation.
    fn max_len(&self) -> Option<usize>;
}

impl dyn ObjectQueue + '_ {
    /// Pop until the queue is empty.
    pub fn drain(&self) -> impl Iterator<Item = StoreResult<Value>> + '_ {
        std::iter::from_fn(move || self.pop().transpose())
    }

    /// Blocking-pop until a wait expires.
    pub fn drain_blocking(
        &self,
        timeout: Option<Duration>,
    ) -> impl Iterator<Item = StoreResult<Value>> + '_ {
        std::iter::from_fn(move || self.pop_blocking(timeout).transpose())
    }
}

impl dyn ObjectSet + '_ {
    /// Pop until the set is empty.
    pub fn drain(&self) -> impl Iterator<Item = StoreResult<Value>> + '_ {
        std::iter::from_fn(move || self.pop().transpose())
    }

    /// Add each member in turn.
    pub fn extend<'v, I>(&self, members: I) -> StoreResult<usize>
    where
        I: IntoIterator<Item = &'v Value>,
    {
        let mut added = 0;
        for member in members {
            if self.add(member)? {
                added += 1;
            }
        }
        Ok(added)
    }
}
