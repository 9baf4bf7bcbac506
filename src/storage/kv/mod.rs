//! Key-value/queue service backend.
//!
//! Keys live flat in the service as `bucket/prefix/key`, each holding a
//! packed codec envelope. Sets and queues use the service's own set, sorted
//! set and list types.

mod connection;
mod memory;
mod queue;
#[cfg(feature = "redis")]
mod redis_client;
mod set;

use std::sync::Arc;
use std::time::Duration;

pub use connection::{glob_escape, KeyType, KvConnection, ScanPage};
pub use memory::MemoryKv;
pub use queue::KvQueue;
#[cfg(feature = "redis")]
pub use redis_client::RedisConnection;
pub use set::KvSet;

use crate::codec;
use crate::error::{StoreError, StoreResult};
use crate::namespace::Namespace;
use crate::storage::{Keys, ObjectQueue, ObjectSet, ObjectStore};
use crate::store::Store;
use crate::value::{Payload, Value};

const SCAN_COUNT: usize = 500;

/// Store backed by a kv service connection.
#[derive(Debug, Clone)]
pub struct KvStore {
    ns: Namespace,
    conn: Arc<dyn KvConnection>,
}

impl KvStore {
    /// A store on `conn` addressing `ns`.
    #[must_use]
    pub fn new(conn: Arc<dyn KvConnection>, ns: Namespace) -> Self {
        Self { ns, conn }
    }

    /// Connection this store talks to.
    #[must_use]
    pub fn connection(&self) -> &Arc<dyn KvConnection> {
        &self.conn
    }

    /// Write a value that the service expires after `ttl`.
    pub fn put_with_ttl(&self, key: &str, payload: Payload, ttl: Duration) -> StoreResult<()> {
        self.write(key, payload, Some(ttl))
    }

    /// The native set at `name`.
    #[must_use]
    pub fn kv_set(&self, name: &str) -> KvSet {
        KvSet::new(Arc::clone(&self.conn), self.ns.join_bucket(name))
    }

    /// The native queue at `name`.
    #[must_use]
    pub fn kv_queue(&self, name: &str, max_len: Option<usize>) -> KvQueue {
        KvQueue::new(Arc::clone(&self.conn), self.ns.join_bucket(name), max_len)
    }

    fn write(&self, key: &str, payload: Payload, ttl: Option<Duration>) -> StoreResult<()> {
        let full = self.ns.join_bucket(key);
        let packed = codec::encode_packed(payload)?;
        tracing::debug!(key = %full, size = packed.len(), ttl = ?ttl, "kv put");
        self.conn.set(&full, &packed, ttl)
    }
}

impl ObjectStore for KvStore {
    fn namespace(&self) -> &Namespace {
        &self.ns
    }

    fn put(&self, key: &str, payload: Payload) -> StoreResult<()> {
        self.write(key, payload, None)
    }

    fn get(&self, key: &str) -> StoreResult<Value> {
        match self.conn.get(&self.ns.join_bucket(key))? {
            Some(buf) => codec::decode_packed(&buf),
            None => Err(StoreError::not_found(self.ns.bucket(), self.ns.join(key))),
        }
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        self.conn.exists(&self.ns.join_bucket(key))
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        let full = self.ns.join_bucket(key);
        tracing::debug!(key = %full, "kv delete");
        self.conn.del(&full).map(|_| ())
    }

    fn list(&self, prefix: &str, recursive: bool) -> StoreResult<Keys> {
        let scope = self.ns.scope(prefix, recursive)?;
        let bucket_prefix = format!("{}/", self.ns.bucket());
        let scan = Scan {
            conn: Arc::clone(&self.conn),
            pattern: format!("{}*", glob_escape(&format!("{bucket_prefix}{}", scope.matched()))),
            cursor: 0,
            started: false,
            buffered: Vec::new(),
        };
        let paths = scan.filter_map(move |key| match key {
            Ok(key) => key.strip_prefix(&bucket_prefix).map(|k| Ok(k.to_string())),
            Err(e) => Some(Err(e)),
        });
        Ok(scope.apply(paths))
    }

    fn sub(&self, parts: &[&str]) -> StoreResult<Store> {
        Ok(Store::Kv(Self {
            ns: self.ns.child(parts),
            conn: Arc::clone(&self.conn),
        }))
    }

    fn set(&self, name: &str) -> StoreResult<Box<dyn ObjectSet>> {
        Ok(Box::new(self.kv_set(name)))
    }

    fn queue(&self, name: &str, max_len: Option<usize>) -> StoreResult<Box<dyn ObjectQueue>> {
        Ok(Box::new(self.kv_queue(name, max_len)))
    }
}

/// Walks a `SCAN` cursor one step at a time.
struct Scan {
    conn: Arc<dyn KvConnection>,
    pattern: String,
    cursor: u64,
    started: bool,
    buffered: Vec<String>,
}

impl Iterator for Scan {
    type Item = StoreResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.buffered.is_empty() {
            if self.started && self.cursor == 0 {
                return None;
            }
            self.started = true;
            match self.conn.scan(&self.pattern, self.cursor, SCAN_COUNT) {
                Ok(page) => {
                    self.cursor = page.cursor;
                    self.buffered = page.keys;
                    self.buffered.reverse();
                }
                Err(e) => {
                    self.cursor = 0;
                    return Some(Err(e));
                }
            }
        }
        self.buffered.pop().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (Arc<MemoryKv>, KvStore) {
        let kv = Arc::new(MemoryKv::new("memory://kv-unit"));
        let conn: Arc<dyn KvConnection> = kv.clone();
        (kv, KvStore::new(conn, Namespace::new("cache", "p").unwrap()))
    }

    #[test]
    fn test_flat_key_layout() {
        let (kv, s) = store();
        s.put("a/b", "x".into()).unwrap();
        assert!(kv.exists("cache/p/a/b").unwrap());
    }

    #[test]
    fn test_ttl_expires() {
        let (_, s) = store();
        s.put_with_ttl("short", "x".into(), Duration::from_millis(20))
            .unwrap();
        assert!(s.exists("short").unwrap());
        std::thread::sleep(Duration::from_millis(40));
        assert!(s.get("short").unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (_, s) = store();
        s.delete("never").unwrap();
    }

    #[test]
    fn test_list_escapes_glob_characters() {
        let (_, s) = store();
        s.put("x*/1", "a".into()).unwrap();
        s.put("xy/2", "b".into()).unwrap();

        let keys: Vec<_> = s.list("x*", true).unwrap().map(Result::unwrap).collect();
        assert_eq!(keys, vec!["x*/1".to_string(), "xy/2".to_string()]);

        let only: Vec<_> = s.list("x*/", true).unwrap().map(Result::unwrap).collect();
        assert_eq!(only, vec!["x*/1".to_string()]);
    }

    #[test]
    fn test_delete_while_listing_visits_every_key() {
        let (kv, s) = store();
        let total = SCAN_COUNT * 2 + 200;
        for i in 0..total {
            s.put(&format!("k/{i:05}"), "x".into()).unwrap();
        }

        let mut listed = 0;
        for key in s.list("k", true).unwrap() {
            s.delete(&key.unwrap()).unwrap();
            listed += 1;
        }
        assert_eq!(listed, total);
        assert_eq!(kv.dbsize().unwrap(), 0);
    }

    #[test]
    fn test_collections_are_native() {
        let (kv, s) = store();
        s.set("tags").unwrap().add(&"rust".into()).unwrap();
        s.queue("jobs", None).unwrap().push(&"j1".into()).unwrap();
        assert_eq!(kv.key_type("cache/p/tags").unwrap(), KeyType::Set);
        assert_eq!(kv.key_type("cache/p/jobs").unwrap(), KeyType::List);
    }
}
