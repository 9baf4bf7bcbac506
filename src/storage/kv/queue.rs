//! Queues stored natively in the kv service.
//!
//! The list grows at the left: `push` is LPUSH and `pop` is RPOP, so index 0
//! is the newest item and index -1 the next one out.

use std::sync::Arc;
use std::time::Duration;

use super::connection::KvConnection;
use crate::collection::{decode_member, encode_member};
use crate::error::StoreResult;
use crate::storage::ObjectQueue;
use crate::value::Value;

/// A FIFO queue held in one kv list.
#[derive(Debug, Clone)]
pub struct KvQueue {
    conn: Arc<dyn KvConnection>,
    key: String,
    max_len: Option<usize>,
}

impl KvQueue {
    pub(crate) fn new(conn: Arc<dyn KvConnection>, key: String, max_len: Option<usize>) -> Self {
        Self { conn, key, max_len }
    }

    /// The full service key, `bucket/prefix/name`.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    fn decode(raw: Option<Vec<u8>>) -> StoreResult<Option<Value>> {
        raw.map(|m| decode_member(&m)).transpose()
    }

    fn decode_all(raw: Vec<Vec<u8>>) -> StoreResult<Vec<Value>> {
        raw.iter().map(|m| decode_member(m)).collect()
    }
}

#[allow(clippy::cast_possible_wrap)]
const fn last_index(n: usize) -> isize {
    n as isize - 1
}

impl ObjectQueue for KvQueue {
    fn push(&self, item: &Value) -> StoreResult<()> {
        let len = self.conn.lpush(&self.key, &encode_member(item)?)?;
        match self.max_len {
            Some(0) => {
                self.conn.del(&self.key)?;
            }
            Some(max) if len > max => self.conn.ltrim(&self.key, 0, last_index(max))?,
            _ => {}
        }
        Ok(())
    }

    fn unpush(&self) -> StoreResult<Option<Value>> {
        Self::decode(self.conn.lpop(&self.key)?)
    }

    fn pop(&self) -> StoreResult<Option<Value>> {
        Self::decode(self.conn.rpop(&self.key)?)
    }

    fn pop_blocking(&self, timeout: Option<Duration>) -> StoreResult<Option<Value>> {
        if timeout == Some(Duration::ZERO) {
            return self.pop();
        }
        Self::decode(self.conn.brpop(&self.key, timeout)?)
    }

    fn peek(&self) -> StoreResult<Option<Value>> {
        Self::decode(self.conn.lrange(&self.key, -1, -1)?.pop())
    }

    fn head(&self, n: usize) -> StoreResult<Vec<Value>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        Self::decode_all(self.conn.lrange(&self.key, 0, last_index(n))?)
    }

    fn tail(&self, n: usize) -> StoreResult<Vec<Value>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let mut raw = self.conn.lrange(&self.key, -last_index(n) - 1, -1)?;
        raw.reverse();
        Self::decode_all(raw)
    }

    fn contains(&self, item: &Value) -> StoreResult<bool> {
        Ok(self.conn.lpos(&self.key, &encode_member(item)?)?.is_some())
    }

    fn len(&self) -> StoreResult<usize> {
        self.conn.llen(&self.key)
    }

    fn clear(&self) -> StoreResult<()> {
        self.conn.del(&self.key).map(|_| ())
    }

    fn max_len(&self) -> Option<usize> {
        self.max_len
    }
}
