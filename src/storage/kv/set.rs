//! Sets stored natively in the kv service.

use std::any::Any;
use std::sync::Arc;

use super::connection::{KeyType, KvConnection};
use crate::collection::{decode_member, encode_member};
use crate::error::{StoreError, StoreResult};
use crate::storage::ObjectSet;
use crate::value::Value;

/// A set held in one kv key.
///
/// The key is a plain set until the first [`ObjectSet::add_scored`] on an
/// empty key turns it into a sorted set. Every mutation is a single service
/// command, so concurrent writers never lose members.
#[derive(Debug, Clone)]
pub struct KvSet {
    conn: Arc<dyn KvConnection>,
    key: String,
}

impl KvSet {
    pub(crate) fn new(conn: Arc<dyn KvConnection>, key: String) -> Self {
        Self { conn, key }
    }

    /// The full service key, `bucket/prefix/name`.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    fn kind(&self) -> StoreResult<KeyType> {
        match self.conn.key_type(&self.key)? {
            kind @ (KeyType::None | KeyType::Set | KeyType::ZSet) => Ok(kind),
            _ => Err(StoreError::type_mismatch(&self.key, "set")),
        }
    }

    fn decode_all(raw: Vec<Vec<u8>>) -> StoreResult<Vec<Value>> {
        raw.iter().map(|m| decode_member(m)).collect()
    }

    fn same_service(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.conn, &other.conn) || self.conn.url() == other.conn.url()
    }
}

impl ObjectSet for KvSet {
    fn add(&self, member: &Value) -> StoreResult<bool> {
        let raw = encode_member(member)?;
        match self.kind()? {
            // unscored members of a sorted set rank as 0
            KeyType::ZSet => self.conn.zadd(&self.key, &raw, 0.0),
            _ => self.conn.sadd(&self.key, &raw),
        }
    }

    fn add_scored(&self, member: &Value, score: f64) -> StoreResult<bool> {
        let raw = encode_member(member)?;
        match self.kind()? {
            KeyType::Set => Err(StoreError::type_mismatch(&self.key, "sorted set")),
            _ => self.conn.zadd(&self.key, &raw, score),
        }
    }

    fn remove(&self, member: &Value) -> StoreResult<bool> {
        let raw = encode_member(member)?;
        match self.kind()? {
            KeyType::Set => self.conn.srem(&self.key, &raw),
            KeyType::ZSet => self.conn.zrem(&self.key, &raw),
            _ => Ok(false),
        }
    }

    fn contains(&self, member: &Value) -> StoreResult<bool> {
        let raw = encode_member(member)?;
        match self.kind()? {
            KeyType::Set => self.conn.sismember(&self.key, &raw),
            KeyType::ZSet => Ok(self.conn.zscore(&self.key, &raw)?.is_some()),
            _ => Ok(false),
        }
    }

    fn random_member(&self) -> StoreResult<Option<Value>> {
        let raw = match self.kind()? {
            KeyType::Set => self.conn.srandmember(&self.key)?,
            KeyType::ZSet => self.conn.zrandmember(&self.key)?,
            _ => None,
        };
        raw.map(|m| decode_member(&m)).transpose()
    }

    fn pop(&self) -> StoreResult<Option<Value>> {
        let raw = match self.kind()? {
            KeyType::Set => self.conn.spop(&self.key)?,
            KeyType::ZSet => self.conn.zpopmin(&self.key)?.map(|(m, _)| m),
            _ => None,
        };
        raw.map(|m| decode_member(&m)).transpose()
    }

    fn members(&self) -> StoreResult<Vec<Value>> {
        match self.kind()? {
            KeyType::Set => Self::decode_all(self.conn.smembers(&self.key)?),
            KeyType::ZSet => Self::decode_all(
                self.conn
                    .zrange_withscores(&self.key)?
                    .into_iter()
                    .map(|(m, _)| m)
                    .collect(),
            ),
            _ => Ok(Vec::new()),
        }
    }

    fn ranked(&self) -> StoreResult<Vec<(Value, f64)>> {
        let mut raw = match self.kind()? {
            KeyType::Set => self
                .conn
                .smembers(&self.key)?
                .into_iter()
                .map(|m| (m, 0.0))
                .collect(),
            KeyType::ZSet => self.conn.zrange_withscores(&self.key)?,
            _ => Vec::new(),
        };
        raw.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        raw.into_iter()
            .map(|(m, s)| Ok((decode_member(&m)?, s)))
            .collect()
    }

    fn len(&self) -> StoreResult<usize> {
        match self.kind()? {
            KeyType::Set => self.conn.scard(&self.key),
            KeyType::ZSet => self.conn.zcard(&self.key),
            _ => Ok(0),
        }
    }

    fn clear(&self) -> StoreResult<()> {
        self.conn.del(&self.key).map(|_| ())
    }

    fn move_member(&self, member: &Value, dest: &dyn ObjectSet) -> StoreResult<bool> {
        if let Some(other) = dest.as_any().downcast_ref::<Self>() {
            let unscored = |k: KeyType| matches!(k, KeyType::None | KeyType::Set);
            if self.same_service(other) && unscored(self.kind()?) && unscored(other.kind()?) {
                return self.conn.smove(&self.key, &other.key, &encode_member(member)?);
            }
        }

        let raw = encode_member(member)?;
        let score = match self.kind()? {
            KeyType::ZSet => self.conn.zscore(&self.key, &raw)?,
            _ => None,
        };
        if !self.remove(member)? {
            return Ok(false);
        }
        match score {
            Some(score) => dest.add_scored(member, score)?,
            None => dest.add(member)?,
        };
        Ok(true)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
