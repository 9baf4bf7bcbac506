//! Redis client behind an r2d2 connection pool.

use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use redis::{Client, FromRedisValue, RedisError, Value as RedisValue};

use super::connection::{KeyType, KvConnection, ScanPage};
use crate::error::{StoreError, StoreResult};

const POOL_SIZE: u32 = 8;

fn backend_err(err: RedisError) -> StoreError {
    StoreError::backend(format!("redis: {err}"))
}

/// Redis connection pool for one URL.
pub struct RedisConnection {
    url: String,
    pool: Pool<Client>,
}

impl std::fmt::Debug for RedisConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConnection")
            .field("url", &self.url)
            .field("state", &self.pool.state())
            .finish()
    }
}

impl RedisConnection {
    /// Connect to `url` (`redis://host:port/db`).
    pub fn connect(url: &str) -> StoreResult<Self> {
        let client = Client::open(url).map_err(backend_err)?;
        let pool = Pool::builder()
            .max_size(POOL_SIZE)
            .build(client)
            .map_err(|e| StoreError::backend(format!("redis pool for {url}: {e}")))?;
        Ok(Self {
            url: url.to_string(),
            pool,
        })
    }

    fn conn(&self) -> StoreResult<PooledConnection<Client>> {
        self.pool
            .get()
            .map_err(|e| StoreError::backend(format!("redis pool for {}: {e}", self.url)))
    }

    fn query<T: FromRedisValue>(&self, cmd: &mut redis::Cmd) -> StoreResult<T> {
        let mut conn = self.conn()?;
        cmd.query(&mut *conn).map_err(backend_err)
    }
}

impl KvConnection for RedisConnection {
    fn url(&self) -> &str {
        &self.url
    }

    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.query(redis::cmd("GET").arg(key))
    }

    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> StoreResult<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
            cmd.arg("PX").arg(millis);
        }
        self.query::<()>(&mut cmd)
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        self.query(redis::cmd("EXISTS").arg(key))
    }

    fn del(&self, key: &str) -> StoreResult<bool> {
        let removed: usize = self.query(redis::cmd("DEL").arg(key))?;
        Ok(removed > 0)
    }

    fn scan(&self, pattern: &str, cursor: u64, count: usize) -> StoreResult<ScanPage> {
        let (cursor, keys): (u64, Vec<String>) = self.query(
            redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(count),
        )?;
        Ok(ScanPage { keys, cursor })
    }

    fn key_type(&self, key: &str) -> StoreResult<KeyType> {
        let reply: String = self.query(redis::cmd("TYPE").arg(key))?;
        Ok(KeyType::from_reply(&reply))
    }

    fn sadd(&self, key: &str, member: &[u8]) -> StoreResult<bool> {
        self.query(redis::cmd("SADD").arg(key).arg(member))
    }

    fn srem(&self, key: &str, member: &[u8]) -> StoreResult<bool> {
        self.query(redis::cmd("SREM").arg(key).arg(member))
    }

    fn sismember(&self, key: &str, member: &[u8]) -> StoreResult<bool> {
        self.query(redis::cmd("SISMEMBER").arg(key).arg(member))
    }

    fn srandmember(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.query(redis::cmd("SRANDMEMBER").arg(key))
    }

    fn spop(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.query(redis::cmd("SPOP").arg(key))
    }

    fn smembers(&self, key: &str) -> StoreResult<Vec<Vec<u8>>> {
        self.query(redis::cmd("SMEMBERS").arg(key))
    }

    fn scard(&self, key: &str) -> StoreResult<usize> {
        self.query(redis::cmd("SCARD").arg(key))
    }

    fn smove(&self, src: &str, dst: &str, member: &[u8]) -> StoreResult<bool> {
        self.query(redis::cmd("SMOVE").arg(src).arg(dst).arg(member))
    }

    fn zadd(&self, key: &str, member: &[u8], score: f64) -> StoreResult<bool> {
        self.query(redis::cmd("ZADD").arg(key).arg(score).arg(member))
    }

    fn zrem(&self, key: &str, member: &[u8]) -> StoreResult<bool> {
        self.query(redis::cmd("ZREM").arg(key).arg(member))
    }

    fn zscore(&self, key: &str, member: &[u8]) -> StoreResult<Option<f64>> {
        self.query(redis::cmd("ZSCORE").arg(key).arg(member))
    }

    fn zrandmember(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.query(redis::cmd("ZRANDMEMBER").arg(key))
    }

    fn zpopmin(&self, key: &str) -> StoreResult<Option<(Vec<u8>, f64)>> {
        let popped: Vec<(Vec<u8>, f64)> = self.query(redis::cmd("ZPOPMIN").arg(key))?;
        Ok(popped.into_iter().next())
    }

    fn zrange_withscores(&self, key: &str) -> StoreResult<Vec<(Vec<u8>, f64)>> {
        self.query(
            redis::cmd("ZRANGE")
                .arg(key)
                .arg(0)
                .arg(-1)
                .arg("WITHSCORES"),
        )
    }

    fn zcard(&self, key: &str) -> StoreResult<usize> {
        self.query(redis::cmd("ZCARD").arg(key))
    }

    fn lpush(&self, key: &str, value: &[u8]) -> StoreResult<usize> {
        self.query(redis::cmd("LPUSH").arg(key).arg(value))
    }

    fn ltrim(&self, key: &str, start: isize, stop: isize) -> StoreResult<()> {
        self.query(redis::cmd("LTRIM").arg(key).arg(start).arg(stop))
    }

    fn lpop(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.query(redis::cmd("LPOP").arg(key))
    }

    fn rpop(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.query(redis::cmd("RPOP").arg(key))
    }

    fn brpop(&self, key: &str, timeout: Option<Duration>) -> StoreResult<Option<Vec<u8>>> {
        // BRPOP 0 blocks forever
        let secs = timeout.map_or(0.0, |t| t.as_secs_f64().max(0.001));
        let reply: RedisValue = self.query(redis::cmd("BRPOP").arg(key).arg(secs))?;
        if matches!(reply, RedisValue::Nil) {
            return Ok(None);
        }
        let (_key, value): (String, Vec<u8>) =
            FromRedisValue::from_redis_value(&reply).map_err(backend_err)?;
        Ok(Some(value))
    }

    fn lrange(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<Vec<u8>>> {
        self.query(redis::cmd("LRANGE").arg(key).arg(start).arg(stop))
    }

    fn llen(&self, key: &str) -> StoreResult<usize> {
        self.query(redis::cmd("LLEN").arg(key))
    }

    fn lpos(&self, key: &str, value: &[u8]) -> StoreResult<Option<usize>> {
        self.query(redis::cmd("LPOS").arg(key).arg(value))
    }
}
