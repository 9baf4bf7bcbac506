//! The seam between [`KvStore`](super::KvStore) and a key-value service.
//!
//! The command set mirrors Redis: strings, sets, sorted sets and lists. Each
//! method is one round trip and atomic on the service side.

use std::fmt::{self, Debug};
use std::time::Duration;

use crate::error::StoreResult;

/// Type of the value held at a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    /// No such key.
    None,
    /// A string value.
    String,
    /// A set.
    Set,
    /// A sorted set.
    ZSet,
    /// A list.
    List,
    /// Any other service type.
    Other,
}

impl KeyType {
    /// Parse a `TYPE` reply.
    #[must_use]
    pub fn from_reply(reply: &str) -> Self {
        match reply {
            "none" => Self::None,
            "string" => Self::String,
            "set" => Self::Set,
            "zset" => Self::ZSet,
            "list" => Self::List,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::String => "string",
            Self::Set => "set",
            Self::ZSet => "zset",
            Self::List => "list",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// One `SCAN` step. A `cursor` of zero means the scan is complete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Keys on this page that matched.
    pub keys: Vec<String>,
    /// Cursor for the next page.
    pub cursor: u64,
}

/// Commands a kv service must provide.
pub trait KvConnection: Send + Sync + Debug {
    /// URL this connection was opened with.
    fn url(&self) -> &str;

    // strings
    /// `GET`
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;
    /// `SET`, with `PX` when `ttl` is given.
    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> StoreResult<()>;
    /// `EXISTS`
    fn exists(&self, key: &str) -> StoreResult<bool>;
    /// Returns `true` if a key was removed.
    fn del(&self, key: &str) -> StoreResult<bool>;
    /// Keys matching a glob `pattern`, `count` keys examined per step.
    fn scan(&self, pattern: &str, cursor: u64, count: usize) -> StoreResult<ScanPage>;
    /// `TYPE`
    fn key_type(&self, key: &str) -> StoreResult<KeyType>;

    // sets
    /// `SADD`
    fn sadd(&self, key: &str, member: &[u8]) -> StoreResult<bool>;
    /// `SREM`
    fn srem(&self, key: &str, member: &[u8]) -> StoreResult<bool>;
    /// `SISMEMBER`
    fn sismember(&self, key: &str, member: &[u8]) -> StoreResult<bool>;
    /// `SRANDMEMBER`
    fn srandmember(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;
    /// `SPOP`
    fn spop(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;
    /// `SMEMBERS`
    fn smembers(&self, key: &str) -> StoreResult<Vec<Vec<u8>>>;
    /// `SCARD`
    fn scard(&self, key: &str) -> StoreResult<usize>;
    /// `SMOVE`
    fn smove(&self, src: &str, dst: &str, member: &[u8]) -> StoreResult<bool>;

    // sorted sets
    /// `ZADD`
    fn zadd(&self, key: &str, member: &[u8], score: f64) -> StoreResult<bool>;
    /// `ZREM`
    fn zrem(&self, key: &str, member: &[u8]) -> StoreResult<bool>;
    /// `ZSCORE`
    fn zscore(&self, key: &str, member: &[u8]) -> StoreResult<Option<f64>>;
    /// `ZRANDMEMBER`
    fn zrandmember(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;
    /// `ZPOPMIN`
    fn zpopmin(&self, key: &str) -> StoreResult<Option<(Vec<u8>, f64)>>;
    /// Every member with its score, lowest score first.
    fn zrange_withscores(&self, key: &str) -> StoreResult<Vec<(Vec<u8>, f64)>>;
    /// `ZCARD`
    fn zcard(&self, key: &str) -> StoreResult<usize>;

    // lists
    /// Returns the new length.
    fn lpush(&self, key: &str, value: &[u8]) -> StoreResult<usize>;
    /// `LTRIM`
    fn ltrim(&self, key: &str, start: isize, stop: isize) -> StoreResult<()>;
    /// `LPOP`
    fn lpop(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;
    /// `RPOP`
    fn rpop(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;
    /// `None` blocks until a value arrives.
    fn brpop(&self, key: &str, timeout: Option<Duration>) -> StoreResult<Option<Vec<u8>>>;
    /// `LRANGE`
    fn lrange(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<Vec<u8>>>;
    /// `LLEN`
    fn llen(&self, key: &str) -> StoreResult<usize>;
    /// `LPOS`
    fn lpos(&self, key: &str, value: &[u8]) -> StoreResult<Option<usize>>;
}

/// Escape glob metacharacters so `text` matches literally in a `SCAN` pattern.
#[must_use]
pub fn glob_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_escape() {
        assert_eq!(glob_escape("a/b"), "a/b");
        assert_eq!(glob_escape("a*[x]?"), "a\\*\\[x\\]\\?");
    }

    #[test]
    fn test_key_type_reply() {
        assert_eq!(KeyType::from_reply("zset"), KeyType::ZSet);
        assert_eq!(KeyType::from_reply("stream"), KeyType::Other);
        assert_eq!(KeyType::List.to_string(), "list");
    }
}
