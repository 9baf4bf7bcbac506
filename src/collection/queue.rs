use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

use super::{decode_member, encode_member, Body, Entry};
use crate::error::StoreResult;
use crate::storage::ObjectQueue;
use crate::store::Store;
use crate::value::Value;

/// How often a blocking pop re-reads the entry.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A queue kept as one binary-object entry in any store.
///
/// Not atomic: see the [module docs](super#atomicity).
#[derive(Debug, Clone)]
pub struct GenericQueue {
    entry: Entry,
    max_len: Option<usize>,
}

impl GenericQueue {
    /// The queue stored at `name` in `store`.
    #[must_use]
    pub fn new(store: Store, name: &str, max_len: Option<usize>) -> Self {
        Self {
            entry: Entry {
                store,
                key: name.to_string(),
                expected: "queue",
            },
            max_len,
        }
    }

    fn load(&self) -> StoreResult<VecDeque<Vec<u8>>> {
        match self.entry.load()? {
            None => Ok(VecDeque::new()),
            Some(Body::Queue { items }) => Ok(items),
            Some(Body::Set { .. }) => Err(self.entry.mismatch()),
        }
    }

    fn take(&self, f: impl FnOnce(&mut VecDeque<Vec<u8>>) -> Option<Vec<u8>>) -> StoreResult<Option<Value>> {
        let mut items = self.load()?;
        let Some(raw) = f(&mut items) else {
            return Ok(None);
        };
        self.entry.save(&Body::Queue { items })?;
        decode_member(&raw).map(Some)
    }
}

impl ObjectQueue for GenericQueue {
    fn push(&self, item: &Value) -> StoreResult<()> {
        let raw = encode_member(item)?;
        let mut items = self.load()?;
        items.push_back(raw);
        if let Some(max) = self.max_len {
            while items.len() > max {
                items.pop_front();
            }
        }
        self.entry.save(&Body::Queue { items })
    }

    fn unpush(&self) -> StoreResult<Option<Value>> {
        self.take(VecDeque::pop_back)
    }

    fn pop(&self) -> StoreResult<Option<Value>> {
        self.take(VecDeque::pop_front)
    }

    fn pop_blocking(&self, timeout: Option<Duration>) -> StoreResult<Option<Value>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if let Some(item) = self.pop()? {
                return Ok(Some(item));
            }
            let wait = match deadline {
                None => POLL_INTERVAL,
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        return Ok(None);
                    }
                    left.min(POLL_INTERVAL)
                }
            };
            thread::sleep(wait);
        }
    }

    fn peek(&self) -> StoreResult<Option<Value>> {
        self.load()?
            .front()
            .map(|raw| decode_member(raw))
            .transpose()
    }

    fn head(&self, n: usize) -> StoreResult<Vec<Value>> {
        self.load()?
            .iter()
            .rev()
            .take(n)
            .map(|raw| decode_member(raw))
            .collect()
    }

    fn tail(&self, n: usize) -> StoreResult<Vec<Value>> {
        self.load()?
            .iter()
            .take(n)
            .map(|raw| decode_member(raw))
            .collect()
    }

    fn contains(&self, item: &Value) -> StoreResult<bool> {
        let raw = encode_member(item)?;
        Ok(self.load()?.contains(&raw))
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.load()?.len())
    }

    fn clear(&self) -> StoreResult<()> {
        self.entry.remove()
    }

    fn max_len(&self) -> Option<usize> {
        self.max_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::Namespace;
    use crate::storage::file::FileStore;
    use tempfile::tempdir;

    fn queue(dir: &std::path::Path, max_len: Option<usize>) -> GenericQueue {
        let store = FileStore::open(dir, Namespace::new("queues", "").unwrap()).unwrap();
        GenericQueue::new(Store::File(store), "q", max_len)
    }

    #[test]
    fn test_fifo_and_unpush() {
        let dir = tempdir().unwrap();
        let q = queue(dir.path(), None);
        for v in ["a", "b", "c"] {
            q.push(&v.into()).unwrap();
        }
        assert_eq!(q.peek().unwrap(), Some(Value::from("a")));
        assert_eq!(q.unpush().unwrap(), Some(Value::from("c")));
        assert_eq!(q.pop().unwrap(), Some(Value::from("a")));
        assert_eq!(q.pop().unwrap(), Some(Value::from("b")));
        assert_eq!(q.pop().unwrap(), None);
    }

    #[test]
    fn test_head_and_tail() {
        let dir = tempdir().unwrap();
        let q = queue(dir.path(), None);
        for v in ["1", "2", "3", "4"] {
            q.push(&v.into()).unwrap();
        }
        assert_eq!(q.head(2).unwrap(), vec![Value::from("4"), Value::from("3")]);
        assert_eq!(q.tail(2).unwrap(), vec![Value::from("1"), Value::from("2")]);
        assert!(q.contains(&"3".into()).unwrap());
    }

    #[test]
    fn test_bounded_drops_oldest() {
        let dir = tempdir().unwrap();
        let q = queue(dir.path(), Some(2));
        for v in ["a", "b", "c"] {
            q.push(&v.into()).unwrap();
        }
        assert_eq!(q.len().unwrap(), 2);
        assert_eq!(q.pop().unwrap(), Some(Value::from("b")));
    }

    #[test]
    fn test_blocking_pop_times_out() {
        let dir = tempdir().unwrap();
        let q = queue(dir.path(), None);
        let start = Instant::now();
        assert_eq!(q.pop_blocking(Some(Duration::from_millis(120))).unwrap(), None);
        assert!(start.elapsed() >= Duration::from_millis(120));
    }
}
