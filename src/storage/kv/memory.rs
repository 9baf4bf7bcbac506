//! In-process kv service with Redis command semantics.
//!
//! Empty collections are removed, wrong-type access fails with `WRONGTYPE`,
//! and `BRPOP` parks on a condition variable until a push arrives.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::ops::Bound;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use rand::seq::IteratorRandom;
use regex::Regex;

use super::connection::{KeyType, KvConnection, ScanPage};
use crate::error::{lock_err, StoreError, StoreResult};

#[derive(Debug, Clone)]
enum Entry {
    Str(Vec<u8>),
    Set(HashSet<Vec<u8>>),
    ZSet(HashMap<Vec<u8>, f64>),
    List(VecDeque<Vec<u8>>),
}

impl Entry {
    const fn key_type(&self) -> KeyType {
        match self {
            Self::Str(_) => KeyType::String,
            Self::Set(_) => KeyType::Set,
            Self::ZSet(_) => KeyType::ZSet,
            Self::List(_) => KeyType::List,
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Self::Str(_) => false,
            Self::Set(s) => s.is_empty(),
            Self::ZSet(z) => z.is_empty(),
            Self::List(l) => l.is_empty(),
        }
    }
}

#[derive(Debug)]
struct Slot {
    entry: Entry,
    expires: Option<Instant>,
}

type Data = BTreeMap<String, Slot>;

fn wrong_type(key: &str) -> StoreError {
    StoreError::backend(format!(
        "WRONGTYPE Operation against a key holding the wrong kind of value: {key}"
    ))
}

/// Translate a Redis glob pattern into an anchored regex.
fn glob_to_regex(pattern: &str) -> StoreResult<Regex> {
    let mut re = String::from("^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            '\\' => {
                if let Some(next) = chars.next() {
                    re.push_str(&regex::escape(&next.to_string()));
                }
            }
            '[' => {
                re.push('[');
                for c in chars.by_ref() {
                    if c == ']' {
                        break;
                    }
                    if c == '\\' || c == '[' {
                        re.push('\\');
                    }
                    re.push(c);
                }
                re.push(']');
            }
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| StoreError::backend(format!("bad scan pattern {pattern}: {e}")))
}

/// Normalize Redis-style inclusive `[start, stop]` indexes against `len`.
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn index_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

/// Where each outstanding `SCAN` cursor resumes.
///
/// Cursors name the last key a page examined, so deleting keys mid-scan
/// never shifts the rest of the walk.
#[derive(Debug, Default)]
struct Cursors {
    next: u64,
    resume: HashMap<u64, String>,
}

/// A kv service living in this process.
#[derive(Debug)]
pub struct MemoryKv {
    url: String,
    data: Mutex<Data>,
    pushed: Condvar,
    cursors: Mutex<Cursors>,
}

impl MemoryKv {
    /// An empty service answering to `url`.
    #[must_use]
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            data: Mutex::new(BTreeMap::new()),
            pushed: Condvar::new(),
            cursors: Mutex::new(Cursors::default()),
        }
    }

    /// Number of live keys.
    pub fn dbsize(&self) -> StoreResult<usize> {
        let mut data = self.lock()?;
        let now = Instant::now();
        data.retain(|_, slot| slot.expires.map_or(true, |t| t > now));
        Ok(data.len())
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Data>> {
        self.data.lock().map_err(|_| lock_err("memory kv"))
    }

    fn cursors(&self) -> StoreResult<MutexGuard<'_, Cursors>> {
        self.cursors.lock().map_err(|_| lock_err("memory kv cursors"))
    }

    /// Hand out a cursor that resumes after `last`.
    fn park(&self, last: String) -> StoreResult<u64> {
        let mut cursors = self.cursors()?;
        cursors.next = cursors.next.wrapping_add(1).max(1);
        let id = cursors.next;
        cursors.resume.insert(id, last);
        Ok(id)
    }

    /// The live entry at `key`, dropping it first if it has expired.
    fn live<'a>(data: &'a mut Data, key: &str) -> Option<&'a mut Entry> {
        let expired = data
            .get(key)
            .and_then(|slot| slot.expires)
            .is_some_and(|t| t <= Instant::now());
        if expired {
            data.remove(key);
        }
        data.get_mut(key).map(|slot| &mut slot.entry)
    }

    /// Run `f` on a collection entry, creating it with `init` if absent,
    /// and remove it if `f` leaves it empty.
    fn with_entry<T>(
        &self,
        key: &str,
        init: Option<Entry>,
        f: impl FnOnce(&mut Entry) -> StoreResult<T>,
        default: T,
    ) -> StoreResult<T> {
        let mut data = self.lock()?;
        if Self::live(&mut data, key).is_none() {
            match init {
                Some(entry) => {
                    data.insert(
                        key.to_string(),
                        Slot {
                            entry,
                            expires: None,
                        },
                    );
                }
                None => return Ok(default),
            }
        }
        let Some(slot) = data.get_mut(key) else {
            return Ok(default);
        };
        let out = f(&mut slot.entry);
        if slot.entry.is_empty() {
            data.remove(key);
        }
        out
    }

    fn with_set<T>(
        &self,
        key: &str,
        create: bool,
        default: T,
        f: impl FnOnce(&mut HashSet<Vec<u8>>) -> T,
    ) -> StoreResult<T> {
        let init = create.then(|| Entry::Set(HashSet::new()));
        self.with_entry(
            key,
            init,
            |entry| match entry {
                Entry::Set(set) => Ok(f(set)),
                _ => Err(wrong_type(key)),
            },
            default,
        )
    }

    fn with_zset<T>(
        &self,
        key: &str,
        create: bool,
        default: T,
        f: impl FnOnce(&mut HashMap<Vec<u8>, f64>) -> T,
    ) -> StoreResult<T> {
        let init = create.then(|| Entry::ZSet(HashMap::new()));
        self.with_entry(
            key,
            init,
            |entry| match entry {
                Entry::ZSet(z) => Ok(f(z)),
                _ => Err(wrong_type(key)),
            },
            default,
        )
    }

    fn with_list<T>(
        &self,
        key: &str,
        create: bool,
        default: T,
        f: impl FnOnce(&mut VecDeque<Vec<u8>>) -> T,
    ) -> StoreResult<T> {
        let init = create.then(|| Entry::List(VecDeque::new()));
        self.with_entry(
            key,
            init,
            |entry| match entry {
                Entry::List(l) => Ok(f(l)),
                _ => Err(wrong_type(key)),
            },
            default,
        )
    }

    fn sorted(z: &HashMap<Vec<u8>, f64>) -> Vec<(Vec<u8>, f64)> {
        let mut members: Vec<_> = z.iter().map(|(m, s)| (m.clone(), *s)).collect();
        members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        members
    }
}

impl KvConnection for MemoryKv {
    fn url(&self) -> &str {
        &self.url
    }

    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut data = self.lock()?;
        match Self::live(&mut data, key) {
            None => Ok(None),
            Some(Entry::Str(v)) => Ok(Some(v.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> StoreResult<()> {
        let mut data = self.lock()?;
        data.insert(
            key.to_string(),
            Slot {
                entry: Entry::Str(value.to_vec()),
                expires: ttl.map(|t| Instant::now() + t),
            },
        );
        Ok(())
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut data = self.lock()?;
        Ok(Self::live(&mut data, key).is_some())
    }

    fn del(&self, key: &str) -> StoreResult<bool> {
        let mut data = self.lock()?;
        let present = Self::live(&mut data, key).is_some();
        data.remove(key);
        Ok(present)
    }

    fn scan(&self, pattern: &str, cursor: u64, count: usize) -> StoreResult<ScanPage> {
        let matcher = glob_to_regex(pattern)?;
        let after = match cursor {
            0 => None,
            id => Some(
                self.cursors()?
                    .resume
                    .remove(&id)
                    .ok_or_else(|| StoreError::backend(format!("ERR invalid cursor {id}")))?,
            ),
        };

        let (keys, last) = {
            let data = self.lock()?;
            let now = Instant::now();
            let lower = after.as_deref().map_or(Bound::Unbounded, Bound::Excluded);
            let mut page = data.range::<str, _>((lower, Bound::Unbounded));
            let mut keys = Vec::new();
            let mut last = None;
            for (k, slot) in page.by_ref().take(count.max(1)) {
                if slot.expires.map_or(true, |t| t > now) && matcher.is_match(k) {
                    keys.push(k.clone());
                }
                last = Some(k);
            }
            let more = page.next().is_some();
            (keys, last.filter(|_| more).cloned())
        };

        let cursor = match last {
            Some(last) => self.park(last)?,
            None => 0,
        };
        Ok(ScanPage { keys, cursor })
    }

    fn key_type(&self, key: &str) -> StoreResult<KeyType> {
        let mut data = self.lock()?;
        Ok(Self::live(&mut data, key).map_or(KeyType::None, |e| e.key_type()))
    }

    fn sadd(&self, key: &str, member: &[u8]) -> StoreResult<bool> {
        self.with_set(key, true, false, |s| s.insert(member.to_vec()))
    }

    fn srem(&self, key: &str, member: &[u8]) -> StoreResult<bool> {
        self.with_set(key, false, false, |s| s.remove(member))
    }

    fn sismember(&self, key: &str, member: &[u8]) -> StoreResult<bool> {
        self.with_set(key, false, false, |s| s.contains(member))
    }

    fn srandmember(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.with_set(key, false, None, |s| {
            s.iter().choose(&mut rand::thread_rng()).cloned()
        })
    }

    fn spop(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.with_set(key, false, None, |s| {
            let picked = s.iter().choose(&mut rand::thread_rng()).cloned()?;
            s.remove(&picked);
            Some(picked)
        })
    }

    fn smembers(&self, key: &str) -> StoreResult<Vec<Vec<u8>>> {
        self.with_set(key, false, Vec::new(), |s| s.iter().cloned().collect())
    }

    fn scard(&self, key: &str) -> StoreResult<usize> {
        self.with_set(key, false, 0, |s| s.len())
    }

    fn smove(&self, src: &str, dst: &str, member: &[u8]) -> StoreResult<bool> {
        let mut data = self.lock()?;
        match Self::live(&mut data, dst) {
            None | Some(Entry::Set(_)) => {}
            Some(_) => return Err(wrong_type(dst)),
        }
        let removed = match Self::live(&mut data, src) {
            None => false,
            Some(Entry::Set(s)) => s.remove(member),
            Some(_) => return Err(wrong_type(src)),
        };
        if !removed {
            return Ok(false);
        }
        if data.get(src).is_some_and(|slot| slot.entry.is_empty()) {
            data.remove(src);
        }
        let slot = data.entry(dst.to_string()).or_insert_with(|| Slot {
            entry: Entry::Set(HashSet::new()),
            expires: None,
        });
        if let Entry::Set(s) = &mut slot.entry {
            s.insert(member.to_vec());
        }
        Ok(true)
    }

    fn zadd(&self, key: &str, member: &[u8], score: f64) -> StoreResult<bool> {
        self.with_zset(key, true, false, |z| z.insert(member.to_vec(), score).is_none())
    }

    fn zrem(&self, key: &str, member: &[u8]) -> StoreResult<bool> {
        self.with_zset(key, false, false, |z| z.remove(member).is_some())
    }

    fn zscore(&self, key: &str, member: &[u8]) -> StoreResult<Option<f64>> {
        self.with_zset(key, false, None, |z| z.get(member).copied())
    }

    fn zrandmember(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.with_zset(key, false, None, |z| {
            z.keys().choose(&mut rand::thread_rng()).cloned()
        })
    }

    fn zpopmin(&self, key: &str) -> StoreResult<Option<(Vec<u8>, f64)>> {
        self.with_zset(key, false, None, |z| {
            let (member, score) = Self::sorted(z).into_iter().next()?;
            z.remove(&member);
            Some((member, score))
        })
    }

    fn zrange_withscores(&self, key: &str) -> StoreResult<Vec<(Vec<u8>, f64)>> {
        self.with_zset(key, false, Vec::new(), |z| Self::sorted(z))
    }

    fn zcard(&self, key: &str) -> StoreResult<usize> {
        self.with_zset(key, false, 0, |z| z.len())
    }

    fn lpush(&self, key: &str, value: &[u8]) -> StoreResult<usize> {
        let len = self.with_list(key, true, 0, |l| {
            l.push_front(value.to_vec());
            l.len()
        })?;
        self.pushed.notify_all();
        Ok(len)
    }

    fn ltrim(&self, key: &str, start: isize, stop: isize) -> StoreResult<()> {
        self.with_list(key, false, (), |l| match index_range(l.len(), start, stop) {
            Some((start, stop)) => {
                l.truncate(stop + 1);
                l.drain(..start);
            }
            None => l.clear(),
        })
    }

    fn lpop(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.with_list(key, false, None, VecDeque::pop_front)
    }

    fn rpop(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.with_list(key, false, None, VecDeque::pop_back)
    }

    fn brpop(&self, key: &str, timeout: Option<Duration>) -> StoreResult<Option<Vec<u8>>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut data = self.lock()?;
        loop {
            match Self::live(&mut data, key) {
                Some(Entry::List(l)) => {
                    let value = l.pop_back();
                    if l.is_empty() {
                        data.remove(key);
                    }
                    return Ok(value);
                }
                Some(_) => return Err(wrong_type(key)),
                None => {}
            }
            data = match deadline {
                None => self.pushed.wait(data).map_err(|_| lock_err("memory kv"))?,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    self.pushed
                        .wait_timeout(data, deadline - now)
                        .map_err(|_| lock_err("memory kv"))?
                        .0
                }
            };
        }
    }

    fn lrange(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<Vec<u8>>> {
        self.with_list(key, false, Vec::new(), |l| {
            index_range(l.len(), start, stop)
                .map(|(start, stop)| l.range(start..=stop).cloned().collect())
                .unwrap_or_default()
        })
    }

    fn llen(&self, key: &str) -> StoreResult<usize> {
        self.with_list(key, false, 0, |l| l.len())
    }

    fn lpos(&self, key: &str, value: &[u8]) -> StoreResult<Option<usize>> {
        self.with_list(key, false, None, |l| l.iter().position(|v| v == value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn kv() -> MemoryKv {
        MemoryKv::new("memory://unit")
    }

    #[test]
    fn test_strings_and_ttl() {
        let kv = kv();
        kv.set("a", b"1", None).unwrap();
        kv.set("b", b"2", Some(Duration::from_millis(20))).unwrap();
        assert_eq!(kv.get("a").unwrap(), Some(b"1".to_vec()));
        assert!(kv.exists("b").unwrap());

        thread::sleep(Duration::from_millis(40));
        assert!(!kv.exists("b").unwrap());
        assert_eq!(kv.get("b").unwrap(), None);
        assert_eq!(kv.dbsize().unwrap(), 1);
    }

    #[test]
    fn test_wrong_type() {
        let kv = kv();
        kv.set("s", b"x", None).unwrap();
        assert!(kv.sadd("s", b"m").unwrap_err().to_string().contains("WRONGTYPE"));
        kv.lpush("l", b"x").unwrap();
        assert!(kv.get("l").is_err());
    }

    #[test]
    fn test_empty_collections_disappear() {
        let kv = kv();
        kv.sadd("set", b"m").unwrap();
        assert_eq!(kv.key_type("set").unwrap(), KeyType::Set);
        kv.srem("set", b"m").unwrap();
        assert_eq!(kv.key_type("set").unwrap(), KeyType::None);

        kv.lpush("list", b"v").unwrap();
        kv.rpop("list").unwrap();
        assert!(!kv.exists("list").unwrap());
    }

    #[test]
    fn test_smove() {
        let kv = kv();
        kv.sadd("a", b"m").unwrap();
        assert!(kv.smove("a", "b", b"m").unwrap());
        assert!(!kv.smove("a", "b", b"m").unwrap());
        assert!(kv.sismember("b", b"m").unwrap());
        assert!(!kv.exists("a").unwrap());
    }

    #[test]
    fn test_zset_order() {
        let kv = kv();
        kv.zadd("z", b"c", 3.0).unwrap();
        kv.zadd("z", b"a", 1.0).unwrap();
        kv.zadd("z", b"b", 2.0).unwrap();
        let members: Vec<_> = kv
            .zrange_withscores("z")
            .unwrap()
            .into_iter()
            .map(|(m, _)| m)
            .collect();
        assert_eq!(members, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        assert_eq!(kv.zpopmin("z").unwrap(), Some((b"a".to_vec(), 1.0)));
        assert_eq!(kv.zcard("z").unwrap(), 2);
    }

    #[test]
    fn test_list_ranges() {
        let kv = kv();
        for v in [b"1", b"2", b"3", b"4"] {
            kv.lpush("l", v).unwrap();
        }
        // list is now 4 3 2 1
        assert_eq!(kv.lrange("l", -1, -1).unwrap(), vec![b"1".to_vec()]);
        assert_eq!(kv.lrange("l", 0, 1).unwrap(), vec![b"4".to_vec(), b"3".to_vec()]);
        assert_eq!(kv.lrange("l", 5, 10).unwrap(), Vec::<Vec<u8>>::new());

        kv.ltrim("l", 0, 2).unwrap();
        assert_eq!(kv.llen("l").unwrap(), 3);
        assert_eq!(kv.rpop("l").unwrap(), Some(b"2".to_vec()));
        assert_eq!(kv.lpos("l", b"3").unwrap(), Some(1));
    }

    #[test]
    fn test_scan_pages_through_matches() {
        let kv = kv();
        for i in 0..25 {
            kv.set(&format!("b/p/{i:02}"), b"x", None).unwrap();
            kv.set(&format!("b/q/{i:02}"), b"x", None).unwrap();
        }
        let mut cursor = 0;
        let mut found = Vec::new();
        loop {
            let page = kv.scan("b/p/*", cursor, 10).unwrap();
            found.extend(page.keys);
            cursor = page.cursor;
            if cursor == 0 {
                break;
            }
        }
        assert_eq!(found.len(), 25);
    }

    #[test]
    fn test_scan_survives_deletes_between_pages() {
        let kv = kv();
        for i in 0..30 {
            kv.set(&format!("k{i:02}"), b"x", None).unwrap();
        }
        let mut cursor = 0;
        let mut found = Vec::new();
        loop {
            let page = kv.scan("k*", cursor, 7).unwrap();
            for key in &page.keys {
                kv.del(key).unwrap();
            }
            found.extend(page.keys);
            cursor = page.cursor;
            if cursor == 0 {
                break;
            }
        }
        assert_eq!(found.len(), 30);
        assert_eq!(kv.dbsize().unwrap(), 0);
    }

    #[test]
    fn test_scan_rejects_unknown_cursor() {
        let kv = kv();
        kv.set("a", b"x", None).unwrap();
        assert!(kv.scan("*", 9999, 10).unwrap_err().to_string().contains("invalid cursor"));
    }

    #[test]
    fn test_glob_escapes() {
        let re = glob_to_regex("a\\*b*").unwrap();
        assert!(re.is_match("a*bcd"));
        assert!(!re.is_match("axbcd"));
        let class = glob_to_regex("k[0-9]").unwrap();
        assert!(class.is_match("k7"));
        assert!(!class.is_match("kx"));
    }

    #[test]
    fn test_brpop_wakes_on_push() {
        let kv = Arc::new(kv());
        let waiter = {
            let kv = Arc::clone(&kv);
            thread::spawn(move || kv.brpop("q", Some(Duration::from_secs(5))).unwrap())
        };
        thread::sleep(Duration::from_millis(50));
        kv.lpush("q", b"job").unwrap();
        assert_eq!(waiter.join().unwrap(), Some(b"job".to_vec()));
    }

    #[test]
    fn test_brpop_times_out() {
        let kv = kv();
        let start = Instant::now();
        assert_eq!(kv.brpop("q", Some(Duration::from_millis(30))).unwrap(), None);
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(kv.brpop("q", Some(Duration::ZERO)).unwrap(), None);
    }
}
