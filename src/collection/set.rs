use std::any::Any;
use std::collections::BTreeMap;

use rand::seq::IteratorRandom;

use super::{decode_member, encode_member, Body, Entry};
use crate::error::{StoreError, StoreResult};
use crate::storage::ObjectSet;
use crate::store::Store;
use crate::value::Value;

/// A set kept as one binary-object entry in any store.
///
/// Not atomic: see the [module docs](super#atomicity).
#[derive(Debug, Clone)]
pub struct GenericSet {
    entry: Entry,
}

struct Members {
    scored: bool,
    members: BTreeMap<Vec<u8>, f64>,
}

impl GenericSet {
    /// The set stored at `name` in `store`.
    #[must_use]
    pub fn new(store: Store, name: &str) -> Self {
        Self {
            entry: Entry {
                store,
                key: name.to_string(),
                expected: "set",
            },
        }
    }

    fn load(&self) -> StoreResult<Members> {
        match self.entry.load()? {
            None => Ok(Members {
                scored: false,
                members: BTreeMap::new(),
            }),
            Some(Body::Set { scored, members }) => Ok(Members { scored, members }),
            Some(Body::Queue { .. }) => Err(self.entry.mismatch()),
        }
    }

    fn save(&self, set: Members) -> StoreResult<()> {
        self.entry.save(&Body::Set {
            scored: set.scored,
            members: set.members,
        })
    }

    /// Read, modify and write back, saving only if `f` reports a change.
    fn update(&self, f: impl FnOnce(&mut Members) -> StoreResult<bool>) -> StoreResult<bool> {
        let mut set = self.load()?;
        let changed = f(&mut set)?;
        if changed {
            self.save(set)?;
        }
        Ok(changed)
    }
}

impl ObjectSet for GenericSet {
    fn add(&self, member: &Value) -> StoreResult<bool> {
        let raw = encode_member(member)?;
        self.update(|set| Ok(set.members.insert(raw, 0.0).is_none()))
    }

    fn add_scored(&self, member: &Value, score: f64) -> StoreResult<bool> {
        let raw = encode_member(member)?;
        let mut added = false;
        self.update(|set| {
            if !set.scored && !set.members.is_empty() {
                return Err(StoreError::type_mismatch(&self.entry.key, "sorted set"));
            }
            set.scored = true;
            added = set.members.insert(raw, score).is_none();
            Ok(true)
        })?;
        Ok(added)
    }

    fn remove(&self, member: &Value) -> StoreResult<bool> {
        let raw = encode_member(member)?;
        self.update(|set| Ok(set.members.remove(&raw).is_some()))
    }

    fn contains(&self, member: &Value) -> StoreResult<bool> {
        let raw = encode_member(member)?;
        Ok(self.load()?.members.contains_key(&raw))
    }

    fn random_member(&self) -> StoreResult<Option<Value>> {
        let set = self.load()?;
        set.members
            .keys()
            .choose(&mut rand::thread_rng())
            .map(|m| decode_member(m))
            .transpose()
    }

    fn pop(&self) -> StoreResult<Option<Value>> {
        let mut popped = None;
        self.update(|set| {
            let picked = if set.scored {
                ranked_order(&set.members).into_iter().next()
            } else {
                set.members.keys().choose(&mut rand::thread_rng()).cloned()
            };
            let Some(picked) = picked else {
                return Ok(false);
            };
            set.members.remove(&picked);
            popped = Some(picked);
            Ok(true)
        })?;
        popped.map(|m| decode_member(&m)).transpose()
    }

    fn members(&self) -> StoreResult<Vec<Value>> {
        self.load()?
            .members
            .keys()
            .map(|m| decode_member(m))
            .collect()
    }

    fn ranked(&self) -> StoreResult<Vec<(Value, f64)>> {
        let set = self.load()?;
        ranked_order(&set.members)
            .into_iter()
            .map(|m| {
                let score = set.members.get(&m).copied().unwrap_or_default();
                Ok((decode_member(&m)?, score))
            })
            .collect()
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.load()?.members.len())
    }

    fn clear(&self) -> StoreResult<()> {
        self.entry.remove()
    }

    fn move_member(&self, member: &Value, dest: &dyn ObjectSet) -> StoreResult<bool> {
        let raw = encode_member(member)?;
        let set = self.load()?;
        let Some(&score) = set.members.get(&raw) else {
            return Ok(false);
        };
        self.remove(member)?;
        if set.scored {
            dest.add_scored(member, score)?;
        } else {
            dest.add(member)?;
        }
        Ok(true)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Members ordered by score, ties broken by encoded bytes.
fn ranked_order(members: &BTreeMap<Vec<u8>, f64>) -> Vec<Vec<u8>> {
    let mut order: Vec<_> = members.iter().collect();
    order.sort_by(|a, b| a.1.total_cmp(b.1).then_with(|| a.0.cmp(b.0)));
    order.into_iter().map(|(m, _)| m.clone()).collect()
}
