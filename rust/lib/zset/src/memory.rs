use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;
use std::time::Duration;

use crate::error::ZSetError;
use crate::traits::{
    deadline, range_len, system_clock, Clock, ScoredMember, WriteBatch, ZOp, ZSetStore,
};

#[derive(Default)]
struct SortedSet {
    scores: HashMap<String, i64>,
    order: BTreeSet<(Reverse<i64>, String)>,
    expires_at: Option<u64>,
}

impl SortedSet {
    fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|t| t <= now)
    }

    fn upsert(&mut self, member: &str, score: i64) {
        if let Some(old) = self.scores.insert(member.to_string(), score) {
            if old == score {
                return;
            }
            self.order.remove(&(Reverse(old), member.to_string()));
        }
        self.order.insert((Reverse(score), member.to_string()));
    }

    fn trim_to_top(&mut self, keep: usize) {
        while self.order.len() > keep {
            if let Some((_, member)) = self.order.pop_last() {
                self.scores.remove(&member);
            }
        }
    }
}

/// MemoryZSet keeps every sorted set in process memory.
///
/// Used by tests and by deployments that accept losing timelines on
/// restart. Expired keys are skipped on read and dropped lazily on the
/// next write or by [`ZSetStore::purge_expired`].
pub struct MemoryZSet {
    sets: RwLock<HashMap<String, SortedSet>>,
    clock: Clock,
}

impl MemoryZSet {
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    /// Create a store that reads "now" from `clock`.
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            sets: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Number of keys physically held, including expired ones not yet purged.
    pub fn key_count(&self) -> usize {
        self.sets.read().map(|s| s.len()).unwrap_or(0)
    }
}

impl Default for MemoryZSet {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> ZSetError {
    ZSetError::Storage("memory zset lock poisoned".to_string())
}

impl ZSetStore for MemoryZSet {
    fn apply(&self, batch: &WriteBatch) -> Result<(), ZSetError> {
        let now = (self.clock)();
        let mut sets = self.sets.write().map_err(poisoned)?;

        for op in batch.ops() {
            // An expired key restarts empty on its next write.
            if sets.get(op.key()).is_some_and(|s| s.is_expired(now)) {
                sets.remove(op.key());
            }

            match op {
                ZOp::Add { key, member, score } => {
                    sets.entry(key.clone()).or_default().upsert(member, *score);
                }
                ZOp::Expire { key, ttl } => {
                    if let Some(set) = sets.get_mut(key) {
                        set.expires_at = Some(deadline(now, *ttl));
                    }
                }
                ZOp::TrimToTop { key, keep } => {
                    if let Some(set) = sets.get_mut(key) {
                        set.trim_to_top(*keep);
                        if set.order.is_empty() {
                            sets.remove(key);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn rev_range(
        &self,
        key: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<ScoredMember>, ZSetError> {
        let now = (self.clock)();
        let sets = self.sets.read().map_err(poisoned)?;
        let Some(set) = sets.get(key).filter(|s| !s.is_expired(now)) else {
            return Ok(Vec::new());
        };

        Ok(set
            .order
            .iter()
            .skip(start)
            .take(range_len(start, stop))
            .map(|(Reverse(score), member)| ScoredMember {
                member: member.clone(),
                score: *score,
            })
            .collect())
    }

    fn card(&self, key: &str) -> Result<usize, ZSetError> {
        let now = (self.clock)();
        let sets = self.sets.read().map_err(poisoned)?;
        Ok(sets
            .get(key)
            .filter(|s| !s.is_expired(now))
            .map_or(0, |s| s.order.len()))
    }

    fn score(&self, key: &str, member: &str) -> Result<Option<i64>, ZSetError> {
        let now = (self.clock)();
        let sets = self.sets.read().map_err(poisoned)?;
        Ok(sets
            .get(key)
            .filter(|s| !s.is_expired(now))
            .and_then(|s| s.scores.get(member).copied()))
    }

    fn ttl(&self, key: &str) -> Result<Option<Duration>, ZSetError> {
        let now = (self.clock)();
        let sets = self.sets.read().map_err(poisoned)?;
        Ok(sets
            .get(key)
            .and_then(|s| s.expires_at)
            .filter(|t| *t > now)
            .map(|t| Duration::from_millis(t - now)))
    }

    fn purge_expired(&self) -> Result<usize, ZSetError> {
        let now = (self.clock)();
        let mut sets = self.sets.write().map_err(poisoned)?;
        let before = sets.len();
        sets.retain(|_, s| !s.is_expired(now));
        Ok(before - sets.len())
    }
}
