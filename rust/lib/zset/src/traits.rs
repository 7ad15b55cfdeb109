use std::sync::Arc;
use std::time::Duration;

use crate::error::ZSetError;

/// Source of "now" in unix milliseconds. Injectable so expiry can be
/// driven deterministically in tests.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Wall-clock [`Clock`].
pub fn system_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().timestamp_millis().max(0) as u64)
}

/// A member together with its score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredMember {
    pub member: String,
    pub score: i64,
}

/// One operation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZOp {
    /// Upsert `member` with `score`. An existing member only has its score replaced.
    Add {
        key: String,
        member: String,
        score: i64,
    },
    /// Set the key to expire `ttl` from now. No-op when the key does not exist.
    Expire { key: String, ttl: Duration },
    /// Keep only the `keep` highest-scored members of the key.
    TrimToTop { key: String, keep: usize },
}

impl ZOp {
    pub fn key(&self) -> &str {
        match self {
            ZOp::Add { key, .. } | ZOp::Expire { key, .. } | ZOp::TrimToTop { key, .. } => key,
        }
    }
}

/// An ordered pipeline of operations applied in one call.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<ZOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ops: Vec::with_capacity(capacity),
        }
    }

    pub fn add(&mut self, key: impl Into<String>, member: impl Into<String>, score: i64) -> &mut Self {
        self.ops.push(ZOp::Add {
            key: key.into(),
            member: member.into(),
            score,
        });
        self
    }

    pub fn expire(&mut self, key: impl Into<String>, ttl: Duration) -> &mut Self {
        self.ops.push(ZOp::Expire {
            key: key.into(),
            ttl,
        });
        self
    }

    pub fn trim_to_top(&mut self, key: impl Into<String>, keep: usize) -> &mut Self {
        self.ops.push(ZOp::TrimToTop {
            key: key.into(),
            keep,
        });
        self
    }

    pub fn ops(&self) -> &[ZOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// ZSetStore is a keyed collection of sorted sets with per-key expiration.
///
/// Each key holds unique string members ordered by an `i64` score. Keys
/// follow a namespaced convention such as `timeline:{user_id}`. A key whose
/// expiration has passed behaves exactly like a missing key, whether or not
/// it has been physically purged yet.
pub trait ZSetStore: Send + Sync {
    /// Apply all operations of the batch, in order.
    fn apply(&self, batch: &WriteBatch) -> Result<(), ZSetError>;

    /// Inclusive rank range `[start, stop]` in descending score order.
    /// Ties are ordered by member, ascending. Indices past the end yield a
    /// shorter (possibly empty) result.
    fn rev_range(&self, key: &str, start: usize, stop: usize)
        -> Result<Vec<ScoredMember>, ZSetError>;

    /// Number of members under `key`.
    fn card(&self, key: &str) -> Result<usize, ZSetError>;

    /// Score of a single member, if present.
    fn score(&self, key: &str, member: &str) -> Result<Option<i64>, ZSetError>;

    /// Remaining time to live. `None` for missing, expired, or persistent keys.
    fn ttl(&self, key: &str) -> Result<Option<Duration>, ZSetError>;

    /// Physically delete every expired key. Returns the number of keys removed.
    fn purge_expired(&self) -> Result<usize, ZSetError>;
}

/// Number of entries an inclusive `[start, stop]` range can hold.
pub(crate) fn range_len(start: usize, stop: usize) -> usize {
    if stop < start {
        0
    } else {
        (stop - start).saturating_add(1)
    }
}

pub(crate) fn deadline(now: u64, ttl: Duration) -> u64 {
    now.saturating_add(ttl.as_millis().min(u64::MAX as u128) as u64)
}
