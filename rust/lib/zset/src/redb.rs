use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use redb::{Database, ReadableTable, Table, TableDefinition};
use tracing::debug;

use crate::error::{storage, ZSetError};
use crate::traits::{
    deadline, range_len, system_clock, Clock, ScoredMember, WriteBatch, ZOp, ZSetStore,
};

type MemberKey = (&'static str, &'static str);
type OrderKey = (&'static str, i64, &'static str);

/// (set key, member) → score.
const MEMBERS: TableDefinition<MemberKey, i64> = TableDefinition::new("zset_members");
/// (set key, !score, member) → (). Ascending iteration yields descending scores.
const ORDER: TableDefinition<OrderKey, ()> = TableDefinition::new("zset_order");
/// set key → expiration deadline (unix ms).
const EXPIRY: TableDefinition<&str, u64> = TableDefinition::new("zset_expiry");

/// RedbZSet is a ZSetStore backed by redb, a pure-Rust embedded
/// key-value database.
///
/// Scores are stored bitwise-inverted in the ordering index so that a
/// forward range scan walks a set from its highest score down. A whole
/// [`WriteBatch`] commits as a single write transaction.
pub struct RedbZSet {
    db: Arc<Database>,
    clock: Clock,
}

impl RedbZSet {
    /// Open or create a redb database at the given path.
    pub fn open(path: &Path) -> Result<Self, ZSetError> {
        Self::open_with_clock(path, system_clock())
    }

    /// Open with an explicit clock (used by expiry tests).
    pub fn open_with_clock(path: &Path, clock: Clock) -> Result<Self, ZSetError> {
        let db = Database::create(path).map_err(storage)?;

        // Ensure the tables exist so read transactions never see them missing.
        let write_txn = db.begin_write().map_err(storage)?;
        {
            write_txn.open_table(MEMBERS).map_err(storage)?;
            write_txn.open_table(ORDER).map_err(storage)?;
            write_txn.open_table(EXPIRY).map_err(storage)?;
        }
        write_txn.commit().map_err(storage)?;

        debug!("RedbZSet: opened {:?}", path);
        Ok(Self {
            db: Arc::new(db),
            clock,
        })
    }
}

fn expires_at(
    expiry: &impl ReadableTable<&'static str, u64>,
    key: &str,
) -> Result<Option<u64>, ZSetError> {
    Ok(expiry.get(key).map_err(storage)?.map(|g| g.value()))
}

fn is_expired(
    expiry: &impl ReadableTable<&'static str, u64>,
    key: &str,
    now: u64,
) -> Result<bool, ZSetError> {
    Ok(expires_at(expiry, key)?.is_some_and(|t| t <= now))
}

/// Walk the ordering index of `key`, skipping `skip` members and returning
/// at most `limit`.
fn scan_desc(
    order: &impl ReadableTable<OrderKey, ()>,
    key: &str,
    skip: usize,
    limit: usize,
) -> Result<Vec<ScoredMember>, ZSetError> {
    let mut results = Vec::new();
    if limit == 0 {
        return Ok(results);
    }

    let iter = order.range((key, i64::MIN, "")..).map_err(storage)?;
    for (seen, entry) in iter.enumerate() {
        let (k, _) = entry.map_err(storage)?;
        let (set_key, inverted, member) = k.value();
        if set_key != key {
            break;
        }
        if seen < skip {
            continue;
        }
        results.push(ScoredMember {
            member: member.to_string(),
            score: !inverted,
        });
        if results.len() == limit {
            break;
        }
    }
    Ok(results)
}

fn count(order: &impl ReadableTable<OrderKey, ()>, key: &str) -> Result<usize, ZSetError> {
    let mut n = 0;
    for entry in order.range((key, i64::MIN, "")..).map_err(storage)? {
        let (k, _) = entry.map_err(storage)?;
        if k.value().0 != key {
            break;
        }
        n += 1;
    }
    Ok(n)
}

fn remove_member(
    members: &mut Table<'_, MemberKey, i64>,
    order: &mut Table<'_, OrderKey, ()>,
    key: &str,
    member: &str,
    score: i64,
) -> Result<(), ZSetError> {
    members.remove((key, member)).map_err(storage)?;
    order.remove((key, !score, member)).map_err(storage)?;
    Ok(())
}

/// Drop every member and the expiration of `key`.
fn purge_key(
    members: &mut Table<'_, MemberKey, i64>,
    order: &mut Table<'_, OrderKey, ()>,
    expiry: &mut Table<'_, &'static str, u64>,
    key: &str,
) -> Result<(), ZSetError> {
    for entry in scan_desc(&*order, key, 0, usize::MAX)? {
        remove_member(members, order, key, &entry.member, entry.score)?;
    }
    expiry.remove(key).map_err(storage)?;
    Ok(())
}

impl ZSetStore for RedbZSet {
    fn apply(&self, batch: &WriteBatch) -> Result<(), ZSetError> {
        if batch.is_empty() {
            return Ok(());
        }
        let now = (self.clock)();

        let write_txn = self.db.begin_write().map_err(storage)?;
        {
            let mut members = write_txn.open_table(MEMBERS).map_err(storage)?;
            let mut order = write_txn.open_table(ORDER).map_err(storage)?;
            let mut expiry = write_txn.open_table(EXPIRY).map_err(storage)?;

            for op in batch.ops() {
                // An expired key restarts empty on its next write.
                if is_expired(&expiry, op.key(), now)? {
                    purge_key(&mut members, &mut order, &mut expiry, op.key())?;
                }

                match op {
                    ZOp::Add { key, member, score } => {
                        let old = members
                            .insert((key.as_str(), member.as_str()), *score)
                            .map_err(storage)?
                            .map(|g| g.value());
                        if old == Some(*score) {
                            continue;
                        }
                        if let Some(old) = old {
                            order
                                .remove((key.as_str(), !old, member.as_str()))
                                .map_err(storage)?;
                        }
                        order
                            .insert((key.as_str(), !*score, member.as_str()), ())
                            .map_err(storage)?;
                    }
                    ZOp::Expire { key, ttl } => {
                        if !scan_desc(&order, key, 0, 1)?.is_empty() {
                            expiry
                                .insert(key.as_str(), deadline(now, *ttl))
                                .map_err(storage)?;
                        }
                    }
                    ZOp::TrimToTop { key, keep } => {
                        let surplus = scan_desc(&order, key, *keep, usize::MAX)?;
                        for entry in &surplus {
                            remove_member(&mut members, &mut order, key, &entry.member, entry.score)?;
                        }
                        if *keep == 0 {
                            expiry.remove(key.as_str()).map_err(storage)?;
                        }
                    }
                }
            }
        }
        write_txn.commit().map_err(storage)?;
        Ok(())
    }

    fn rev_range(
        &self,
        key: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<ScoredMember>, ZSetError> {
        let now = (self.clock)();
        let read_txn = self.db.begin_read().map_err(storage)?;
        let expiry = read_txn.open_table(EXPIRY).map_err(storage)?;
        if is_expired(&expiry, key, now)? {
            return Ok(Vec::new());
        }
        let order = read_txn.open_table(ORDER).map_err(storage)?;
        scan_desc(&order, key, start, range_len(start, stop))
    }

    fn card(&self, key: &str) -> Result<usize, ZSetError> {
        let now = (self.clock)();
        let read_txn = self.db.begin_read().map_err(storage)?;
        let expiry = read_txn.open_table(EXPIRY).map_err(storage)?;
        if is_expired(&expiry, key, now)? {
            return Ok(0);
        }
        let order = read_txn.open_table(ORDER).map_err(storage)?;
        count(&order, key)
    }

    fn score(&self, key: &str, member: &str) -> Result<Option<i64>, ZSetError> {
        let now = (self.clock)();
        let read_txn = self.db.begin_read().map_err(storage)?;
        let expiry = read_txn.open_table(EXPIRY).map_err(storage)?;
        if is_expired(&expiry, key, now)? {
            return Ok(None);
        }
        let members = read_txn.open_table(MEMBERS).map_err(storage)?;
        Ok(members
            .get((key, member))
            .map_err(storage)?
            .map(|g| g.value()))
    }

    fn ttl(&self, key: &str) -> Result<Option<Duration>, ZSetError> {
        let now = (self.clock)();
        let read_txn = self.db.begin_read().map_err(storage)?;
        let expiry = read_txn.open_table(EXPIRY).map_err(storage)?;
        Ok(expires_at(&expiry, key)?
            .filter(|t| *t > now)
            .map(|t| Duration::from_millis(t - now)))
    }

    fn purge_expired(&self) -> Result<usize, ZSetError> {
        let now = (self.clock)();
        let write_txn = self.db.begin_write().map_err(storage)?;
        let purged;
        {
            let mut members = write_txn.open_table(MEMBERS).map_err(storage)?;
            let mut order = write_txn.open_table(ORDER).map_err(storage)?;
            let mut expiry = write_txn.open_table(EXPIRY).map_err(storage)?;

            let mut expired = Vec::new();
            for entry in expiry.iter().map_err(storage)? {
                let (k, v) = entry.map_err(storage)?;
                if v.value() <= now {
                    expired.push(k.value().to_string());
                }
            }

            for key in &expired {
                purge_key(&mut members, &mut order, &mut expiry, key)?;
            }
            purged = expired.len();
        }
        write_txn.commit().map_err(storage)?;

        if purged > 0 {
            debug!("RedbZSet: purged {} expired keys", purged);
        }
        Ok(purged)
    }
}
