use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use feedline_core::{from_unix_secs, ServiceError};
use feedline_zset::{WriteBatch, ZSetError, ZSetStore};

use crate::member::{self, timeline_key};
use crate::model::{ContentReference, TimelineReadRequest};

/// Timelines expire this long after their last write.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 24 * 3600);

/// Entries kept per timeline after each write.
pub const DEFAULT_MAX_LEN: usize = 500;

/// Retention settings for timelines.
#[derive(Debug, Clone)]
pub struct TimelineConfig {
    /// Expiration window, refreshed on every write.
    pub ttl: Duration,
    /// Keep only the newest `max_len` entries by score. 0 = unbounded.
    pub max_len: usize,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            max_len: DEFAULT_MAX_LEN,
        }
    }
}

fn storage_err(e: ZSetError) -> ServiceError {
    ServiceError::Storage(e.to_string())
}

/// Per-user timelines on top of a [`ZSetStore`].
///
/// Each timeline lives under `timeline:{user_id}`; members are composite
/// keys (see [`crate::member`]) scored by the content's creation time.
/// Timelines are created implicitly by the first write and disappear only
/// through expiry.
pub struct TimelineStore {
    zset: Arc<dyn ZSetStore>,
    config: TimelineConfig,
}

impl TimelineStore {
    pub fn new(zset: Arc<dyn ZSetStore>, config: TimelineConfig) -> Self {
        Self { zset, config }
    }

    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    /// Upsert `item` into the timeline of every user in `user_ids`, trim to
    /// `max_len`, and refresh each timeline's TTL.
    ///
    /// This is one pipeline of independent per-user upserts. The result
    /// reports the batch as a whole, never per user.
    pub fn add_to_timelines(
        &self,
        user_ids: &[String],
        item: &ContentReference,
    ) -> Result<(), ServiceError> {
        if user_ids.is_empty() {
            return Ok(());
        }

        let member = member::encode(item);
        let score = item.score();
        let mut batch = WriteBatch::with_capacity(user_ids.len() * 3);

        for uid in user_ids {
            let key = timeline_key(uid);
            batch.add(key.clone(), member.clone(), score);
            if self.config.max_len > 0 {
                batch.trim_to_top(key.clone(), self.config.max_len);
            }
            batch.expire(key, self.config.ttl);
        }

        self.zset.apply(&batch).map_err(storage_err)
    }

    /// Read `[offset, offset + limit - 1]` of the user's timeline in
    /// descending score order, then drop entries whose type is not in
    /// `req.types` (when non-empty).
    ///
    /// Filtering happens after the range is fetched, so a page may hold
    /// fewer than `limit` items even when more matching items exist
    /// further down the timeline.
    pub fn get_timeline(
        &self,
        req: &TimelineReadRequest,
    ) -> Result<Vec<ContentReference>, ServiceError> {
        self.read_page(req).map(|(items, _)| items)
    }

    /// [`Self::get_timeline`], also telling whether the timeline continues
    /// past the window. Both come from the same ranged read, which fetches
    /// one entry beyond the window.
    pub fn read_page(
        &self,
        req: &TimelineReadRequest,
    ) -> Result<(Vec<ContentReference>, bool), ServiceError> {
        if req.limit <= 0 {
            return Ok((Vec::new(), false));
        }
        let limit = req.limit as usize;
        let start = req.offset.max(0) as usize;
        let stop = start.saturating_add(limit);

        let mut results = self
            .zset
            .rev_range(&timeline_key(&req.user_id), start, stop)
            .map_err(storage_err)?;
        let has_more = results.len() > limit;
        results.truncate(limit);

        let mut items = Vec::with_capacity(results.len());
        for entry in results {
            let Some((content_type, author_id, content_id)) = member::decode(&entry.member) else {
                debug!(user_id = %req.user_id, member = %entry.member, "skipping undecodable timeline member");
                continue;
            };

            if !req.types.is_empty() && !req.types.contains(&content_type) {
                continue;
            }

            let Some(created_at) = from_unix_secs(entry.score) else {
                debug!(user_id = %req.user_id, score = entry.score, "skipping out-of-range score");
                continue;
            };

            items.push(ContentReference {
                content_id,
                author_id,
                content_type,
                created_at,
            });
        }

        Ok((items, has_more))
    }

    /// Number of entries in the user's timeline.
    pub fn timeline_len(&self, user_id: &str) -> Result<usize, ServiceError> {
        self.zset.card(&timeline_key(user_id)).map_err(storage_err)
    }

    /// Remaining lifetime of the user's timeline.
    pub fn timeline_ttl(&self, user_id: &str) -> Result<Option<Duration>, ServiceError> {
        self.zset.ttl(&timeline_key(user_id)).map_err(storage_err)
    }

    /// Physically remove expired timelines.
    pub fn purge_expired(&self) -> Result<usize, ServiceError> {
        self.zset.purge_expired().map_err(storage_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ContentType;
    use feedline_zset::{MemoryZSet, RedbZSet};

    fn at(secs: i64) -> chrono::DateTime<chrono::Utc> {
        from_unix_secs(secs).unwrap()
    }

    fn users(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn read(user_id: &str, offset: i64, limit: i64) -> TimelineReadRequest {
        TimelineReadRequest {
            user_id: user_id.into(),
            limit,
            offset,
            types: Vec::new(),
        }
    }

    fn memory_store(config: TimelineConfig) -> (Arc<MemoryZSet>, TimelineStore) {
        let zset = Arc::new(MemoryZSet::new());
        let store = TimelineStore::new(zset.clone(), config);
        (zset, store)
    }

    #[test]
    fn distributed_item_reads_back_for_followers_only() {
        let (_, store) = memory_store(TimelineConfig::default());
        let item = ContentReference::new("P", "A", ContentType::Video, at(1_700_000_000));
        store
            .add_to_timelines(&users(&["u1", "u2", "u3"]), &item)
            .unwrap();

        let page = store.get_timeline(&read("u1", 0, 10)).unwrap();
        assert_eq!(page, vec![item.clone()]);
        assert!(store.get_timeline(&read("u4", 0, 10)).unwrap().is_empty());
    }

    #[test]
    fn same_item_twice_keeps_one_entry_with_latest_score() {
        let (_, store) = memory_store(TimelineConfig::default());
        let first = ContentReference::new("P", "A", ContentType::Post, at(100));
        let again = ContentReference::new("P", "A", ContentType::Post, at(200));

        store.add_to_timelines(&users(&["u1"]), &first).unwrap();
        store.add_to_timelines(&users(&["u1"]), &again).unwrap();

        let page = store.get_timeline(&read("u1", 0, 10)).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].score(), 200);
        assert_eq!(store.timeline_len("u1").unwrap(), 1);
    }

    #[test]
    fn legacy_two_part_members_decode_without_author() {
        let (zset, store) = memory_store(TimelineConfig::default());
        let mut batch = WriteBatch::new();
        batch
            .add("timeline:u1", "post:old-1", 10)
            .add("timeline:u1", "video:A:new-1", 20)
            .add("timeline:u1", "garbage", 30);
        zset.apply(&batch).unwrap();

        let page = store.get_timeline(&read("u1", 0, 10)).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].content_id, "new-1");
        assert_eq!(page[0].author_id, "A");
        assert_eq!(page[1].content_id, "old-1");
        assert_eq!(page[1].author_id, "");
        assert_eq!(page[1].content_type, ContentType::Post);
    }

    #[test]
    fn type_filter_applies_after_range() {
        let (_, store) = memory_store(TimelineConfig::default());
        let kinds = [
            ContentType::Video,
            ContentType::Post,
            ContentType::Post,
            ContentType::Video,
            ContentType::Article,
        ];
        for (i, kind) in kinds.iter().enumerate() {
            let item = ContentReference::new(format!("c{i}"), "A", *kind, at(1_000 - i as i64));
            store.add_to_timelines(&users(&["u1"]), &item).unwrap();
        }

        let req = TimelineReadRequest {
            types: vec![ContentType::Video],
            ..read("u1", 0, 3)
        };
        let page = store.get_timeline(&req).unwrap();
        // Range covers c0..c2; only c0 is a video even though c3 matches further down.
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].content_id, "c0");
        assert!(page.iter().all(|i| i.content_type == ContentType::Video));
    }

    #[test]
    fn pages_concatenate_to_full_ordering() {
        let dir = tempfile::tempdir().unwrap();
        let zset = Arc::new(RedbZSet::open(&dir.path().join("t.redb")).unwrap());
        let store = TimelineStore::new(zset, TimelineConfig::default());

        for i in 0..23 {
            let item = ContentReference::new(format!("c{i:02}"), "A", ContentType::Post, at(5_000 + i));
            store.add_to_timelines(&users(&["reader"]), &item).unwrap();
        }

        let mut all = Vec::new();
        let mut offset = 0;
        loop {
            let page = store.get_timeline(&read("reader", offset, 5)).unwrap();
            if page.is_empty() {
                break;
            }
            offset += 5;
            all.extend(page);
        }

        assert_eq!(all.len(), 23);
        let scores: Vec<i64> = all.iter().map(|i| i.score()).collect();
        let mut expected = scores.clone();
        expected.sort_unstable_by(|a, b| b.cmp(a));
        expected.dedup();
        assert_eq!(scores, expected);
    }

    #[test]
    fn writes_refresh_ttl_and_cap_length() {
        let (_, store) = memory_store(TimelineConfig {
            ttl: Duration::from_secs(3600),
            max_len: 3,
        });
        for i in 0..5 {
            let item = ContentReference::new(format!("c{i}"), "A", ContentType::Post, at(100 + i));
            store.add_to_timelines(&users(&["u1"]), &item).unwrap();
        }

        assert_eq!(store.timeline_len("u1").unwrap(), 3);
        let ids: Vec<String> = store
            .get_timeline(&read("u1", 0, 10))
            .unwrap()
            .into_iter()
            .map(|i| i.content_id)
            .collect();
        assert_eq!(ids, vec!["c4", "c3", "c2"]);

        let ttl = store.timeline_ttl("u1").unwrap().unwrap();
        assert!(ttl <= Duration::from_secs(3600));
        assert!(ttl > Duration::from_secs(3590));
    }

    #[test]
    fn unbounded_when_max_len_zero() {
        let (_, store) = memory_store(TimelineConfig {
            max_len: 0,
            ..Default::default()
        });
        for i in 0..600 {
            let item = ContentReference::new(format!("c{i}"), "A", ContentType::Post, at(i));
            store.add_to_timelines(&users(&["u1"]), &item).unwrap();
        }
        assert_eq!(store.timeline_len("u1").unwrap(), 600);
    }

    #[test]
    fn zero_limit_reads_nothing() {
        let (_, store) = memory_store(TimelineConfig::default());
        let item = ContentReference::new("c", "A", ContentType::Post, at(1));
        store.add_to_timelines(&users(&["u1"]), &item).unwrap();
        assert!(store.get_timeline(&read("u1", 0, 0)).unwrap().is_empty());
    }

    #[test]
    fn read_page_reports_entries_past_the_window() {
        let store = TimelineStore::new(Arc::new(MemoryZSet::new()), TimelineConfig::default());
        for i in 0..5 {
            let item = ContentReference::new(format!("c{i}"), "A", ContentType::Post, at(100 + i));
            store.add_to_timelines(&users(&["u1"]), &item).unwrap();
        }

        let (items, more) = store.read_page(&read("u1", 0, 4)).unwrap();
        assert_eq!(items.len(), 4);
        assert!(more);

        let (items, more) = store.read_page(&read("u1", 0, 5)).unwrap();
        assert_eq!(items.len(), 5);
        assert!(!more);

        let (items, more) = store.read_page(&read("u1", 3, 2)).unwrap();
        assert_eq!(items[0].content_id, "c1");
        assert!(!more);
    }
}
