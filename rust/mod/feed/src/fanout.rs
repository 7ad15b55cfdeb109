//! Fan-out on write.
//!
//! [`FanoutCoordinator::distribute_post`] replicates one content reference
//! into the timeline of every follower of its author:
//!
//! ```text
//! followers (upstream batches) ──► re-chunk to chunk_size ──► add_to_timelines
//!                                                           ──► add_to_timelines
//!                                                           ──► ...
//! ```
//!
//! Chunks are written one after another as they fill; the full follower
//! set is never held in memory. A failed chunk is logged and skipped. A
//! failed follower stream ends the distribution with the chunks already
//! written left in place.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn, Instrument};

use crate::followers::{FollowerError, FollowerSource};
use crate::member::is_encodable_id;
use crate::metrics::FanoutMetrics;
use crate::model::{ContentReference, FanoutReport, FanoutStage};
use crate::store::TimelineStore;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_FOLLOWER_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone)]
pub struct FanoutConfig {
    /// Followers per timeline write.
    pub chunk_size: usize,
    /// Followers requested per upstream page.
    pub follower_batch_size: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            follower_batch_size: DEFAULT_FOLLOWER_BATCH_SIZE,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FanoutError {
    /// The item cannot be encoded into a timeline member. Nothing was
    /// contacted or written.
    #[error("invalid content reference: {0}")]
    InvalidItem(String),

    /// Follower enumeration failed. `report` describes what was written
    /// before the failure.
    #[error("follower stream failed after {} followers: {source}", .report.followers_total)]
    FollowerStream {
        report: FanoutReport,
        source: FollowerError,
    },
}

impl FanoutError {
    /// Partial progress, when any distribution work started.
    pub fn report(&self) -> Option<&FanoutReport> {
        match self {
            Self::InvalidItem(_) => None,
            Self::FollowerStream { report, .. } => Some(report),
        }
    }
}

/// Distributes content references to follower timelines.
pub struct FanoutCoordinator {
    store: Arc<TimelineStore>,
    followers: Arc<dyn FollowerSource>,
    config: FanoutConfig,
    metrics: Arc<FanoutMetrics>,
}

impl FanoutCoordinator {
    pub fn new(
        store: Arc<TimelineStore>,
        followers: Arc<dyn FollowerSource>,
        config: FanoutConfig,
        metrics: Arc<FanoutMetrics>,
    ) -> Self {
        Self {
            store,
            followers,
            config,
            metrics,
        }
    }

    pub fn store(&self) -> &Arc<TimelineStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<FanoutMetrics> {
        &self.metrics
    }

    /// Write `item` into the timeline of every follower of its author.
    ///
    /// Returns `Ok` once the follower sequence is exhausted, even if some
    /// chunk writes failed (see [`FanoutReport::failed_batches`]). The
    /// author's own timeline is not written. No retries are attempted.
    pub async fn distribute_post(
        &self,
        item: &ContentReference,
    ) -> Result<FanoutReport, FanoutError> {
        let (progress, _) = watch::channel(FanoutReport::new(item));
        self.distribute_post_tracked(item, &progress).await
    }

    /// [`Self::distribute_post`], publishing the report to `progress` after
    /// every step. If the future is dropped part way, `progress` still
    /// holds the counts of the chunks confirmed so far.
    pub async fn distribute_post_tracked(
        &self,
        item: &ContentReference,
        progress: &watch::Sender<FanoutReport>,
    ) -> Result<FanoutReport, FanoutError> {
        let span = tracing::info_span!(
            "fanout",
            content_id = %item.content_id,
            author_id = %item.author_id,
        );
        self.run(item, progress).instrument(span).await
    }

    async fn run(
        &self,
        item: &ContentReference,
        progress: &watch::Sender<FanoutReport>,
    ) -> Result<FanoutReport, FanoutError> {
        validate(item).inspect_err(|_| self.metrics.distribution_rejected())?;

        self.metrics.distribution_started();
        let item = Arc::new(item.clone());
        let mut report = FanoutReport::new(&item);
        let chunk_size = self.config.chunk_size.max(1);

        report.stage = FanoutStage::FollowersEnumerating;
        progress.send_replace(report.clone());
        let mut stream = match self
            .followers
            .stream_followers(&item.author_id, self.config.follower_batch_size)
            .await
        {
            Ok(s) => s,
            Err(e) => return Err(self.abort(report, e, progress)),
        };

        let mut pending: Vec<String> = Vec::with_capacity(chunk_size);
        while let Some(batch) = stream.next().await {
            let ids = match batch {
                Ok(ids) => ids,
                Err(e) => return Err(self.abort(report, e, progress)),
            };
            report.followers_total += ids.len() as u64;
            self.metrics.followers_pulled(ids.len() as u64);
            pending.extend(ids);
            progress.send_replace(report.clone());

            while pending.len() >= chunk_size {
                let chunk: Vec<String> = pending.drain(..chunk_size).collect();
                self.write_chunk(&mut report, &item, chunk, progress).await;
            }
        }
        if !pending.is_empty() {
            self.write_chunk(&mut report, &item, pending, progress).await;
        }

        report.stage = FanoutStage::Completed;
        progress.send_replace(report.clone());
        info!(
            followers = report.followers_total,
            delivered = report.delivered,
            failed = report.failed,
            batches = report.batches,
            "fanout completed"
        );
        self.metrics.distribution_finished(&report);
        Ok(report)
    }

    /// Write one chunk on the blocking pool. Failures are recorded, never
    /// propagated.
    async fn write_chunk(
        &self,
        report: &mut FanoutReport,
        item: &Arc<ContentReference>,
        chunk: Vec<String>,
        progress: &watch::Sender<FanoutReport>,
    ) {
        report.stage = FanoutStage::BatchDispatching;
        progress.send_replace(report.clone());
        let index = report.batches;
        let start = report.delivered + report.failed;
        let size = chunk.len() as u64;

        let store = Arc::clone(&self.store);
        let item = Arc::clone(item);
        let result = tokio::task::spawn_blocking(move || store.add_to_timelines(&chunk, &item))
            .await
            .map_err(|e| format!("write task: {e}"))
            .and_then(|r| r.map_err(|e| e.to_string()));

        report.batches += 1;
        match &result {
            Ok(()) => {
                report.delivered += size;
                debug!(chunk = index, start, size, "chunk written");
            }
            Err(e) => {
                report.failed += size;
                report.failed_batches += 1;
                error!(chunk = index, start, size, error = %e, "chunk write failed");
            }
        }
        self.metrics.chunk_written(size, result.is_ok());
        progress.send_replace(report.clone());
    }

    fn abort(
        &self,
        mut report: FanoutReport,
        source: FollowerError,
        progress: &watch::Sender<FanoutReport>,
    ) -> FanoutError {
        report.stage = FanoutStage::AbortedOnStreamError;
        progress.send_replace(report.clone());
        warn!(
            followers = report.followers_total,
            delivered = report.delivered,
            error = %source,
            "follower stream failed, aborting fanout"
        );
        self.metrics.distribution_finished(&report);
        FanoutError::FollowerStream { report, source }
    }
}

fn validate(item: &ContentReference) -> Result<(), FanoutError> {
    if !is_encodable_id(&item.author_id) {
        return Err(FanoutError::InvalidItem(format!(
            "author_id must be non-empty and contain no ':' (got {:?})",
            item.author_id
        )));
    }
    if !is_encodable_id(&item.content_id) {
        return Err(FanoutError::InvalidItem(format!(
            "content_id must be non-empty and contain no ':' (got {:?})",
            item.content_id
        )));
    }
    Ok(())
}
