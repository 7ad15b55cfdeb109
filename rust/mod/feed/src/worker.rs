use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::fanout::FanoutCoordinator;
use crate::metrics::FanoutMetrics;
use crate::model::{ContentReference, FanoutReport, FanoutStage};
use crate::store::TimelineStore;

/// Configuration for background dispatch and sweeping.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Upper bound on one distribution. Chunks not written by then are dropped.
    pub deadline: Duration,
    /// How often expired timelines are purged.
    pub sweep_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(300),
        }
    }
}

/// Runs each distribution as its own task, bounded by a deadline.
///
/// Results are logged and dropped. A distribution that exceeds the
/// deadline stops where it is: the chunk in flight may still land, later
/// chunks are never attempted, and nothing is retried.
pub struct Dispatcher {
    coordinator: Arc<FanoutCoordinator>,
    deadline: Duration,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn new(
        coordinator: Arc<FanoutCoordinator>,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            coordinator,
            deadline,
            tracker: TaskTracker::new(),
            cancel,
        }
    }

    pub fn coordinator(&self) -> &Arc<FanoutCoordinator> {
        &self.coordinator
    }

    /// Schedule the distribution of `item` and return immediately.
    ///
    /// The handle resolves to the final report: completed, aborted or timed
    /// out with the counts confirmed before the deadline. `None` when the
    /// item was rejected or the dispatcher was shutting down.
    pub fn spawn(&self, item: ContentReference) -> JoinHandle<Option<FanoutReport>> {
        let coordinator = Arc::clone(&self.coordinator);
        let deadline = self.deadline;
        let cancel = self.cancel.clone();

        self.tracker.spawn(async move {
            if cancel.is_cancelled() {
                warn!(content_id = %item.content_id, "dispatcher stopped, dropping fanout");
                return None;
            }
            let (progress, _) = watch::channel(FanoutReport::new(&item));
            let run = tokio::time::timeout(
                deadline,
                coordinator.distribute_post_tracked(&item, &progress),
            );
            tokio::select! {
                _ = cancel.cancelled() => {
                    let report = progress.borrow().clone();
                    warn!(
                        content_id = %item.content_id,
                        delivered = report.delivered,
                        "fanout cancelled by shutdown"
                    );
                    None
                }
                result = run => {
                    match result {
                        Ok(Ok(report)) => {
                            debug!(content_id = %item.content_id, stage = %report.stage, "fanout finished");
                            Some(report)
                        }
                        Ok(Err(e)) => {
                            error!(content_id = %item.content_id, error = %e, "fanout failed");
                            e.report().cloned()
                        }
                        Err(_) => {
                            let mut report = progress.borrow().clone();
                            report.stage = FanoutStage::TimedOut;
                            coordinator.metrics().distribution_finished(&report);
                            error!(
                                content_id = %item.content_id,
                                author_id = %item.author_id,
                                ?deadline,
                                stage = %report.stage,
                                followers = report.followers_total,
                                delivered = report.delivered,
                                failed = report.failed,
                                batches = report.batches,
                                "fanout deadline exceeded, remaining chunks dropped"
                            );
                            Some(report)
                        }
                    }
                }
            }
        })
    }

    /// False once [`Self::shutdown`] has been called.
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Distributions currently running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for every scheduled distribution to finish.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Cancel in-flight distributions and wait for their tasks to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("fanout dispatcher stopped");
    }
}

/// Start the expired-timeline sweeper. Stops when `cancel` fires.
pub fn start_sweeper(
    store: Arc<TimelineStore>,
    metrics: Arc<FanoutMetrics>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("timeline sweeper started (interval={interval:?})");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("timeline sweeper stopped");
                    break;
                }
                _ = tokio::time::sleep(interval) => {
                    debug!("timeline sweep");
                    let store = Arc::clone(&store);
                    match tokio::task::spawn_blocking(move || store.purge_expired()).await {
                        Ok(Ok(0)) => {}
                        Ok(Ok(n)) => {
                            metrics.timelines_purged(n as u64);
                            info!("timeline sweeper: purged {n} expired timelines");
                        }
                        Ok(Err(e)) => error!("timeline sweeper error: {e}"),
                        Err(e) => error!("timeline sweeper task failed: {e}"),
                    }
                }
            }
        }
    })
}
