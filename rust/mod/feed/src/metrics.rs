use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::model::{FanoutReport, FanoutStage};

/// Process-wide fan-out counters.
#[derive(Debug, Default)]
pub struct FanoutMetrics {
    events_received: AtomicU64,
    malformed_events: AtomicU64,
    distributions: AtomicU64,
    completed: AtomicU64,
    aborted: AtomicU64,
    timed_out: AtomicU64,
    rejected: AtomicU64,
    followers_seen: AtomicU64,
    delivered: AtomicU64,
    failed_deliveries: AtomicU64,
    batches: AtomicU64,
    failed_batches: AtomicU64,
    purged_timelines: AtomicU64,
}

/// Point-in-time copy of [`FanoutMetrics`], served by `GET /stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub events_received: u64,
    pub malformed_events: u64,
    pub distributions: u64,
    pub completed: u64,
    pub aborted: u64,
    pub timed_out: u64,
    pub rejected: u64,
    pub followers_seen: u64,
    pub delivered: u64,
    pub failed_deliveries: u64,
    pub batches: u64,
    pub failed_batches: u64,
    pub purged_timelines: u64,
}

fn bump(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

impl FanoutMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_received(&self) {
        bump(&self.events_received, 1);
    }

    pub fn event_malformed(&self) {
        bump(&self.malformed_events, 1);
    }

    pub fn distribution_started(&self) {
        bump(&self.distributions, 1);
    }

    pub fn distribution_rejected(&self) {
        bump(&self.rejected, 1);
    }

    /// Account one chunk write of `size` followers.
    pub fn chunk_written(&self, size: u64, ok: bool) {
        bump(&self.batches, 1);
        if ok {
            bump(&self.delivered, size);
        } else {
            bump(&self.failed_batches, 1);
            bump(&self.failed_deliveries, size);
        }
    }

    pub fn followers_pulled(&self, n: u64) {
        bump(&self.followers_seen, n);
    }

    /// Account the terminal stage of a distribution. Reports still in
    /// progress are ignored.
    pub fn distribution_finished(&self, report: &FanoutReport) {
        if !report.stage.is_terminal() {
            return;
        }
        let counter = match report.stage {
            FanoutStage::Completed => &self.completed,
            FanoutStage::AbortedOnStreamError => &self.aborted,
            _ => &self.timed_out,
        };
        bump(counter, 1);
    }

    pub fn timelines_purged(&self, n: u64) {
        bump(&self.purged_timelines, n);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            events_received: load(&self.events_received),
            malformed_events: load(&self.malformed_events),
            distributions: load(&self.distributions),
            completed: load(&self.completed),
            aborted: load(&self.aborted),
            timed_out: load(&self.timed_out),
            rejected: load(&self.rejected),
            followers_seen: load(&self.followers_seen),
            delivered: load(&self.delivered),
            failed_deliveries: load(&self.failed_deliveries),
            batches: load(&self.batches),
            failed_batches: load(&self.failed_batches),
            purged_timelines: load(&self.purged_timelines),
        }
    }
}
