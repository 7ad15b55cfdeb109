pub mod api;
pub mod events;
pub mod fanout;
pub mod followers;
pub mod member;
pub mod metrics;
pub mod model;
pub mod reader;
pub mod store;
pub mod worker;

use std::sync::Arc;

use axum::Router;
use feedline_core::Module;
use feedline_zset::ZSetStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;

use events::EventHandler;
use fanout::{FanoutConfig, FanoutCoordinator};
use followers::FollowerSource;
use metrics::FanoutMetrics;
use reader::TimelineReader;
use store::{TimelineConfig, TimelineStore};
use worker::{Dispatcher, WorkerConfig};

/// Everything tunable about the feed.
#[derive(Debug, Clone, Default)]
pub struct FeedConfig {
    pub timeline: TimelineConfig,
    pub fanout: FanoutConfig,
    pub worker: WorkerConfig,
}

/// The Feed module: fan-out-on-write timelines.
///
/// Owns the timeline store, the fan-out pipeline, the background
/// dispatcher and the expiry sweeper. Must be created inside a tokio
/// runtime.
pub struct FeedModule {
    reader: Arc<TimelineReader>,
    events: Arc<EventHandler>,
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<FanoutMetrics>,
    cancel: CancellationToken,
    sweeper: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl FeedModule {
    pub fn new(
        zset: Arc<dyn ZSetStore>,
        followers: Arc<dyn FollowerSource>,
        config: FeedConfig,
    ) -> Self {
        let metrics = Arc::new(FanoutMetrics::new());
        let store = Arc::new(TimelineStore::new(zset, config.timeline));
        let coordinator = Arc::new(FanoutCoordinator::new(
            Arc::clone(&store),
            followers,
            config.fanout,
            Arc::clone(&metrics),
        ));

        let cancel = CancellationToken::new();
        let dispatcher = Arc::new(Dispatcher::new(
            coordinator,
            config.worker.deadline,
            cancel.clone(),
        ));
        let sweeper = worker::start_sweeper(
            Arc::clone(&store),
            Arc::clone(&metrics),
            config.worker.sweep_interval,
            cancel.clone(),
        );

        Self {
            reader: Arc::new(TimelineReader::new(store)),
            events: Arc::new(EventHandler::new(
                Arc::clone(&dispatcher),
                Arc::clone(&metrics),
            )),
            dispatcher,
            metrics,
            cancel,
            sweeper: std::sync::Mutex::new(Some(sweeper)),
        }
    }

    /// Inbound notification entry point, for message-bus subscribers.
    pub fn events(&self) -> &Arc<EventHandler> {
        &self.events
    }

    pub fn reader(&self) -> &Arc<TimelineReader> {
        &self.reader
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn metrics(&self) -> &Arc<FanoutMetrics> {
        &self.metrics
    }

    /// Stop the dispatcher and the sweeper and wait for both.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.dispatcher.shutdown().await;
        let sweeper = self.sweeper.lock().ok().and_then(|mut s| s.take());
        if let Some(handle) = sweeper {
            if let Err(e) = handle.await {
                error!("timeline sweeper task failed: {e}");
            }
        }
    }
}

impl Module for FeedModule {
    fn name(&self) -> &str {
        "feed"
    }

    fn routes(&self) -> Router {
        api::router(api::FeedState {
            reader: Arc::clone(&self.reader),
            events: Arc::clone(&self.events),
            metrics: Arc::clone(&self.metrics),
        })
    }
}
