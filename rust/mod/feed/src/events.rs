use std::sync::Arc;

use tracing::{debug, error};

use crate::metrics::FanoutMetrics;
use crate::model::{ContentReference, PostCreatedEvent};
use crate::worker::Dispatcher;

/// Topic the content service publishes new items on.
pub const POST_CREATED_TOPIC: &str = "post.created";

/// Entry point for inbound content notifications.
///
/// Transport-agnostic: a message-bus subscriber or the HTTP webhook hands
/// over the raw payload and acknowledges as soon as this returns.
pub struct EventHandler {
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<FanoutMetrics>,
}

impl EventHandler {
    pub fn new(dispatcher: Arc<Dispatcher>, metrics: Arc<FanoutMetrics>) -> Self {
        Self {
            dispatcher,
            metrics,
        }
    }

    /// Whether new distributions can still be scheduled.
    pub fn is_accepting(&self) -> bool {
        self.dispatcher.is_running()
    }

    /// Decode a `post.created` payload and schedule its distribution.
    ///
    /// Returns `false` when the payload is malformed; it is logged, counted
    /// and dropped. Never waits for the distribution itself.
    pub fn handle_post_created(&self, payload: &[u8]) -> bool {
        self.metrics.event_received();

        let event: PostCreatedEvent = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(e) => return self.malformed(&e.to_string()),
        };
        let item = match ContentReference::try_from(event) {
            Ok(item) => item,
            Err(e) => return self.malformed(&e),
        };

        debug!(
            topic = POST_CREATED_TOPIC,
            content_id = %item.content_id,
            author_id = %item.author_id,
            "scheduling fanout"
        );
        self.dispatcher.spawn(item);
        true
    }

    fn malformed(&self, reason: &str) -> bool {
        self.metrics.event_malformed();
        error!(topic = POST_CREATED_TOPIC, reason, "dropping malformed event");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use feedline_zset::MemoryZSet;
    use tokio_util::sync::CancellationToken;

    use crate::fanout::{FanoutConfig, FanoutCoordinator};
    use crate::followers::StaticFollowers;
    use crate::store::{TimelineConfig, TimelineStore};

    fn handler() -> (Arc<Dispatcher>, EventHandler) {
        let mut graph = StaticFollowers::default();
        graph.set("user-123", vec!["u1".into(), "u2".into()]);
        let metrics = Arc::new(FanoutMetrics::new());
        let store = Arc::new(TimelineStore::new(
            Arc::new(MemoryZSet::new()),
            TimelineConfig::default(),
        ));
        let coordinator = Arc::new(FanoutCoordinator::new(
            store,
            Arc::new(graph),
            FanoutConfig::default(),
            Arc::clone(&metrics),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            coordinator,
            Duration::from_secs(5),
            CancellationToken::new(),
        ));
        (Arc::clone(&dispatcher), EventHandler::new(dispatcher, metrics))
    }

    #[tokio::test]
    async fn valid_event_is_distributed() {
        let (dispatcher, handler) = handler();
        let payload = br#"{"id":"post-456","author_id":"user-123","type":"video","created_at":"2023-11-14T22:13:20Z","content":"ignored"}"#;

        assert!(handler.handle_post_created(payload));
        dispatcher.drain().await;

        let store = dispatcher.coordinator().store();
        assert_eq!(store.timeline_len("u1").unwrap(), 1);
        assert_eq!(store.timeline_len("u2").unwrap(), 1);
        assert_eq!(store.timeline_len("user-123").unwrap(), 0);
    }

    #[tokio::test]
    async fn malformed_events_are_dropped_and_counted() {
        let (dispatcher, handler) = handler();
        let bad: [&[u8]; 5] = [
            b"not json",
            br#"{"id":"p","author_id":"a","type":"video"}"#,
            br#"{"id":"p","author_id":"a","type":"video","created_at":"yesterday"}"#,
            br#"{"id":"p","author_id":"a","type":"podcast","created_at":"2023-11-14T22:13:20Z"}"#,
            br#"{"id":"","author_id":"a","type":"post","created_at":"2023-11-14T22:13:20Z"}"#,
        ];
        for payload in bad {
            assert!(!handler.handle_post_created(payload));
        }
        dispatcher.drain().await;

        let stats = dispatcher.coordinator().metrics().snapshot();
        assert_eq!(stats.events_received, 5);
        assert_eq!(stats.malformed_events, 5);
        assert_eq!(stats.distributions, 0);
    }
}
