mod events;
mod stats;
mod timelines;

use std::sync::Arc;

use axum::Router;

use crate::events::EventHandler;
use crate::metrics::FanoutMetrics;
use crate::reader::TimelineReader;

/// Shared handler state.
#[derive(Clone)]
pub struct FeedState {
    pub reader: Arc<TimelineReader>,
    pub events: Arc<EventHandler>,
    pub metrics: Arc<FanoutMetrics>,
}

/// Build the complete feed module router.
///
/// Routes:
/// - `GET  /timelines/{user_id}`  read a page of a timeline
/// - `POST /events/post.created`  webhook delivery of a new content item
/// - `GET  /stats`                fan-out counters
pub fn router(state: FeedState) -> Router {
    Router::new()
        .merge(timelines::router(state.clone()))
        .merge(events::router(state.clone()))
        .merge(stats::router(state))
}
