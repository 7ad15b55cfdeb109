use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use super::FeedState;
use crate::metrics::MetricsSnapshot;

pub fn router(state: FeedState) -> Router {
    Router::new()
        .route("/stats", get(stats))
        .with_state(state)
}

async fn stats(State(state): State<FeedState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
