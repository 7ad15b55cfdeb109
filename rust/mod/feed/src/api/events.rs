use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};

use feedline_core::ServiceError;

use super::FeedState;
use crate::events::POST_CREATED_TOPIC;

pub fn router(state: FeedState) -> Router {
    Router::new()
        .route(&format!("/events/{POST_CREATED_TOPIC}"), post(post_created))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// POST /events/post.created
// ---------------------------------------------------------------------------

/// Acknowledges with 202 whatever the payload. `accepted` is false when it
/// was dropped as malformed; the sender must not redeliver it either way.
/// Only a stopping server answers 503, so the event can go elsewhere.
async fn post_created(
    State(state): State<FeedState>,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), ServiceError> {
    if !state.events.is_accepting() {
        return Err(ServiceError::Unavailable("feed is shutting down".into()));
    }
    let accepted = state.events.handle_post_created(&body);
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "accepted": accepted })),
    ))
}
