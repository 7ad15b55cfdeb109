use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};

use feedline_core::ServiceError;

use super::FeedState;
use crate::model::{TimelinePage, TimelineQuery};

pub fn router(state: FeedState) -> Router {
    Router::new()
        .route("/timelines/{user_id}", get(get_timeline))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /timelines/:user_id
// ---------------------------------------------------------------------------

async fn get_timeline(
    State(state): State<FeedState>,
    Path(user_id): Path<String>,
    query: Result<Query<TimelineQuery>, QueryRejection>,
) -> Result<Json<TimelinePage>, ServiceError> {
    let Query(query) = query.map_err(|e| ServiceError::Validation(e.body_text()))?;
    let reader = state.reader.clone();
    let page = tokio::task::spawn_blocking(move || reader.read(&user_id, &query))
        .await
        .map_err(|e| ServiceError::Internal(format!("timeline read task: {e}")))??;
    Ok(Json(page))
}
