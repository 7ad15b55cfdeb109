use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Machine-readable codes carried in every error body.
///
/// Callers branch on these; the accompanying message is for humans only.
pub mod error_code {
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const UNAVAILABLE: &str = "UNAVAILABLE";
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
    pub const INTERNAL: &str = "INTERNAL";
}

/// Error returned by every HTTP-facing operation of the feed service.
///
/// Rendered as `{"code": "...", "message": "..."}` with the status from
/// [`ServiceError::status_code`].
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),

    /// Bad limit, unknown content type, undecodable page token.
    #[error("{0}")]
    Validation(String),

    /// The service cannot take the request right now (shutting down,
    /// upstream unreachable). Safe to retry elsewhere.
    #[error("{0}")]
    Unavailable(String),

    /// The timeline store failed. Never papered over with stale data.
    #[error("{0}")]
    Storage(String),

    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ServiceError::NotFound(_) => (StatusCode::NOT_FOUND, error_code::NOT_FOUND),
            ServiceError::Validation(_) => (StatusCode::BAD_REQUEST, error_code::VALIDATION_FAILED),
            ServiceError::Unavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, error_code::UNAVAILABLE)
            }
            ServiceError::Storage(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, error_code::STORAGE_ERROR)
            }
            ServiceError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, error_code::INTERNAL),
        }
    }

    pub fn error_code(&self) -> &'static str {
        self.parts().1
    }

    pub fn status_code(&self) -> StatusCode {
        self.parts().0
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();
        let body = serde_json::json!({
            "code": code,
            "message": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}
