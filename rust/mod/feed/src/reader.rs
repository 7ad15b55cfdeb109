use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use tracing::debug;

use feedline_core::ServiceError;

use crate::model::{ContentReference, ContentType, TimelinePage, TimelineQuery, TimelineReadRequest};
use crate::store::TimelineStore;

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

/// Read side of the feed. Normalizes pagination and forwards to the
/// [`TimelineStore`]; there is no cache of its own.
pub struct TimelineReader {
    store: Arc<TimelineStore>,
}

impl TimelineReader {
    pub fn new(store: Arc<TimelineStore>) -> Self {
        Self { store }
    }

    /// Read one page. `limit <= 0` becomes [`DEFAULT_LIMIT`], larger values
    /// are clamped to [`MAX_LIMIT`], and a negative `offset` becomes 0.
    pub fn get_timeline(
        &self,
        req: TimelineReadRequest,
    ) -> Result<Vec<ContentReference>, ServiceError> {
        let req = normalize(req)?;
        self.store.get_timeline(&req)
    }

    /// Serve `GET /timelines/{user_id}`: parse the raw query, read the page,
    /// and attach a continuation token when more entries follow.
    pub fn read(&self, user_id: &str, query: &TimelineQuery) -> Result<TimelinePage, ServiceError> {
        let offset = match query.page_token.as_deref().filter(|t| !t.is_empty()) {
            Some(token) => decode_page_token(token)?,
            None => query.offset.unwrap_or(0),
        };
        let types = match query.types.as_deref() {
            Some(raw) => parse_types(raw)?,
            None => Vec::new(),
        };

        let req = normalize(TimelineReadRequest {
            user_id: user_id.to_string(),
            limit: query.limit.unwrap_or(0),
            offset,
            types,
        })?;
        let (items, has_more) = self.store.read_page(&req)?;

        let next_page_token = has_more.then(|| encode_page_token(req.offset.saturating_add(req.limit)));
        debug!(
            user_id,
            offset = req.offset,
            limit = req.limit,
            returned = items.len(),
            has_more,
            "timeline read"
        );

        Ok(TimelinePage {
            items,
            next_page_token,
        })
    }
}

fn normalize(mut req: TimelineReadRequest) -> Result<TimelineReadRequest, ServiceError> {
    if req.user_id.is_empty() {
        return Err(ServiceError::Validation("user_id is required".into()));
    }
    req.limit = normalize_limit(req.limit);
    req.offset = req.offset.max(0);
    Ok(req)
}

fn normalize_limit(limit: i64) -> i64 {
    if limit <= 0 {
        DEFAULT_LIMIT
    } else {
        limit.min(MAX_LIMIT)
    }
}

/// Parse a comma-separated list of content types, e.g. `video,article`.
pub fn parse_types(raw: &str) -> Result<Vec<ContentType>, ServiceError> {
    let mut types = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let t = ContentType::from_str(part).ok_or_else(|| {
            let known: Vec<&str> = ContentType::ALL.iter().map(ContentType::as_str).collect();
            ServiceError::Validation(format!(
                "unknown content type: {part} (expected one of {})",
                known.join(", ")
            ))
        })?;
        if !types.contains(&t) {
            types.push(t);
        }
    }
    Ok(types)
}

/// Opaque continuation token for `offset`.
pub fn encode_page_token(offset: i64) -> String {
    URL_SAFE_NO_PAD.encode(format!("o:{offset}"))
}

pub fn decode_page_token(token: &str) -> Result<i64, ServiceError> {
    let invalid = || ServiceError::Validation(format!("invalid page token: {token}"));
    let bytes = URL_SAFE_NO_PAD.decode(token).map_err(|_| invalid())?;
    let text = String::from_utf8(bytes).map_err(|_| invalid())?;
    text.strip_prefix("o:")
        .and_then(|n| n.parse::<i64>().ok())
        .filter(|n| *n >= 0)
        .ok_or_else(invalid)
}
