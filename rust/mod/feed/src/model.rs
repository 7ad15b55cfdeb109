use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ContentType
// ---------------------------------------------------------------------------

/// Kind of content a timeline entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Post,
    Video,
    Article,
    Image,
}

impl ContentType {
    pub const ALL: [ContentType; 4] = [Self::Post, Self::Video, Self::Article, Self::Image];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Video => "video",
            Self::Article => "article",
            Self::Image => "image",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "post" => Some(Self::Post),
            "video" => Some(Self::Video),
            "article" => Some(Self::Article),
            "image" => Some(Self::Image),
            _ => None,
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ContentReference
// ---------------------------------------------------------------------------

/// A pointer to one piece of published content.
///
/// Created upstream by the publishing service and never mutated here; the
/// fan-out only copies it into follower timelines. `author_id` is empty for
/// entries written under the legacy `{type}:{content_id}` member encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentReference {
    pub content_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub author_id: String,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    /// Creation time, second resolution. Doubles as the timeline score.
    pub created_at: DateTime<Utc>,
}

impl ContentReference {
    pub fn new(
        content_id: impl Into<String>,
        author_id: impl Into<String>,
        content_type: ContentType,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            content_id: content_id.into(),
            author_id: author_id.into(),
            content_type,
            created_at: created_at.trunc_subsecs(0),
        }
    }

    /// Timeline score: `created_at` as unix seconds.
    pub fn score(&self) -> i64 {
        self.created_at.timestamp()
    }
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// A normalized read of one user's timeline.
///
/// `offset`/`limit` address positions in the full descending-score ordering,
/// before `types` filtering is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineReadRequest {
    pub user_id: String,
    pub limit: i64,
    pub offset: i64,
    /// Content types to keep. Empty keeps everything.
    pub types: Vec<ContentType>,
}

/// Raw query parameters of `GET /timelines/{user_id}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimelineQuery {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
    /// Comma-separated content types, e.g. `video,article`.
    #[serde(default)]
    pub types: Option<String>,
    /// Opaque continuation token from a previous page. Overrides `offset`.
    #[serde(default)]
    pub page_token: Option<String>,
}

/// One page of a timeline.
#[derive(Debug, Clone, Serialize)]
pub struct TimelinePage {
    pub items: Vec<ContentReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

// ---------------------------------------------------------------------------
// Inbound notification
// ---------------------------------------------------------------------------

/// Payload of the `post.created` notification.
#[derive(Debug, Clone, Deserialize)]
pub struct PostCreatedEvent {
    pub id: String,
    pub author_id: String,
    #[serde(rename = "type")]
    pub content_type: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<PostCreatedEvent> for ContentReference {
    type Error = String;

    fn try_from(event: PostCreatedEvent) -> Result<Self, Self::Error> {
        if event.id.is_empty() {
            return Err("id is empty".to_string());
        }
        if event.author_id.is_empty() {
            return Err("author_id is empty".to_string());
        }
        let content_type = ContentType::from_str(&event.content_type)
            .ok_or_else(|| format!("unknown content type: {}", event.content_type))?;
        Ok(ContentReference::new(
            event.id,
            event.author_id,
            content_type,
            event.created_at,
        ))
    }
}

// ---------------------------------------------------------------------------
// Distribution lifecycle
// ---------------------------------------------------------------------------

/// Stage of one distribution.
///
/// ```text
/// RECEIVED → FOLLOWERS_ENUMERATING → BATCH_DISPATCHING → COMPLETED
///                                                      → ABORTED_ON_STREAM_ERROR
///                                                      → TIMED_OUT
/// ```
///
/// There is no retry or resume: a terminal distribution is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FanoutStage {
    Received,
    FollowersEnumerating,
    BatchDispatching,
    Completed,
    AbortedOnStreamError,
    TimedOut,
}

impl FanoutStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "RECEIVED",
            Self::FollowersEnumerating => "FOLLOWERS_ENUMERATING",
            Self::BatchDispatching => "BATCH_DISPATCHING",
            Self::Completed => "COMPLETED",
            Self::AbortedOnStreamError => "ABORTED_ON_STREAM_ERROR",
            Self::TimedOut => "TIMED_OUT",
        }
    }

    /// Whether the distribution has finished one way or another.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::AbortedOnStreamError | Self::TimedOut
        )
    }
}

impl std::fmt::Display for FanoutStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-distribution outcome counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FanoutReport {
    pub content_id: String,
    pub author_id: String,
    /// Followers pulled from the stream so far.
    pub followers_total: u64,
    /// Followers whose chunk write succeeded.
    pub delivered: u64,
    /// Followers whose chunk write failed.
    pub failed: u64,
    /// Chunk writes issued.
    pub batches: u64,
    pub failed_batches: u64,
    pub stage: FanoutStage,
}

impl FanoutReport {
    pub fn new(item: &ContentReference) -> Self {
        Self {
            content_id: item.content_id.clone(),
            author_id: item.author_id.clone(),
            followers_total: 0,
            delivered: 0,
            failed: 0,
            batches: 0,
            failed_batches: 0,
            stage: FanoutStage::Received,
        }
    }
}
