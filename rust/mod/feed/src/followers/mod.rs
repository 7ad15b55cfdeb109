//! Follower enumeration.
//!
//! A [`FollowerSource`] yields the followers of an author as a finite,
//! pull-based sequence of batches. The consumer decides how fast to pull;
//! the sequence cannot be restarted. End of sequence is the stream
//! returning `None`; failure is an `Err` item, after which the consumer
//! stops pulling.

mod http;
mod memory;

pub use http::HttpFollowerSource;
pub use memory::StaticFollowers;

use futures::stream::BoxStream;

/// Follower enumeration failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FollowerError {
    /// The graph service could not be reached or failed the request.
    #[error("follower source unavailable: {0}")]
    Unavailable(String),

    /// The graph service answered with something we cannot use.
    #[error("follower source protocol error: {0}")]
    Protocol(String),
}

/// Batches of follower ids, in an order chosen by the source.
pub type FollowerStream = BoxStream<'static, Result<Vec<String>, FollowerError>>;

/// Yields the followers of an author.
#[async_trait::async_trait]
pub trait FollowerSource: Send + Sync {
    /// Open the follower sequence of `author_id`. `batch_size` is a hint
    /// for how many ids to fetch per upstream call.
    async fn stream_followers(
        &self,
        author_id: &str,
        batch_size: usize,
    ) -> Result<FollowerStream, FollowerError>;
}
