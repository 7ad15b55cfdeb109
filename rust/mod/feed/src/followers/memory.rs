use std::collections::HashMap;

use futures::StreamExt;

use super::{FollowerError, FollowerSource, FollowerStream};

/// In-memory follower graph: author id → follower ids.
///
/// Used for local setups (loaded from the `[graph.static]` config table)
/// and in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticFollowers {
    graph: HashMap<String, Vec<String>>,
}

impl StaticFollowers {
    pub fn new(graph: HashMap<String, Vec<String>>) -> Self {
        Self { graph }
    }

    /// Replace the followers of `author_id`.
    pub fn set(&mut self, author_id: impl Into<String>, followers: Vec<String>) {
        self.graph.insert(author_id.into(), followers);
    }

    pub fn followers(&self, author_id: &str) -> &[String] {
        self.graph.get(author_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[async_trait::async_trait]
impl FollowerSource for StaticFollowers {
    async fn stream_followers(
        &self,
        author_id: &str,
        batch_size: usize,
    ) -> Result<FollowerStream, FollowerError> {
        let batches: Vec<Result<Vec<String>, FollowerError>> = self
            .followers(author_id)
            .chunks(batch_size.max(1))
            .map(|chunk| Ok(chunk.to_vec()))
            .collect();
        Ok(futures::stream::iter(batches).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn yields_batches_of_requested_size() {
        let mut graph = StaticFollowers::default();
        graph.set("A", (0..5).map(|i| format!("u{i}")).collect());

        let batches: Vec<Vec<String>> = graph
            .stream_followers("A", 2)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0], vec!["u0", "u1"]);
        assert_eq!(batches[2], vec!["u4"]);
    }

    #[tokio::test]
    async fn unknown_author_has_no_followers() {
        let graph = StaticFollowers::default();
        let mut stream = graph.stream_followers("nobody", 10).await.unwrap();
        assert!(stream.next().await.is_none());
    }
}
