use futures::StreamExt;
use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use super::{FollowerError, FollowerSource, FollowerStream};

/// One page of `GET /users/{id}/followers`.
#[derive(Debug, Deserialize)]
struct FollowersPage {
    #[serde(default)]
    follower_ids: Vec<String>,
    #[serde(default)]
    next_cursor: Option<String>,
}

/// Follower source backed by the social-graph HTTP service.
///
/// Each upstream page becomes one batch:
///
/// ```text
/// GET {base_url}/users/{author_id}/followers?limit={batch_size}&cursor={cursor}
/// → {"follower_ids": ["u1", ...], "next_cursor": "opaque" | null}
/// ```
///
/// The sequence ends when `next_cursor` is absent or empty.
pub struct HttpFollowerSource {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpFollowerSource {
    pub fn new(base_url: &str) -> Result<Self, FollowerError> {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: &str) -> Result<Self, FollowerError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| FollowerError::Protocol(format!("graph base url {base_url:?}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(FollowerError::Protocol(format!(
                "graph base url {base_url} cannot carry a path"
            )));
        }
        Ok(Self { http, base_url })
    }

    /// `{base_url}/users/{author_id}/followers` with `author_id` kept as a
    /// single percent-encoded segment.
    fn followers_url(&self, author_id: &str) -> Result<Url, FollowerError> {
        if matches!(author_id, "" | "." | "..") {
            return Err(FollowerError::Protocol(format!(
                "author id {author_id:?} is not a valid path segment"
            )));
        }
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FollowerError::Protocol(format!("graph base url {} has no path", self.base_url)))?
            .pop_if_empty()
            .extend(["users", author_id, "followers"]);
        Ok(url)
    }
}

struct Cursor {
    http: reqwest::Client,
    url: Url,
    limit: usize,
    next: Option<String>,
    done: bool,
}

async fn fetch_page(cursor: &Cursor) -> Result<FollowersPage, FollowerError> {
    let mut req = cursor
        .http
        .get(cursor.url.clone())
        .query(&[("limit", cursor.limit.to_string())]);
    if let Some(ref c) = cursor.next {
        req = req.query(&[("cursor", c.as_str())]);
    }

    let resp = req
        .send()
        .await
        .map_err(|e| FollowerError::Unavailable(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let msg = format!("HTTP {}: {}", status.as_u16(), body);
        return Err(if status.is_server_error() {
            FollowerError::Unavailable(msg)
        } else {
            FollowerError::Protocol(msg)
        });
    }

    resp.json()
        .await
        .map_err(|e| FollowerError::Protocol(format!("followers page: {e}")))
}

#[async_trait::async_trait]
impl FollowerSource for HttpFollowerSource {
    async fn stream_followers(
        &self,
        author_id: &str,
        batch_size: usize,
    ) -> Result<FollowerStream, FollowerError> {
        let start = Cursor {
            http: self.http.clone(),
            url: self.followers_url(author_id)?,
            limit: batch_size.max(1),
            next: None,
            done: false,
        };

        let stream = futures::stream::try_unfold(start, |mut cursor| async move {
            if cursor.done {
                return Ok(None);
            }
            let page = fetch_page(&cursor).await?;
            debug!(url = %cursor.url, count = page.follower_ids.len(), "fetched followers page");

            cursor.next = page.next_cursor.filter(|c| !c.is_empty());
            cursor.done = cursor.next.is_none();
            Ok(Some((page.follower_ids, cursor)))
        });

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use axum::extract::{Path, Query};
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::{Json, Router};
    use futures::TryStreamExt;

    const FOLLOWERS: [&str; 5] = ["u1", "u2", "u3", "u4", "u5"];

    /// Serves FOLLOWERS for author "A" with numeric cursors. Author "flaky"
    /// fails once the cursor reaches 2.
    async fn followers(
        Path(author): Path<String>,
        Query(q): Query<HashMap<String, String>>,
    ) -> Response {
        let limit: usize = q.get("limit").and_then(|v| v.parse().ok()).unwrap_or(10);
        let from: usize = q.get("cursor").and_then(|v| v.parse().ok()).unwrap_or(0);

        match author.as_str() {
            "A" | "flaky" => {}
            "garbled" => return "not json".into_response(),
            _ => return StatusCode::NOT_FOUND.into_response(),
        }
        if author == "flaky" && from >= 2 {
            return (StatusCode::SERVICE_UNAVAILABLE, "graph down").into_response();
        }

        let to = (from + limit).min(FOLLOWERS.len());
        let next = (to < FOLLOWERS.len()).then(|| to.to_string());
        Json(serde_json::json!({
            "follower_ids": &FOLLOWERS[from..to],
            "next_cursor": next,
        }))
        .into_response()
    }

    async fn serve() -> String {
        let app = Router::new().route("/users/{id}/followers", get(followers));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn follows_cursor_until_exhausted() {
        let source = HttpFollowerSource::new(&serve().await).unwrap();
        let batches: Vec<Vec<String>> = source
            .stream_followers("A", 2)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(batches.len(), 3);
        assert_eq!(batches.concat(), FOLLOWERS.to_vec());
    }

    #[tokio::test]
    async fn author_id_stays_one_path_segment() {
        let source = HttpFollowerSource::new(&serve().await).unwrap();

        for author in ["x/../A", "../A", "A?cursor=0", "A#frag", "A/"] {
            let batches: Result<Vec<Vec<String>>, _> =
                source.stream_followers(author, 10).await.unwrap().try_collect().await;
            assert!(
                matches!(batches, Err(FollowerError::Protocol(_))),
                "{author:?} resolved to {batches:?}"
            );
        }
        for author in ["..", "."] {
            assert!(matches!(
                source.stream_followers(author, 10).await,
                Err(FollowerError::Protocol(_))
            ));
        }
    }

    #[test]
    fn followers_url_encodes_the_author() {
        let source = HttpFollowerSource::new("http://graph:8080/api/").unwrap();
        assert_eq!(
            source.followers_url("x/../A").unwrap().as_str(),
            "http://graph:8080/api/users/x%2F..%2FA/followers"
        );
        assert_eq!(
            source.followers_url("A").unwrap().as_str(),
            "http://graph:8080/api/users/A/followers"
        );
        assert!(HttpFollowerSource::new("not a url").is_err());
        assert!(HttpFollowerSource::new("mailto:graph@example.com").is_err());
    }

    #[tokio::test]
    async fn upstream_failure_terminates_stream_after_partial_batches() {
        let source = HttpFollowerSource::new(&serve().await).unwrap();
        let mut stream = source.stream_followers("flaky", 2).await.unwrap();

        assert_eq!(stream.next().await, Some(Ok(vec!["u1".into(), "u2".into()])));
        assert!(matches!(
            stream.next().await,
            Some(Err(FollowerError::Unavailable(_)))
        ));
    }

    #[tokio::test]
    async fn client_errors_and_bad_bodies_are_protocol_errors() {
        let base = serve().await;
        let source = HttpFollowerSource::new(&base).unwrap();

        let mut missing = source.stream_followers("nobody", 2).await.unwrap();
        assert!(matches!(
            missing.next().await,
            Some(Err(FollowerError::Protocol(_)))
        ));

        let mut garbled = source.stream_followers("garbled", 2).await.unwrap();
        assert!(matches!(
            garbled.next().await,
            Some(Err(FollowerError::Protocol(_)))
        ));
    }

    #[tokio::test]
    async fn unreachable_service_is_unavailable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let source = HttpFollowerSource::new(&format!("http://{addr}")).unwrap();
        let mut stream = source.stream_followers("A", 2).await.unwrap();
        assert!(matches!(
            stream.next().await,
            Some(Err(FollowerError::Unavailable(_)))
        ));
    }
}
