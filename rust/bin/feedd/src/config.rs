//! Server configuration file.
//!
//! ```toml
//! [storage]
//! data_dir = "/var/lib/feedd"
//! backend = "redb"            # or "memory"
//!
//! [timeline]
//! ttl_secs = 2592000
//! max_len = 500
//!
//! [fanout]
//! chunk_size = 1000
//! follower_batch_size = 1000
//! deadline_secs = 30
//! sweep_interval_secs = 300
//!
//! [graph]
//! base_url = "http://graph:8080"
//!
//! [graph.static]              # used when base_url is unset
//! alice = ["bob", "carol"]
//!
//! [log]
//! format = "text"             # or "json"
//! ```
//!
//! Every section and field is optional.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use feed::fanout::FanoutConfig;
use feed::store::TimelineConfig;
use feed::worker::WorkerConfig;
use feed::FeedConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub storage: StorageConfig,
    pub timeline: TimelineSection,
    pub fanout: FanoutSection,
    pub graph: GraphConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Redb,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
    pub backend: StorageBackend,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "/var/lib/feedd".to_string(),
            backend: StorageBackend::Redb,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimelineSection {
    pub ttl_secs: u64,
    /// 0 keeps timelines unbounded.
    pub max_len: usize,
}

impl Default for TimelineSection {
    fn default() -> Self {
        let defaults = TimelineConfig::default();
        Self {
            ttl_secs: defaults.ttl.as_secs(),
            max_len: defaults.max_len,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FanoutSection {
    pub chunk_size: usize,
    pub follower_batch_size: usize,
    pub deadline_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for FanoutSection {
    fn default() -> Self {
        let fanout = FanoutConfig::default();
        let worker = WorkerConfig::default();
        Self {
            chunk_size: fanout.chunk_size,
            follower_batch_size: fanout.follower_batch_size,
            deadline_secs: worker.deadline.as_secs(),
            sweep_interval_secs: worker.sweep_interval.as_secs(),
        }
    }
}

/// Where followers come from.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Base URL of the social-graph service.
    pub base_url: Option<String>,
    /// Fixed author → followers table, for local setups.
    #[serde(rename = "static")]
    pub static_followers: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
}

impl ServerConfig {
    /// Resolve a context name or path to a config file.
    ///
    /// A bare name resolves to `/etc/feedd/<name>.toml`; anything containing
    /// `/` or `.` is used as-is.
    pub fn resolve_path(name: &str) -> PathBuf {
        if name.contains('/') || name.contains('.') {
            PathBuf::from(name)
        } else {
            PathBuf::from(format!("/etc/feedd/{name}.toml"))
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
        let config: ServerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            timeline: TimelineConfig {
                ttl: Duration::from_secs(self.timeline.ttl_secs),
                max_len: self.timeline.max_len,
            },
            fanout: FanoutConfig {
                chunk_size: self.fanout.chunk_size,
                follower_batch_size: self.fanout.follower_batch_size,
            },
            worker: WorkerConfig {
                deadline: Duration::from_secs(self.fanout.deadline_secs),
                sweep_interval: Duration::from_secs(self.fanout.sweep_interval_secs),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config.storage.data_dir, "/var/lib/feedd");
        assert_eq!(config.storage.backend, StorageBackend::Redb);
        assert_eq!(config.timeline.ttl_secs, 30 * 24 * 3600);
        assert_eq!(config.timeline.max_len, 500);
        assert_eq!(config.fanout.chunk_size, 1000);
        assert_eq!(config.fanout.deadline_secs, 30);
        assert_eq!(config.log.format, LogFormat::Text);
        assert!(config.graph.base_url.is_none());
    }

    #[test]
    fn full_file() {
        let config: ServerConfig = toml::from_str(
            r#"
            [storage]
            data_dir = "/tmp/feed"
            backend = "memory"

            [timeline]
            ttl_secs = 60
            max_len = 0

            [fanout]
            chunk_size = 200
            deadline_secs = 5

            [graph.static]
            alice = ["bob", "carol"]

            [log]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.graph.static_followers["alice"], vec!["bob", "carol"]);
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.fanout.follower_batch_size, 1000);

        let feed = config.feed_config();
        assert_eq!(feed.timeline.ttl, Duration::from_secs(60));
        assert_eq!(feed.timeline.max_len, 0);
        assert_eq!(feed.fanout.chunk_size, 200);
        assert_eq!(feed.worker.deadline, Duration::from_secs(5));
        assert_eq!(feed.worker.sweep_interval, Duration::from_secs(300));
    }

    #[test]
    fn unknown_backend_is_rejected() {
        assert!(toml::from_str::<ServerConfig>("[storage]\nbackend = \"redis\"").is_err());
    }

    #[test]
    fn resolve_path_by_name_or_path() {
        assert_eq!(ServerConfig::resolve_path("prod"), PathBuf::from("/etc/feedd/prod.toml"));
        assert_eq!(ServerConfig::resolve_path("./feedd.toml"), PathBuf::from("./feedd.toml"));
    }

    #[test]
    fn load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedd.toml");
        std::fs::write(&path, "[graph]\nbase_url = \"http://graph:8080\"\n").unwrap();

        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.graph.base_url.as_deref(), Some("http://graph:8080"));
        assert!(ServerConfig::load(&dir.path().join("missing.toml")).is_err());
    }
}
