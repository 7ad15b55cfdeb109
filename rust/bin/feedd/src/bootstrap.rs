//! Startup checks and backend construction.

use std::sync::Arc;

use feed::followers::{FollowerSource, HttpFollowerSource, StaticFollowers};
use feedline_core::ServiceConfig;
use feedline_zset::{MemoryZSet, RedbZSet, ZSetStore};
use tracing::{info, warn};

use crate::config::{ServerConfig, StorageBackend};

/// Refuse to start on settings the feed cannot run with.
pub fn verify_config(config: &ServerConfig) -> anyhow::Result<()> {
    if config.storage.backend == StorageBackend::Redb && config.storage.data_dir.is_empty() {
        anyhow::bail!("Storage data_dir is empty in configuration.");
    }
    if config.fanout.chunk_size == 0 {
        anyhow::bail!("fanout.chunk_size must be greater than zero.");
    }
    if config.fanout.follower_batch_size == 0 {
        anyhow::bail!("fanout.follower_batch_size must be greater than zero.");
    }
    if config.fanout.deadline_secs == 0 {
        anyhow::bail!("fanout.deadline_secs must be greater than zero.");
    }
    if config.fanout.sweep_interval_secs == 0 {
        anyhow::bail!("fanout.sweep_interval_secs must be greater than zero.");
    }
    if config.timeline.ttl_secs == 0 {
        anyhow::bail!("timeline.ttl_secs must be greater than zero.");
    }
    if let Some(url) = &config.graph.base_url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            anyhow::bail!("graph.base_url must be an http(s) URL, got {url:?}.");
        }
    }
    Ok(())
}

/// Open the timeline backend selected by `[storage] backend`.
pub fn open_store(
    config: &ServerConfig,
    core: &ServiceConfig,
) -> anyhow::Result<Arc<dyn ZSetStore>> {
    match config.storage.backend {
        StorageBackend::Redb => {
            if let Some(dir) = &core.data_dir {
                std::fs::create_dir_all(dir)?;
            }
            let path = core.resolve_db_path();
            let store = RedbZSet::open(&path)
                .map_err(|e| anyhow::anyhow!("failed to open timeline store: {}", e))?;
            info!("Timeline store opened at {}", path.display());
            Ok(Arc::new(store))
        }
        StorageBackend::Memory => {
            warn!("Using in-memory timeline store; timelines are lost on restart");
            Ok(Arc::new(MemoryZSet::new()))
        }
    }
}

/// Build the follower source: the graph service when `base_url` is set,
/// the static table otherwise.
pub fn follower_source(config: &ServerConfig) -> anyhow::Result<Arc<dyn FollowerSource>> {
    match &config.graph.base_url {
        Some(url) => {
            info!("Followers from graph service at {url}");
            Ok(Arc::new(HttpFollowerSource::new(url)?))
        }
        None => {
            info!(
                "Followers from static table ({} authors)",
                config.graph.static_followers.len()
            );
            Ok(Arc::new(StaticFollowers::new(
                config.graph.static_followers.clone(),
            )))
        }
    }
}
