//! `feedd`: the feed distribution server.
//!
//! Usage:
//!   feedd -c <context-name-or-path> [--listen <addr>]
//!
//! The context name resolves to `/etc/feedd/<name>.toml`.
//! If a path with `/` or `.` is given, it's used directly.

mod bootstrap;
mod config;
mod routes;

use std::sync::Arc;

use clap::Parser;
use feed::FeedModule;
use feedline_core::Module;
use tracing::info;

use config::{LogFormat, ServerConfig};

/// Feed distribution server.
#[derive(Parser, Debug)]
#[command(name = "feedd", about = "Fan-out-on-write feed server")]
struct Cli {
    /// Context name or path to config file.
    #[arg(short = 'c', long = "config", env = "FEEDD_CONFIG", required = true)]
    config: String,

    /// Listen address.
    #[arg(long = "listen", env = "FEEDD_LISTEN", default_value = "0.0.0.0:8080")]
    listen: String,
}

fn init_logging(format: LogFormat) {
    let builder = tracing_subscriber::fmt().with_env_filter(
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
    );
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load server configuration; it also selects the log format.
    let config_path = ServerConfig::resolve_path(&cli.config);
    let server_config = ServerConfig::load(&config_path)?;
    init_logging(server_config.log.format);
    info!("Loaded configuration from {}", config_path.display());

    // Verify configuration is valid.
    bootstrap::verify_config(&server_config)?;

    let core_config = feedline_core::ServiceConfig {
        data_dir: Some(std::path::PathBuf::from(&server_config.storage.data_dir)),
        listen: cli.listen.clone(),
        ..Default::default()
    };

    let zset = bootstrap::open_store(&server_config, &core_config)?;
    let followers = bootstrap::follower_source(&server_config)?;

    let feed = Arc::new(FeedModule::new(zset, followers, server_config.feed_config()));
    info!("Feed module initialized");

    let app = routes::build_router(vec![(feed.name(), feed.routes())]);

    let listener = tokio::net::TcpListener::bind(&core_config.listen).await?;
    info!("feedd listening on {}", core_config.listen);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    feed.shutdown().await;
    info!("feedd stopped");
    Ok(())
}
