//! vfscache proxy - serves remote HTTP resources as cacheable virtual files
//!
//! Every target URL is mapped to a stable identifier, its size and
//! modification time are probed once and cached, and the bytes are streamed
//! with HEAD, range and conditional request support.

mod config;
mod content;
mod error;
mod range;
mod server;
mod types;
mod vfs;

use crate::config::ProxyConfig;
use crate::error::Result;
use crate::server::{start_server, ServerState, SharedState};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("vfscache_proxy=info".parse()?)
        .add_directive("link_backend=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting vfscache proxy...");

    let config = ProxyConfig::from_env();
    config.validate()?;
    info!("Port: {}", config.port);
    info!(
        "Strip query: {}, strip domain: {}",
        config.strip_query, config.strip_domain
    );
    info!(
        "Metadata cache size: {} KB",
        config.metadata_cache_size / 1024
    );
    info!("Shard level: {}", config.shard_level);
    if let Some(upstream) = &config.upstream_url {
        info!("Upstream: {}", upstream);
    }
    info!(
        cache_dir = ?config.engine.cache_dir,
        cache_mode = %config.engine.cache_mode,
        chunk_size = %config.engine.chunk_size,
        chunk_streams = config.engine.chunk_streams,
        max_age = %config.engine.max_age,
        max_size = %config.engine.max_size,
        "Engine options"
    );

    let state: SharedState = Arc::new(ServerState::from_config(&config)?);

    // Start HTTP server (blocking until shutdown)
    start_server(state, config.port).await?;

    info!("Exit");
    Ok(())
}
