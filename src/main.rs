#![deny(clippy::all)]

//! Transcription relay server
//!
//! Listens for editor WebSocket clients and bridges each one to its own
//! authenticated upstream realtime connection.

use anyhow::Context;
use scribenote::config::RelayConfig;
use scribenote::relay;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing for structured logging
    tracing_subscriber::fmt::init();

    let config = RelayConfig::from_env().context("Failed to load relay configuration")?;
    info!(
        "Starting transcription relay (transcription model: {})",
        config.model
    );

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    relay::serve(listener, Arc::new(config))
        .await
        .context("Relay server failed")?;

    Ok(())
}
