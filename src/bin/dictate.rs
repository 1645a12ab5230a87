#![deny(clippy::all)]

//! Live dictation client
//!
//! Connects to a running relay, streams the default microphone, and prints
//! the accumulated note content as transcript events arrive. Ctrl-C stops
//! the session and prints the final note.

use anyhow::Context;
use scribenote::session::{
    ErrorCallback, RealtimeSession, TranscriptCallback, TranscriptionError,
};
use std::sync::Arc;
use tracing::{error, info};

const DEFAULT_RELAY_URL: &str = "ws://127.0.0.1:8787";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let relay_url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_RELAY_URL.to_string());

    let on_transcript: TranscriptCallback = Arc::new(|content: &str| {
        println!("---");
        println!("{}", content);
    });
    let on_error: ErrorCallback = Arc::new(|err: &TranscriptionError| {
        error!("{}", err);
    });

    let mut session = RealtimeSession::new(relay_url.as_str(), on_transcript, on_error);
    session
        .connect()
        .await
        .context("Failed to connect to relay")?;

    info!("Dictating to {}. Press Ctrl-C to stop.", relay_url);
    tokio::signal::ctrl_c()
        .await
        .context("Signal handler failed")?;

    session.disconnect();
    let note = session.note_contents();
    if !note.is_empty() {
        println!("{}", note);
    }
    Ok(())
}
