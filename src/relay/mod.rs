//! Server-side relay bridge
//!
//! Accepts editor WebSocket clients and pairs each one with its own upstream
//! realtime connection. The relay has exactly two jobs beyond byte shuffling:
//! it holds the upstream credential, and it configures the upstream session
//! (once, on the first session-created event). Everything else the upstream
//! says that clients care about is forwarded verbatim.

mod upstream;

use crate::config::RelayConfig;
use crate::protocol::ServerEvent;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Errors terminating one client's bridge
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("WebSocket handshake failed: {0}")]
    Handshake(String),

    #[error("Upstream connection failed: {0}")]
    UpstreamConnect(String),
}

/// Accept editor clients forever, bridging each on its own task
pub async fn serve(listener: TcpListener, config: Arc<RelayConfig>) -> std::io::Result<()> {
    info!("Relay listening on {}", listener.local_addr()?);
    loop {
        let (stream, peer) = listener.accept().await?;
        let config = config.clone();
        tokio::spawn(async move {
            info!("Client connected: {}", peer);
            if let Err(e) = handle_client(stream, &config).await {
                warn!("Client {} bridge ended with error: {}", peer, e);
            }
            info!("Client disconnected: {}", peer);
        });
    }
}

/// What to do with one upstream text message
#[derive(Debug, PartialEq, Eq)]
enum UpstreamAction {
    /// First session-created event: send the session configuration
    Configure,
    /// Forward the raw message to the client unchanged
    Forward,
    /// Relay-internal or irrelevant; drop it
    Ignore,
}

/// Classify an upstream message against the once-only configuration guard
fn classify_upstream_message(text: &str, configured: bool) -> UpstreamAction {
    let event: ServerEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            warn!("Unparseable upstream message: {} - {}", e, text);
            return UpstreamAction::Ignore;
        }
    };

    match event {
        ServerEvent::SessionCreated => {
            if configured {
                debug!("Duplicate session.created, already configured");
                UpstreamAction::Ignore
            } else {
                UpstreamAction::Configure
            }
        }
        event if event.is_client_event() => UpstreamAction::Forward,
        _ => UpstreamAction::Ignore,
    }
}

/// Well-formed error event synthesized toward the client when the upstream
/// leg fails
fn error_event(message: &str) -> String {
    serde_json::json!({
        "type": "error",
        "error": { "message": message }
    })
    .to_string()
}

/// Bridge one client connection to one upstream connection until either side
/// closes
async fn handle_client(stream: TcpStream, config: &RelayConfig) -> Result<(), RelayError> {
    let client_ws = accept_async(stream)
        .await
        .map_err(|e| RelayError::Handshake(e.to_string()))?;
    let (mut client_sink, mut client_stream) = client_ws.split();

    let upstream_ws = match upstream::connect(config).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("Failed to open upstream leg: {}", e);
            let _ = client_sink
                .send(Message::Text(error_event("Upstream connection error")))
                .await;
            let _ = client_sink.close().await;
            return Err(e);
        }
    };
    let (mut upstream_sink, mut upstream_stream) = upstream_ws.split();

    // Set on the first session-created event; the configuration is never
    // re-sent, even if the upstream repeats the event
    let mut configured = false;

    loop {
        tokio::select! {
            client_msg = client_stream.next() => match client_msg {
                Some(Ok(Message::Text(text))) => {
                    if upstream_sink.send(Message::Text(text)).await.is_err() {
                        error!("Failed to forward client message upstream");
                        let _ = client_sink
                            .send(Message::Text(error_event("Upstream connection error")))
                            .await;
                        break;
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    if upstream_sink.send(Message::Binary(data)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    let _ = client_sink.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => {
                    info!("Client closed the connection");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Client receive error: {}", e);
                    break;
                }
            },
            upstream_msg = upstream_stream.next() => match upstream_msg {
                Some(Ok(Message::Text(text))) => {
                    match classify_upstream_message(&text, configured) {
                        UpstreamAction::Configure => {
                            configured = true;
                            info!("Upstream session created, sending configuration");
                            if let Ok(json) =
                                serde_json::to_string(&upstream::session_update(config))
                            {
                                if upstream_sink.send(Message::Text(json)).await.is_err() {
                                    error!("Failed to send session configuration");
                                    let _ = client_sink
                                        .send(Message::Text(error_event(
                                            "Upstream connection error",
                                        )))
                                        .await;
                                    break;
                                }
                            }
                        }
                        UpstreamAction::Forward => {
                            if client_sink.send(Message::Text(text)).await.is_err() {
                                warn!("Failed to forward upstream event to client");
                                break;
                            }
                        }
                        UpstreamAction::Ignore => {}
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    let _ = upstream_sink.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => {
                    info!("Upstream closed the connection");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("Upstream receive error: {}", e);
                    let _ = client_sink
                        .send(Message::Text(error_event("Upstream connection error")))
                        .await;
                    break;
                }
            },
        }
    }

    // Either side ending the bridge tears down both legs
    let _ = client_sink.close().await;
    let _ = upstream_sink.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_created_triggers_configuration_once() {
        let msg = r#"{"type": "session.created", "session": {"id": "sess_1"}}"#;
        assert_eq!(
            classify_upstream_message(msg, false),
            UpstreamAction::Configure
        );
        // A repeated session.created must not reconfigure
        assert_eq!(
            classify_upstream_message(msg, true),
            UpstreamAction::Ignore
        );
    }

    #[test]
    fn test_transcript_events_forward_verbatim() {
        let messages = [
            r#"{"type": "conversation.item.input_audio_transcription.completed", "transcript": "hi"}"#,
            r#"{"type": "conversation.item.input_audio_transcription.delta", "delta": "h"}"#,
            r#"{"type": "response.audio_transcript.delta", "delta": "i"}"#,
            r#"{"type": "conversation.item.created", "item": {"content": []}}"#,
            r#"{"type": "error", "error": {"message": "boom"}}"#,
        ];
        for msg in messages {
            assert_eq!(
                classify_upstream_message(msg, true),
                UpstreamAction::Forward,
                "expected forward for {}",
                msg
            );
        }
    }

    #[test]
    fn test_internal_events_are_dropped() {
        let messages = [
            r#"{"type": "session.updated", "session": {}}"#,
            r#"{"type": "input_audio_buffer.speech_started"}"#,
            r#"{"type": "input_audio_buffer.committed"}"#,
            r#"{"type": "response.done"}"#,
        ];
        for msg in messages {
            assert_eq!(
                classify_upstream_message(msg, true),
                UpstreamAction::Ignore,
                "expected ignore for {}",
                msg
            );
        }
    }

    #[test]
    fn test_malformed_upstream_message_is_ignored() {
        assert_eq!(
            classify_upstream_message("not json", false),
            UpstreamAction::Ignore
        );
    }

    #[test]
    fn test_error_event_is_well_formed() {
        let json = error_event("Upstream connection error");
        let event: ServerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(
            event.error_message(),
            Some("Upstream connection error".to_string())
        );
        assert!(event.is_client_event());
    }
}
