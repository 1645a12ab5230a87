//! Upstream provider leg of the relay
//!
//! Opens the authenticated WebSocket to the realtime endpoint and builds the
//! one-time session configuration. The credential lives only on this side of
//! the bridge; editor clients never see it.

use super::RelayError;
use crate::config::RelayConfig;
use crate::protocol::{ClientMessage, SessionConfig, TranscriptionConfig, TurnDetection};
use base64::Engine;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::info;

/// Directive keeping the model in transcribe-only operation
const TRANSCRIBE_INSTRUCTIONS: &str = "You are a transcription assistant. \
    Transcribe the user's speech accurately. Only transcribe, do not respond.";

/// Generate a random WebSocket key
fn generate_ws_key() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let mut key = [0u8; 16];
    rng.fill(&mut key);
    base64::engine::general_purpose::STANDARD.encode(key)
}

/// Build the upstream WebSocket request with Bearer token authentication
fn build_request(config: &RelayConfig) -> Result<http::Request<()>, RelayError> {
    let url = url::Url::parse(&config.upstream_url)
        .map_err(|e| RelayError::UpstreamConnect(e.to_string()))?;
    let host = url
        .host_str()
        .ok_or_else(|| RelayError::UpstreamConnect("upstream URL has no host".to_string()))?
        .to_string();

    http::Request::builder()
        .uri(config.upstream_url.as_str())
        .header("Host", host)
        .header("Authorization", format!("Bearer {}", config.api_key))
        .header("OpenAI-Beta", "realtime=v1")
        .header("Upgrade", "websocket")
        .header("Connection", "Upgrade")
        .header("Sec-WebSocket-Key", generate_ws_key())
        .header("Sec-WebSocket-Version", "13")
        .body(())
        .map_err(|e| RelayError::UpstreamConnect(e.to_string()))
}

/// Open the authenticated connection to the upstream realtime endpoint
pub(crate) async fn connect(
    config: &RelayConfig,
) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>, RelayError> {
    let request = build_request(config)?;
    let (ws, _response) = connect_async(request)
        .await
        .map_err(|e| RelayError::UpstreamConnect(e.to_string()))?;
    info!("Connected to upstream realtime endpoint");
    Ok(ws)
}

/// The one-time transcribe-only session configuration
///
/// Sent exactly once per upstream connection, in response to the first
/// session-created event.
pub(crate) fn session_update(config: &RelayConfig) -> ClientMessage {
    ClientMessage::SessionUpdate {
        session: SessionConfig {
            modalities: vec!["text".to_string()],
            instructions: TRANSCRIBE_INSTRUCTIONS.to_string(),
            input_audio_format: "pcm16".to_string(),
            input_audio_transcription: TranscriptionConfig {
                model: config.model.clone(),
            },
            turn_detection: TurnDetection {
                detection_type: "server_vad".to_string(),
                threshold: config.turn_detection.threshold,
                prefix_padding_ms: config.turn_detection.prefix_padding_ms,
                silence_duration_ms: config.turn_detection.silence_duration_ms,
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TurnDetectionSettings;

    fn test_config() -> RelayConfig {
        RelayConfig {
            bind_addr: "127.0.0.1:8787".to_string(),
            upstream_url: "wss://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview"
                .to_string(),
            api_key: "sk-test".to_string(),
            model: "whisper-1".to_string(),
            turn_detection: TurnDetectionSettings {
                threshold: 0.5,
                prefix_padding_ms: 300,
                silence_duration_ms: 700,
            },
        }
    }

    #[test]
    fn test_build_request_carries_auth_headers() {
        let request = build_request(&test_config()).unwrap();
        let headers = request.headers();
        assert_eq!(headers["Authorization"], "Bearer sk-test");
        assert_eq!(headers["OpenAI-Beta"], "realtime=v1");
        assert_eq!(headers["Host"], "api.openai.com");
        assert_eq!(headers["Sec-WebSocket-Version"], "13");
    }

    #[test]
    fn test_build_request_rejects_hostless_url() {
        let mut config = test_config();
        config.upstream_url = "not a url".to_string();
        assert!(build_request(&config).is_err());
    }

    #[test]
    fn test_ws_key_is_16_random_bytes_base64() {
        let key = generate_ws_key();
        assert_eq!(key.len(), 24);
        assert_ne!(key, generate_ws_key());
    }

    #[test]
    fn test_session_update_shape() {
        let msg = session_update(&test_config());
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"session.update\""));
        assert!(json.contains("\"modalities\":[\"text\"]"));
        assert!(json.contains("\"input_audio_format\":\"pcm16\""));
        assert!(json.contains("\"model\":\"whisper-1\""));
        assert!(json.contains("\"type\":\"server_vad\""));
        assert!(json.contains("\"prefix_padding_ms\":300"));
        // The credential must never appear in the session configuration
        assert!(!json.contains("sk-test"));
    }
}
