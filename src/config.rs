//! Relay server configuration
//!
//! Tunables live in the embedded `config.toml`; the upstream credential is
//! read from the environment exactly once, at process start. Connection
//! handlers only ever see the resulting [`RelayConfig`] value and never touch
//! ambient state themselves.

use serde::Deserialize;
use thiserror::Error;

const CONFIG_TOML: &str = include_str!("../config.toml");

/// Environment variable holding the upstream API credential
const API_KEY_VAR: &str = "OPENAI_API_KEY";

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid config.toml: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("OPENAI_API_KEY is not set")]
    MissingApiKey,

    #[error("Invalid upstream URL: {0}")]
    InvalidUpstreamUrl(String),
}

#[derive(Debug, Clone, Deserialize)]
struct RelaySettings {
    bind_addr: String,
    upstream_url: String,
}

#[derive(Debug, Clone, Deserialize)]
struct TranscriptionSettings {
    model: String,
}

/// Voice-activity-detection tuning forwarded to the upstream session
#[derive(Debug, Clone, Deserialize)]
pub struct TurnDetectionSettings {
    /// Amplitude threshold for speech detection (0.0-1.0)
    pub threshold: f32,
    /// Audio to include before detected speech (ms)
    pub prefix_padding_ms: u32,
    /// Trailing silence that completes an utterance (ms)
    pub silence_duration_ms: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
    relay: RelaySettings,
    transcription: TranscriptionSettings,
    turn_detection: TurnDetectionSettings,
}

/// Fully-resolved relay configuration, built once and passed into the bridge
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address the relay listens on for editor clients
    pub bind_addr: String,
    /// Upstream realtime endpoint, including the model query parameter
    pub upstream_url: String,
    /// Server-held credential for the upstream leg; never sent to clients
    pub api_key: String,
    /// Transcription sub-model selected in the session configuration
    pub model: String,
    pub turn_detection: TurnDetectionSettings,
}

impl RelayConfig {
    /// Load the embedded config and resolve the upstream credential.
    pub fn from_env() -> Result<Self, ConfigError> {
        // A .env file is optional; a missing one is not an error
        dotenvy::dotenv().ok();

        let file = parse_config(CONFIG_TOML)?;
        let api_key = std::env::var(API_KEY_VAR).map_err(|_| ConfigError::MissingApiKey)?;

        url::Url::parse(&file.relay.upstream_url)
            .map_err(|e| ConfigError::InvalidUpstreamUrl(e.to_string()))?;

        Ok(Self {
            bind_addr: file.relay.bind_addr,
            upstream_url: file.relay.upstream_url,
            api_key,
            model: file.transcription.model,
            turn_detection: file.turn_detection,
        })
    }
}

fn parse_config(contents: &str) -> Result<ConfigFile, ConfigError> {
    Ok(toml::from_str(contents)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_config_parses() {
        let file = parse_config(CONFIG_TOML).unwrap();
        assert!(file.relay.upstream_url.starts_with("wss://"));
        assert!(!file.transcription.model.is_empty());
        assert!(file.turn_detection.threshold > 0.0);
    }

    #[test]
    fn test_parse_config() {
        let file = parse_config(
            r#"
            [relay]
            bind_addr = "0.0.0.0:9000"
            upstream_url = "wss://example.com/v1/realtime?model=test"

            [transcription]
            model = "whisper-1"

            [turn_detection]
            threshold = 0.5
            prefix_padding_ms = 300
            silence_duration_ms = 700
            "#,
        )
        .unwrap();
        assert_eq!(file.relay.bind_addr, "0.0.0.0:9000");
        assert_eq!(file.transcription.model, "whisper-1");
        assert_eq!(file.turn_detection.silence_duration_ms, 700);
    }

    #[test]
    fn test_rejects_incomplete_config() {
        assert!(parse_config("[relay]\nbind_addr = \"x\"").is_err());
    }
}
