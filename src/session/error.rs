//! Error types for the client transcription session

use crate::audio::AudioCaptureError;
use thiserror::Error;

/// Errors that can occur during a transcription session
#[derive(Debug, Error)]
pub enum TranscriptionError {
    /// Microphone permission denied or device unavailable; fatal to starting
    /// a session
    #[error("Microphone access failed: {0}")]
    MicrophoneAccess(#[from] AudioCaptureError),

    /// Relay transport failure; the session is torn down and not retried
    #[error("Connection error: {0}")]
    Connection(String),

    /// Upstream-reported transcription error; recoverable, the caller
    /// decides whether to stop
    #[error("Transcription error: {0}")]
    Upstream(String),
}
