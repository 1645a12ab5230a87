//! Wire message types for the transcription relay protocol
//!
//! Both legs of the relay speak the upstream realtime dialect, and the relay
//! forwards transcript events to the editor client verbatim, so these
//! definitions are shared: the client-side parser is the single source of
//! event-interpretation truth.

use serde::{Deserialize, Serialize};

/// Messages sent toward the upstream provider
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Append one encoded audio frame to the input buffer
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },
    /// One-time session configuration, sent by the relay after the upstream
    /// reports session creation
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },
}

/// Session configuration for transcribe-only operation
#[derive(Debug, Serialize)]
pub struct SessionConfig {
    /// Text-only; the model must not produce audio
    pub modalities: Vec<String>,
    /// Directive keeping the model transcribing instead of conversing
    pub instructions: String,
    /// Input audio encoding ("pcm16")
    pub input_audio_format: String,
    pub input_audio_transcription: TranscriptionConfig,
    pub turn_detection: TurnDetection,
}

#[derive(Debug, Serialize)]
pub struct TranscriptionConfig {
    /// Transcription sub-model (e.g. "whisper-1")
    pub model: String,
}

/// Server-side voice activity detection configuration
#[derive(Debug, Serialize)]
pub struct TurnDetection {
    #[serde(rename = "type")]
    pub detection_type: String,
    /// Amplitude threshold for speech detection (0.0-1.0)
    pub threshold: f32,
    /// Audio to include before speech starts (ms)
    pub prefix_padding_ms: u32,
    /// Silence duration that completes an utterance (ms)
    pub silence_duration_ms: u32,
}

/// Events received from the upstream provider
///
/// Unknown types fall into [`ServerEvent::Other`] so provider additions never
/// break parsing.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Upstream session object exists; triggers the relay's one-time
    /// configuration send. Relay-internal, never forwarded to the client.
    #[serde(rename = "session.created")]
    SessionCreated,
    /// Finalized utterance text
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    TranscriptionCompleted { transcript: Option<String> },
    /// Incremental token(s) from the input stream
    #[serde(rename = "conversation.item.input_audio_transcription.delta")]
    TranscriptionDelta { delta: Option<String> },
    /// Incremental token(s) echoed via the response channel
    #[serde(rename = "response.audio_transcript.delta")]
    ResponseTranscriptDelta { delta: Option<String> },
    /// Conversation item that may carry an attached transcript
    #[serde(rename = "conversation.item.created")]
    ItemCreated { item: Option<ConversationItem> },
    #[serde(rename = "error")]
    Error { error: Option<ErrorDetail> },
    /// Catch-all for unrecognized message types
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationItem {
    pub content: Option<Vec<ItemContent>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemContent {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub transcript: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    pub message: Option<String>,
}

/// Text contribution of one transcript event
///
/// All contributions are additive in arrival order; no event type replaces
/// the output of another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptUpdate {
    /// Appended with a trailing separator
    Final(String),
    /// Appended verbatim; the stream controls token spacing
    Delta(String),
}

impl ServerEvent {
    /// Text this event contributes to the note, if any.
    ///
    /// Empty strings are treated as no contribution, matching how the
    /// provider emits keep-alive deltas.
    pub fn transcript_update(&self) -> Option<TranscriptUpdate> {
        match self {
            ServerEvent::TranscriptionCompleted { transcript } => transcript
                .as_ref()
                .filter(|t| !t.is_empty())
                .map(|t| TranscriptUpdate::Final(t.clone())),
            ServerEvent::TranscriptionDelta { delta }
            | ServerEvent::ResponseTranscriptDelta { delta } => delta
                .as_ref()
                .filter(|d| !d.is_empty())
                .map(|d| TranscriptUpdate::Delta(d.clone())),
            ServerEvent::ItemCreated { item } => item
                .as_ref()
                .and_then(|i| i.content.as_ref())
                .and_then(|content| {
                    content
                        .iter()
                        .find(|c| c.kind.as_deref() == Some("input_audio"))
                })
                .and_then(|c| c.transcript.as_ref())
                .filter(|t| !t.is_empty())
                .map(|t| TranscriptUpdate::Final(t.clone())),
            _ => None,
        }
    }

    /// Upstream-provided error message, if this is an error event
    pub fn error_message(&self) -> Option<String> {
        match self {
            ServerEvent::Error { error } => error.as_ref().and_then(|e| e.message.clone()),
            _ => None,
        }
    }

    /// Whether the relay forwards this event to the client
    pub fn is_client_event(&self) -> bool {
        matches!(
            self,
            ServerEvent::TranscriptionCompleted { .. }
                | ServerEvent::TranscriptionDelta { .. }
                | ServerEvent::ResponseTranscriptDelta { .. }
                | ServerEvent::ItemCreated { .. }
                | ServerEvent::Error { .. }
        )
    }
}
