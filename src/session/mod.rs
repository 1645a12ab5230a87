//! Client transcription session
//!
//! Owns one WebSocket connection to the relay and one microphone capture,
//! translating inbound transcript events into appends on the accumulated
//! note content. There is no reconnect and no outbound buffering: frames
//! produced while the connection is not open are dropped, and a closed
//! session stays closed - the caller creates a new one to record again.

mod error;
mod note;

pub use error::TranscriptionError;
pub use note::NoteBuffer;

use crate::audio::{self, encode::encode_frame, AudioCaptureHandle};
use crate::protocol::{ClientMessage, ServerEvent};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, trace, warn};

/// Lifecycle of the session's relay connection
///
/// Closed is terminal; reconnecting means creating a new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Idle,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Open,
            _ => ConnectionState::Closed,
        }
    }
}

fn load_state(state: &AtomicU8) -> ConnectionState {
    ConnectionState::from_u8(state.load(Ordering::SeqCst))
}

fn store_state(state: &AtomicU8, value: ConnectionState) {
    state.store(value as u8, Ordering::SeqCst);
}

/// Invoked with the full accumulated note content after each applied event
pub type TranscriptCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Invoked on capture, connection, and upstream errors
pub type ErrorCallback = Arc<dyn Fn(&TranscriptionError) + Send + Sync>;

/// One logical transcription session: microphone in, note text out
pub struct RealtimeSession {
    relay_url: String,
    state: Arc<AtomicU8>,
    note: Arc<Mutex<NoteBuffer>>,
    on_transcript: TranscriptCallback,
    on_error: ErrorCallback,
    capture: Arc<Mutex<Option<AudioCaptureHandle>>>,
    shutdown_tx: Arc<Mutex<Option<mpsc::Sender<()>>>>,
}

impl RealtimeSession {
    pub fn new(
        relay_url: impl Into<String>,
        on_transcript: TranscriptCallback,
        on_error: ErrorCallback,
    ) -> Self {
        Self {
            relay_url: relay_url.into(),
            state: Arc::new(AtomicU8::new(ConnectionState::Idle as u8)),
            note: Arc::new(Mutex::new(NoteBuffer::new())),
            on_transcript,
            on_error,
            capture: Arc::new(Mutex::new(None)),
            shutdown_tx: Arc::new(Mutex::new(None)),
        }
    }

    /// Open the relay connection and start streaming microphone audio.
    ///
    /// Resolves once the connection is established; capture starts right
    /// after, and a capture failure is surfaced through the error callback
    /// (with the session torn down) rather than by failing this call.
    pub async fn connect(&mut self) -> Result<(), TranscriptionError> {
        if load_state(&self.state) != ConnectionState::Idle {
            return Err(TranscriptionError::Connection(
                "session already started; create a new session to reconnect".to_string(),
            ));
        }
        store_state(&self.state, ConnectionState::Connecting);

        info!("Connecting to transcription relay: {}", self.relay_url);
        let (ws, _response) = match connect_async(self.relay_url.as_str()).await {
            Ok(ok) => ok,
            Err(e) => {
                store_state(&self.state, ConnectionState::Closed);
                return Err(TranscriptionError::Connection(e.to_string()));
            }
        };
        store_state(&self.state, ConnectionState::Open);
        info!("Connected to transcription relay");

        let (mut ws_sink, ws_stream) = ws.split();

        let frame_rx = match audio::start_capture() {
            Ok((capture, frame_rx)) => {
                set_slot(&self.capture, capture);
                frame_rx
            }
            Err(e) => {
                error!("Failed to start audio capture: {}", e);
                let err = TranscriptionError::MicrophoneAccess(e);
                (self.on_error)(&err);
                store_state(&self.state, ConnectionState::Closed);
                let _ = ws_sink.close().await;
                return Ok(());
            }
        };

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        set_slot(&self.shutdown_tx, shutdown_tx);

        spawn_send_task(ws_sink, frame_rx, shutdown_rx, self.state.clone());
        spawn_recv_task(
            ws_stream,
            self.state.clone(),
            self.capture.clone(),
            self.shutdown_tx.clone(),
            self.note.clone(),
            self.on_transcript.clone(),
            self.on_error.clone(),
        );

        Ok(())
    }

    /// Stop capture, close the connection, and clear internal handles.
    ///
    /// Safe to call repeatedly and when never connected.
    pub fn disconnect(&mut self) {
        teardown(&self.state, &self.capture, &self.shutdown_tx);
    }

    /// Current connection lifecycle state; purely observational
    pub fn connection_state(&self) -> ConnectionState {
        load_state(&self.state)
    }

    /// Whether the session considers itself currently open
    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Open
    }

    /// Snapshot of the accumulated note content
    pub fn note_contents(&self) -> String {
        match self.note.lock() {
            Ok(guard) => guard.contents().to_string(),
            Err(poisoned) => poisoned.into_inner().contents().to_string(),
        }
    }
}

impl Drop for RealtimeSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn set_slot<T>(slot: &Mutex<Option<T>>, value: T) {
    match slot.lock() {
        Ok(mut guard) => *guard = Some(value),
        Err(poisoned) => *poisoned.into_inner() = Some(value),
    }
}

fn take_slot<T>(slot: &Mutex<Option<T>>) -> Option<T> {
    match slot.lock() {
        Ok(mut guard) => guard.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    }
}

/// Shared teardown for explicit disconnects and connection-level failures
///
/// Capture stops before the wire closes so the microphone is released even
/// when the socket hangs around.
fn teardown(
    state: &AtomicU8,
    capture: &Mutex<Option<AudioCaptureHandle>>,
    shutdown_tx: &Mutex<Option<mpsc::Sender<()>>>,
) {
    if let Some(mut handle) = take_slot(capture) {
        handle.stop();
    }
    store_state(state, ConnectionState::Closed);
    if let Some(tx) = take_slot(shutdown_tx) {
        let _ = tx.try_send(());
    }
}

/// Build the wire message for one frame, or drop it when the connection is
/// not open
pub(crate) fn outbound_frame(state: &AtomicU8, samples: &[f32]) -> Option<Message> {
    if load_state(state) != ConnectionState::Open {
        trace!("Dropping audio frame: connection not open");
        return None;
    }
    let msg = ClientMessage::InputAudioBufferAppend {
        audio: encode_frame(samples),
    };
    serde_json::to_string(&msg).ok().map(Message::Text)
}

/// Spawn the send task that forwards encoded audio frames to the relay
fn spawn_send_task<S>(
    mut ws_sink: S,
    mut frame_rx: mpsc::Receiver<audio::AudioFrame>,
    mut shutdown_rx: mpsc::Receiver<()>,
    state: Arc<AtomicU8>,
) -> tokio::task::JoinHandle<()>
where
    S: SinkExt<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut frames_sent = 0u64;
        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => {
                    let _ = ws_sink.close().await;
                    break;
                }
                frame = frame_rx.recv() => match frame {
                    Some(frame) => {
                        // A late in-flight frame after close is dropped here
                        let Some(msg) = outbound_frame(&state, &frame.samples) else {
                            continue;
                        };
                        if ws_sink.send(msg).await.is_err() {
                            warn!("Failed to send audio frame, stopping send task");
                            break;
                        }
                        frames_sent += 1;
                        if frames_sent == 1 || frames_sent.is_multiple_of(100) {
                            debug!("Sent {} audio frames", frames_sent);
                        }
                    }
                    None => {
                        let _ = ws_sink.close().await;
                        break;
                    }
                }
            }
        }
        trace!("Send task exiting after {} frames", frames_sent);
    })
}

/// Spawn the receive task that handles inbound relay messages
fn spawn_recv_task<S>(
    mut ws_stream: S,
    state: Arc<AtomicU8>,
    capture: Arc<Mutex<Option<AudioCaptureHandle>>>,
    shutdown_tx: Arc<Mutex<Option<mpsc::Sender<()>>>>,
    note: Arc<Mutex<NoteBuffer>>,
    on_transcript: TranscriptCallback,
    on_error: ErrorCallback,
) -> tokio::task::JoinHandle<()>
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + Unpin
        + Send
        + 'static,
{
    tokio::spawn(async move {
        while let Some(msg_result) = ws_stream.next().await {
            match msg_result {
                Ok(Message::Text(text)) => {
                    handle_relay_message(&text, &note, &on_transcript, &on_error);
                }
                Ok(Message::Close(_)) => {
                    info!("Relay closed the connection");
                    // Unsolicited close: report and tear down. After an
                    // explicit disconnect the state is already Closed.
                    if load_state(&state) == ConnectionState::Open {
                        let err = TranscriptionError::Connection(
                            "connection closed by relay".to_string(),
                        );
                        (on_error)(&err);
                        teardown(&state, &capture, &shutdown_tx);
                    }
                    break;
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Ok(_) => {}
                Err(e) => {
                    error!("WebSocket receive error: {}", e);
                    if load_state(&state) == ConnectionState::Open {
                        let err = TranscriptionError::Connection(e.to_string());
                        (on_error)(&err);
                        teardown(&state, &capture, &shutdown_tx);
                    }
                    break;
                }
            }
        }
        store_state(&state, ConnectionState::Closed);
    })
}

/// Parse one inbound relay message and apply it
///
/// Malformed messages are logged and skipped; later messages keep flowing.
fn handle_relay_message(
    text: &str,
    note: &Mutex<NoteBuffer>,
    on_transcript: &TranscriptCallback,
    on_error: &ErrorCallback,
) {
    let event: ServerEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            warn!("Failed to parse relay message: {} - {}", e, text);
            return;
        }
    };

    if matches!(event, ServerEvent::Error { .. }) {
        let message = event
            .error_message()
            .unwrap_or_else(|| "Unknown error".to_string());
        error!("Upstream transcription error: {}", message);
        // Recoverable: the session stays open, the caller decides
        (on_error)(&TranscriptionError::Upstream(message));
        return;
    }

    if let Some(update) = event.transcript_update() {
        let snapshot = {
            let mut guard = match note.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.apply(&update);
            guard.contents().to_string()
        };
        (on_transcript)(&snapshot);
    }
}
