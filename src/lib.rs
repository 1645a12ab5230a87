#![deny(clippy::all)]

//! Realtime audio transcription relay for the Scribenote editor.
//!
//! Three cooperating pieces: microphone capture and PCM16 encoding
//! ([`audio`]), a client session that streams frames to the relay and turns
//! transcript events into note appends ([`session`]), and the server-side
//! bridge that pairs each client connection with one upstream realtime
//! transcription connection ([`relay`]).

pub mod audio;
pub mod config;
pub mod protocol;
pub mod relay;
pub mod session;
