//! Event types broadcast to session subscribers.
//!
//! ## Channels
//!
//! | Event | Source |
//! |-------|--------|
//! | `SubtitleEvent` | server subtitle / STT messages |
//! | `ConnectionEvent` | transport state changes |
//! | `ActivityEvent` | capture pipeline, per drained block |
//!
//! All payloads serialise with camelCase fields so a web front end can
//! consume them unchanged.

use serde::{Deserialize, Serialize};

use crate::net::ConnectionState;

// ---------------------------------------------------------------------------
// Subtitle events
// ---------------------------------------------------------------------------

/// Emitted when the server delivers subtitle or speech-recognition text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Who the text belongs to.
    pub speaker: Speaker,
    /// Subtitle or recognised-speech text.
    pub text: String,
    /// Whether this text is final for the current utterance.
    pub complete: bool,
}

/// Origin of a subtitle line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The avatar's reply text.
    Avatar,
    /// Recognition of the user's own speech.
    User,
}

// ---------------------------------------------------------------------------
// Connection events
// ---------------------------------------------------------------------------

/// Emitted whenever the transport changes state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionEvent {
    pub state: ConnectionState,
    /// Optional human-readable detail (e.g. close reason).
    pub detail: Option<String>,
}

// ---------------------------------------------------------------------------
// Audio activity events
// ---------------------------------------------------------------------------

/// Emitted for each block the capture pipeline processes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Root-mean-square level of the block in [0.0, 1.0].
    pub rms: f32,
    /// VAD decision for the current block.
    pub is_voice: bool,
}
