//! # vultus-core
//!
//! Client-side engine for a voice-driven virtual avatar: duplex audio
//! over one websocket, plus the parameter animation that keeps the
//! character alive while it talks.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → MicCapture → SPSC ring → capture loop (spawn_blocking)
//!                                            │ VAD + gate, 2048-sample frames
//!                                            ▼
//!                                   TransportSession ◄── ClientMessage (text)
//!                                            │
//!                          ┌─────────────────┴───────────────┐
//!                    binary chunks                    ServerMessage
//!                          ▼                                 ▼
//!                  PlaybackScheduler               AvatarSession::tick
//!                          │ level (rms)                     │
//!                          └──────────► AvatarAnimator ──────┘
//!                                        (transitions, blink, lip sync)
//!                                              │
//!                                          dyn Rig
//! ```
//!
//! The audio callbacks are zero-alloc. Everything that touches the rig
//! runs on the single thread that calls [`session::AvatarSession::tick`].

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod animation;
pub mod audio;
pub mod buffering;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod net;
pub mod rig;
pub mod session;
pub mod vad;

// Convenience re-exports for downstream crates
pub use config::{CaptureConfig, PlaybackConfig, ReconnectConfig, SessionConfig};
pub use error::{Result, VultusError};
pub use events::{ActivityEvent, ConnectionEvent, Speaker, SubtitleEvent};
pub use net::{ClientMessage, ConnectionState, ServerMessage};
pub use rig::{MotionPriority, ParamHandle, Rig};
pub use session::AvatarSession;
