//! Session configuration.
//!
//! Defaults mirror the wire contract of the voice-character service:
//! 16 kHz mono PCM16 frames outbound, 24 kHz mono PCM16 inbound unless a
//! stream header says otherwise, 3 s fixed reconnect delay with 5 attempts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the microphone capture pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct CaptureConfig {
    /// Sample rate frames are sent at (Hz). The service expects 16 000.
    pub target_sample_rate: u32,
    /// Outbound frame length in samples. Frames are always exactly this
    /// long regardless of how the device chunks its callbacks.
    pub frame_len: usize,
    /// Energy level above which the voice-activity flag turns on.
    pub vad_threshold: f32,
    /// Rolling-average energy floor below which frames are suppressed.
    pub noise_gate: f32,
    /// Below-threshold blocks that still count as voice after speech ends.
    pub vad_hangover_blocks: u32,
    /// Whether the VAD/noise-gate filter runs at all. When false every
    /// assembled frame is transmitted.
    pub gate_enabled: bool,
    /// Preferred input device name; `None` uses the system default.
    pub preferred_input_device: Option<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16_000,
            frame_len: 2_048,
            vad_threshold: 0.015,
            noise_gate: 0.005,
            vad_hangover_blocks: 8,
            gate_enabled: true,
            preferred_input_device: None,
        }
    }
}

/// Configuration for inbound audio playback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct PlaybackConfig {
    /// Channel count assumed for headerless chunks until a header arrives.
    pub default_channels: u16,
    /// Sample rate assumed for headerless chunks until a header arrives.
    pub default_sample_rate: u32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_channels: 1,
            default_sample_rate: 24_000,
        }
    }
}

/// Bounded fixed-delay reconnection policy parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct ReconnectConfig {
    /// Fixed delay between attempts, in milliseconds.
    pub delay_ms: u64,
    /// Attempts before giving up and entering the exhausted state.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay_ms: 3_000,
            max_attempts: 5,
        }
    }
}

impl ReconnectConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Top-level configuration for an [`AvatarSession`](crate::session::AvatarSession).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct SessionConfig {
    /// WebSocket URL of the voice-character service.
    pub server_url: String,
    pub capture: CaptureConfig,
    pub playback: PlaybackConfig,
    pub reconnect: ReconnectConfig,
    /// Parameter transition rate; higher settles faster. Clamped to 0.1 minimum.
    pub transition_rate: f32,
    /// Optional WAV file used as the lip-sync amplitude fallback when no
    /// live playback amplitude is supplied.
    pub lipsync_wav_path: Option<std::path::PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            capture: CaptureConfig::default(),
            playback: PlaybackConfig::default(),
            reconnect: ReconnectConfig::default(),
            transition_rate: 5.0,
            lipsync_wav_path: None,
        }
    }
}
