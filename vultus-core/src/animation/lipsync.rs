//! Mouth amplitude selection.
//!
//! The session normally supplies the live playback level every frame.
//! When it has none (no stream yet, or playback disposed) an optional
//! local WAV file provides a fallback amplitude so the mouth still moves
//! in demos. External values pass through untouched; only the fallback
//! gets the `sqrt(v) * 0.6` perceptual curve.

use std::path::Path;

use crate::audio::wav::WavAmplitude;
use crate::error::Result;

/// Gain applied to the square-rooted fallback level.
const FALLBACK_GAIN: f32 = 0.6;

/// Chooses the mouth-open amplitude for a frame.
pub struct LipSync {
    fallback: Option<WavAmplitude>,
}

impl LipSync {
    /// No fallback: silence whenever no external amplitude is supplied.
    pub fn new() -> Self {
        Self { fallback: None }
    }

    /// Use `path` as the fallback amplitude source.
    pub fn with_wav(path: &Path) -> Result<Self> {
        Ok(Self {
            fallback: Some(WavAmplitude::load(path)?),
        })
    }

    #[cfg(test)]
    fn with_fallback(fallback: WavAmplitude) -> Self {
        Self {
            fallback: Some(fallback),
        }
    }

    /// Amplitude for this frame, in [0, 1] for fallback values.
    ///
    /// `external` is the live playback level; `Some` always wins and is
    /// returned unchanged. Otherwise the WAV cursor advances by `dt` and
    /// its shaped level is returned (0.0 with no fallback configured).
    pub fn amplitude(&mut self, external: Option<f32>, dt: f64) -> f32 {
        if let Some(level) = external {
            return level;
        }
        match self.fallback.as_mut() {
            Some(wav) => {
                wav.update(dt);
                (wav.rms().sqrt() * FALLBACK_GAIN).min(1.0)
            }
            None => 0.0,
        }
    }

    pub fn restart_fallback(&mut self) {
        if let Some(wav) = self.fallback.as_mut() {
            wav.restart();
        }
    }
}

impl Default for LipSync {
    fn default() -> Self {
        Self::new()
    }
}
