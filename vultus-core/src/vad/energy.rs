//! Energy-based VAD using an RMS threshold + hangover counter.
//!
//! ## Algorithm
//!
//! 1. Compute RMS of the incoming block.
//! 2. If RMS ≥ `threshold` → voice active, reset hangover counter.
//! 3. If RMS < `threshold` and hangover counter > 0 → still active,
//!    decrement counter (prevents clipping syllable endings).
//! 4. Otherwise → silence.

use super::{VadDecision, VoiceActivityDetector};

/// A simple energy-based voice activity detector.
#[derive(Debug, Clone)]
pub struct EnergyVad {
    /// RMS amplitude threshold. Blocks above this are considered speech.
    /// Typical range: 0.01–0.05 for a quiet microphone.
    threshold: f32,
    /// How many consecutive below-threshold blocks to still report speech
    /// after real speech ends.
    hangover_blocks: u32,
    /// Current hangover countdown.
    hangover_counter: u32,
}

impl EnergyVad {
    /// Create a new `EnergyVad`.
    ///
    /// # Parameters
    /// - `threshold`: RMS level above which a block is considered speech.
    ///   Default: `0.015`.
    /// - `hangover_blocks`: Number of silent blocks to extend speech
    ///   detection. Default: `8`.
    pub fn new(threshold: f32, hangover_blocks: u32) -> Self {
        Self {
            threshold,
            hangover_blocks,
            hangover_counter: 0,
        }
    }

    /// Raise or lower the speech threshold at runtime.
    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold;
    }

    /// Root-mean-square of a sample slice.
    pub fn rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
        (sum_sq / samples.len() as f32).sqrt()
    }
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self::new(0.015, 8)
    }
}

impl VoiceActivityDetector for EnergyVad {
    fn process(&mut self, samples: &[f32]) -> VadDecision {
        let energy = Self::rms(samples);

        let voice_active = if energy >= self.threshold {
            self.hangover_counter = self.hangover_blocks;
            true
        } else if self.hangover_counter > 0 {
            self.hangover_counter -= 1;
            true
        } else {
            false
        };

        VadDecision {
            voice_active,
            energy,
        }
    }

    fn reset(&mut self) {
        self.hangover_counter = 0;
    }
}
