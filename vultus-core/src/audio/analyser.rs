//! Playback-level estimation via a small FFT over the most recent output.
//!
//! Mirrors the level metric the character UI animates its mouth with: an
//! average of frequency-bin magnitudes, normalised against an 8-bit bin
//! scale and boosted ×2.5, clamped to [0, 1].

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// FFT size. 256 samples ≈ 10 ms at 24 kHz, enough resolution for a
/// mouth-level estimate.
pub const FFT_SIZE: usize = 256;

/// Gain applied to the normalised average magnitude.
const RMS_BOOST: f32 = 2.5;

/// Rolling spectrum analyser over the last [`FFT_SIZE`] played samples.
pub struct SpectrumAnalyser {
    fft: Arc<dyn Fft<f32>>,
    /// Ring of the most recent samples, oldest overwritten first.
    recent: [f32; FFT_SIZE],
    write: usize,
    filled: usize,
    scratch: Vec<Complex<f32>>,
}

impl SpectrumAnalyser {
    pub fn new() -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);
        Self {
            fft,
            recent: [0.0; FFT_SIZE],
            write: 0,
            filled: 0,
            scratch: vec![Complex::default(); FFT_SIZE],
        }
    }

    /// Record samples as they are handed to the output device.
    pub fn push(&mut self, samples: &[f32]) {
        for &s in samples {
            self.recent[self.write] = s;
            self.write = (self.write + 1) % FFT_SIZE;
        }
        self.filled = (self.filled + samples.len()).min(FFT_SIZE);
    }

    /// Average bin magnitude of the current window, scaled to [0, 1].
    ///
    /// Matches an 8-bit analyser readout: each bin magnitude is divided by
    /// 256 before averaging, then boosted ×2.5 and clamped.
    pub fn rms(&mut self) -> f32 {
        if self.filled == 0 {
            return 0.0;
        }

        // Unroll the ring into time order for the FFT.
        for (i, slot) in self.scratch.iter_mut().enumerate() {
            let idx = (self.write + i) % FFT_SIZE;
            *slot = Complex::new(self.recent[idx], 0.0);
        }
        self.fft.process(&mut self.scratch);

        let avg = self
            .scratch
            .iter()
            .take(FFT_SIZE / 2)
            .map(|c| c.norm() / 256.0)
            .sum::<f32>()
            / (FFT_SIZE / 2) as f32;

        (avg * RMS_BOOST).clamp(0.0, 1.0)
    }

    pub fn reset(&mut self) {
        self.recent = [0.0; FFT_SIZE];
        self.write = 0;
        self.filled = 0;
    }
}

impl Default for SpectrumAnalyser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_reads_zero() {
        let mut an = SpectrumAnalyser::new();
        an.push(&[0.0; FFT_SIZE]);
        assert_eq!(an.rms(), 0.0);
    }

    #[test]
    fn empty_analyser_reads_zero() {
        let mut an = SpectrumAnalyser::new();
        assert_eq!(an.rms(), 0.0);
    }

    #[test]
    fn loud_tone_reads_higher_than_quiet_tone() {
        let tone = |amp: f32| -> Vec<f32> {
            (0..FFT_SIZE)
                .map(|i| amp * (i as f32 * 0.3).sin())
                .collect()
        };

        let mut loud = SpectrumAnalyser::new();
        loud.push(&tone(0.9));
        let mut quiet = SpectrumAnalyser::new();
        quiet.push(&tone(0.05));

        let loud_rms = loud.rms();
        let quiet_rms = quiet.rms();
        assert!(loud_rms > quiet_rms, "loud={loud_rms} quiet={quiet_rms}");
        assert!(loud_rms <= 1.0);
    }

    #[test]
    fn reset_returns_to_zero() {
        let mut an = SpectrumAnalyser::new();
        an.push(&[0.7; FFT_SIZE]);
        assert!(an.rms() > 0.0);
        an.reset();
        assert_eq!(an.rms(), 0.0);
    }
}
