//! Sample-rate conversion using a rubato `FastFixedIn` resampler.
//!
//! Used in two places: the capture pipeline (device rate → 16 kHz wire
//! rate) and the playback sink (chunk rate → output device rate). Both run
//! on non-RT threads where allocation is allowed.
//!
//! When the two rates match, `RateConverter` is a passthrough and no rubato
//! session is created at all.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::error;

use crate::error::{Result, VultusError};

/// Converts f32 mono audio from one fixed sample rate to another.
pub struct RateConverter {
    /// `None` when source rate == target rate (passthrough mode).
    resampler: Option<FastFixedIn<f32>>,
    /// Holds partial input between calls — rubato wants fixed-size blocks.
    input_buf: Vec<f32>,
    /// Input frame count per rubato call.
    chunk_size: usize,
    /// Pre-allocated `[1][output_frames_max]` output buffer.
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// # Errors
    /// Returns `VultusError::AudioStream` if rubato fails to initialise.
    pub fn new(source_rate: u32, target_rate: u32, chunk_size: usize) -> Result<Self> {
        if source_rate == target_rate {
            return Ok(Self {
                resampler: None,
                input_buf: Vec::new(),
                chunk_size,
                output_buf: Vec::new(),
            });
        }

        let ratio = target_rate as f64 / source_rate as f64;
        let resampler = FastFixedIn::<f32>::new(
            ratio,
            1.0, // fixed ratio — no dynamic adjustment
            PolynomialDegree::Cubic,
            chunk_size,
            1, // mono
        )
        .map_err(|e| VultusError::AudioStream(format!("resampler init: {e}")))?;

        let max_out = resampler.output_frames_max();
        let output_buf = vec![vec![0f32; max_out]; 1];

        Ok(Self {
            resampler: Some(resampler),
            input_buf: Vec::new(),
            chunk_size,
            output_buf,
        })
    }

    /// Process incoming samples, returning resampled output (may be empty
    /// while input accumulates toward a full rubato block).
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(ref mut resampler) = self.resampler else {
            return samples.to_vec();
        };

        self.input_buf.extend_from_slice(samples);

        let mut result = Vec::new();
        while self.input_buf.len() >= self.chunk_size {
            let input_slice = &self.input_buf[..self.chunk_size];
            match resampler.process_into_buffer(&[input_slice], &mut self.output_buf, None) {
                Ok((_consumed, produced)) => {
                    result.extend_from_slice(&self.output_buf[0][..produced]);
                }
                Err(e) => error!("resampler process error: {e}"),
            }
            self.input_buf.drain(..self.chunk_size);
        }
        result
    }

    /// Flush whatever partial input remains, padding with silence.
    ///
    /// Call only at end of stream — padding between chunks would insert
    /// audible gaps. Mid-stream remainders stay buffered across calls.
    pub fn drain(&mut self) -> Vec<f32> {
        if self.resampler.is_none() || self.input_buf.is_empty() {
            return Vec::new();
        }
        let pad = self.chunk_size - (self.input_buf.len() % self.chunk_size);
        if pad != self.chunk_size {
            self.input_buf.extend(std::iter::repeat(0.0).take(pad));
        }
        self.process(&[])
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}
