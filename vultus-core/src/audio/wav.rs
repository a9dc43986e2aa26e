//! WAV handling: stream-header sniffing and a file-based amplitude reader.

use std::path::Path;

use hound::WavReader;
use tracing::{debug, warn};

use crate::audio::playback::StreamFormat;
use crate::error::{Result, VultusError};

/// Byte length of the canonical RIFF/WAVE header the service prepends to
/// the first chunk of a stream.
pub const WAV_HEADER_LEN: usize = 44;

/// Sniff a 44-byte RIFF header at the front of `buf`.
///
/// Accepted only when all three hold:
/// - bytes [0..4] read as a big-endian u32 equal 0x52494646 (`RIFF`)
/// - channels (LE u16 at [22..24]) is 1 or 2
/// - sample rate (LE u32 at [24..28]) is within 8000..=96000
///
/// Returns the declared format and the payload after the header. Anything
/// else returns `None` and the whole buffer is raw PCM at the caller's
/// current format.
pub fn parse_wav_header(buf: &[u8]) -> Option<(StreamFormat, &[u8])> {
    if buf.len() < WAV_HEADER_LEN {
        return None;
    }

    let magic = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if magic != 0x5249_4646 {
        return None;
    }

    let channels = u16::from_le_bytes([buf[22], buf[23]]);
    if !(1..=2).contains(&channels) {
        return None;
    }

    let sample_rate = u32::from_le_bytes([buf[24], buf[25], buf[26], buf[27]]);
    if !(8_000..=96_000).contains(&sample_rate) {
        return None;
    }

    let format = StreamFormat {
        channels,
        sample_rate,
    };
    debug!(channels, sample_rate, "stream header detected");
    Some((format, &buf[WAV_HEADER_LEN..]))
}

/// Windowed-RMS amplitude reader over a local WAV file.
///
/// Used as the lip-sync fallback when no live playback amplitude exists:
/// a cursor advances through the decoded samples in real time and `rms()`
/// reports the level of a short window around it.
pub struct WavAmplitude {
    samples: Vec<f32>,
    sample_rate: u32,
    /// Playback position in samples, advanced by `update(dt)`.
    cursor: f64,
    window: usize,
}

/// Window length for the amplitude estimate, in seconds.
const RMS_WINDOW_SECS: f64 = 0.03;

impl WavAmplitude {
    /// Decode `path` to mono f32. Multichannel files are averaged down.
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = WavReader::open(path)
            .map_err(|e| VultusError::Other(anyhow::anyhow!("failed to open wav: {e}")))?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| VultusError::Other(anyhow::anyhow!("wav decode: {e}")))?,
            hound::SampleFormat::Int => {
                let shift = 1i64 << (spec.bits_per_sample - 1);
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / shift as f32))
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|e| VultusError::Other(anyhow::anyhow!("wav decode: {e}")))?
            }
        };

        let samples = if channels == 1 {
            interleaved
        } else {
            interleaved
                .chunks_exact(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                .collect()
        };

        if samples.is_empty() {
            warn!(path = %path.display(), "lip-sync wav contains no samples");
        }

        let window = ((spec.sample_rate as f64 * RMS_WINDOW_SECS) as usize).max(1);

        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
            cursor: 0.0,
            window,
        })
    }

    #[cfg(test)]
    pub(crate) fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        let window = ((sample_rate as f64 * RMS_WINDOW_SECS) as usize).max(1);
        Self {
            samples,
            sample_rate,
            cursor: 0.0,
            window,
        }
    }

    /// Advance the cursor by `dt` seconds, looping at end of file.
    pub fn update(&mut self, dt: f64) {
        if self.samples.is_empty() {
            return;
        }
        self.cursor += dt * self.sample_rate as f64;
        let len = self.samples.len() as f64;
        if self.cursor >= len {
            self.cursor %= len;
        }
    }

    /// RMS of the window ending at the cursor, in [0, 1].
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let end = (self.cursor as usize).min(self.samples.len());
        let start = end.saturating_sub(self.window);
        let slice = &self.samples[start..end];
        if slice.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = slice.iter().map(|s| s * s).sum();
        (sum_sq / slice.len() as f32).sqrt()
    }

    pub fn restart(&mut self) {
        self.cursor = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal valid 44-byte header followed by `payload`.
    fn header(channels: u16, rate: u32, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; WAV_HEADER_LEN];
        buf[0..4].copy_from_slice(b"RIFF");
        buf[8..12].copy_from_slice(b"WAVE");
        buf[22..24].copy_from_slice(&channels.to_le_bytes());
        buf[24..28].copy_from_slice(&rate.to_le_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn accepts_valid_header_and_strips_it() {
        let buf = header(2, 48_000, &[1, 2, 3, 4]);
        let (fmt, payload) = parse_wav_header(&buf).expect("header should parse");
        assert_eq!(fmt.channels, 2);
        assert_eq!(fmt.sample_rate, 48_000);
        assert_eq!(payload, &[1, 2, 3, 4]);
    }

    #[test]
    fn rejects_wrong_magic() {
        let mut buf = header(1, 24_000, &[]);
        buf[0] = b'X';
        assert!(parse_wav_header(&buf).is_none());
    }

    #[test]
    fn rejects_out_of_range_channels() {
        assert!(parse_wav_header(&header(0, 24_000, &[])).is_none());
        assert!(parse_wav_header(&header(3, 24_000, &[])).is_none());
    }

    #[test]
    fn rejects_out_of_range_sample_rate() {
        assert!(parse_wav_header(&header(1, 7_999, &[])).is_none());
        assert!(parse_wav_header(&header(1, 96_001, &[])).is_none());
        assert!(parse_wav_header(&header(1, 8_000, &[])).is_some());
        assert!(parse_wav_header(&header(1, 96_000, &[])).is_some());
    }

    #[test]
    fn rejects_short_buffer() {
        assert!(parse_wav_header(b"RIFF").is_none());
        assert!(parse_wav_header(&[]).is_none());
    }

    #[test]
    fn coincidental_riff_in_pcm_needs_valid_fields() {
        // Starts with RIFF but channel field says 9 — raw PCM, not a header.
        let mut buf = header(9, 24_000, &[0; 16]);
        buf[0..4].copy_from_slice(b"RIFF");
        assert!(parse_wav_header(&buf).is_none());
    }

    #[test]
    fn amplitude_tracks_loud_and_quiet_regions() {
        let rate = 1_000u32;
        // First second loud, second second silent
        let mut samples = vec![0.8f32; 1_000];
        samples.extend(vec![0.0f32; 1_000]);
        let mut amp = WavAmplitude::from_samples(samples, rate);

        amp.update(0.5);
        assert!(amp.rms() > 0.5);

        amp.update(1.2);
        assert!(amp.rms() < 0.01);
    }

    #[test]
    fn amplitude_loops_at_end_of_file() {
        let mut amp = WavAmplitude::from_samples(vec![0.5f32; 100], 100);
        amp.update(2.5);
        // Cursor wrapped back inside the file
        assert!(amp.rms() > 0.4);
    }

    #[test]
    fn empty_file_reports_zero() {
        let mut amp = WavAmplitude::from_samples(vec![], 100);
        amp.update(1.0);
        assert_eq!(amp.rms(), 0.0);
    }
}
