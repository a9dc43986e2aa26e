//! Audio I/O via the cpal backend.
//!
//! # Design constraints
//!
//! The cpal input/output callbacks run on OS audio threads at elevated
//! priority. They **must not**:
//! - Allocate heap memory
//! - Block on a mutex or condvar
//! - Perform I/O
//!
//! Both directions honour that contract by exchanging samples with the
//! control side exclusively through SPSC ring buffers whose `push_slice` /
//! `pop_slice` are lock-free and allocation-free.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio
//! on macOS). [`MicCapture`] must be created and dropped on the same
//! thread; the capture pipeline does this inside `spawn_blocking`.

pub mod analyser;
pub mod capture;
pub mod pcm;
pub mod playback;
pub mod resample;
pub mod wav;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig,
};

use crate::{
    buffering::AudioProducer,
    error::{Result, VultusError},
};
#[cfg(feature = "audio-cpal")]
use crate::buffering::Producer;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

/// Classify a device/stream failure: declined OS microphone access is a
/// `PermissionDenied`, everything else stays a stream error.
#[cfg(feature = "audio-cpal")]
fn classify_stream_error(detail: String) -> VultusError {
    let lowered = detail.to_ascii_lowercase();
    if lowered.contains("permission") || lowered.contains("access denied") {
        VultusError::PermissionDenied(detail)
    } else {
        VultusError::AudioStream(detail)
    }
}

/// Same classification for failures while querying a device's config,
/// which count against the device rather than a stream.
#[cfg(feature = "audio-cpal")]
pub(crate) fn classify_device_error(detail: String) -> VultusError {
    match classify_stream_error(detail) {
        VultusError::AudioStream(d) => VultusError::AudioDevice(d),
        other => other,
    }
}

/// Handle to an active microphone stream.
///
/// **Not `Send`** — `cpal::Stream` is bound to its creation thread on
/// Windows/macOS. Create and drop this type on the same OS thread.
pub struct MicCapture {
    /// Kept alive so the stream is not dropped prematurely.
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    /// Shared flag — set to `false` to signal the callback to no-op.
    running: Arc<AtomicBool>,
    /// Actual capture sample rate reported by the device (Hz).
    pub sample_rate: u32,
}

impl MicCapture {
    /// Open an input device by preferred name, otherwise fall back to the
    /// default input device, and push mono f32 samples into `producer`.
    ///
    /// # Errors
    /// - `VultusError::PermissionDenied` when the OS declines microphone access.
    /// - `VultusError::NoDefaultInputDevice` when no microphone exists.
    /// - `VultusError::AudioDevice` / `AudioStream` for other cpal failures.
    #[cfg(feature = "audio-cpal")]
    pub fn open(
        mut producer: AudioProducer,
        running: Arc<AtomicBool>,
        preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        use cpal::traits::HostTrait;

        let host = cpal::default_host();
        let mut selected = None;

        if let Some(preferred) = preferred_device_name {
            match host.input_devices() {
                Ok(mut devices) => {
                    selected = devices
                        .find(|d| d.name().map(|n| n == preferred).unwrap_or(false));
                    if selected.is_none() {
                        warn!("preferred input device '{preferred}' not found, falling back");
                    }
                }
                Err(e) => warn!("failed to list input devices: {e}"),
            }
        }

        let device = match selected.or_else(|| host.default_input_device()) {
            Some(d) => d,
            None => return Err(VultusError::NoDefaultInputDevice),
        };

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening input device"
        );

        let supported = device
            .default_input_config()
            .map_err(|e| classify_device_error(e.to_string()))?;

        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        info!(sample_rate, channels, "capture config selected");

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let running_f32 = Arc::clone(&running);
        let running_i16 = Arc::clone(&running);

        let stream = match supported.sample_format() {
            SampleFormat::F32 => {
                let ch = channels as usize;
                let mut mix_buf: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _info| {
                        if !running_f32.load(Ordering::Relaxed) {
                            return;
                        }
                        if ch == 1 {
                            push_all(&mut producer, data);
                            return;
                        }
                        downmix(data, ch, &mut mix_buf);
                        push_all(&mut producer, &mix_buf);
                    },
                    |err| error!("capture stream error: {err}"),
                    None,
                )
            }

            SampleFormat::I16 => {
                let ch = channels as usize;
                let mut mix_buf: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _info| {
                        if !running_i16.load(Ordering::Relaxed) {
                            return;
                        }
                        let frames = data.len() / ch;
                        mix_buf.resize(frames, 0.0);
                        for f in 0..frames {
                            let mut sum = 0f32;
                            let base = f * ch;
                            for c in 0..ch {
                                sum += data[base + c] as f32 / 32_768.0;
                            }
                            mix_buf[f] = sum / ch as f32;
                        }
                        push_all(&mut producer, &mix_buf);
                    },
                    |err| error!("capture stream error: {err}"),
                    None,
                )
            }

            fmt => {
                return Err(VultusError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| classify_stream_error(e.to_string()))?;

        stream
            .play()
            .map_err(|e| classify_stream_error(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            sample_rate,
        })
    }

    /// Stop: signal the callback to no-op on its next invocation.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

#[cfg(feature = "audio-cpal")]
fn push_all(producer: &mut AudioProducer, samples: &[f32]) {
    let written = producer.push_slice(samples);
    if written < samples.len() {
        warn!("capture ring full: dropped {} samples", samples.len() - written);
    }
}

#[cfg(feature = "audio-cpal")]
fn downmix(data: &[f32], ch: usize, out: &mut Vec<f32>) {
    let frames = data.len() / ch;
    out.resize(frames, 0.0);
    for f in 0..frames {
        let mut sum = 0f32;
        let base = f * ch;
        for c in 0..ch {
            sum += data[base + c];
        }
        out[f] = sum / ch as f32;
    }
}


/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl MicCapture {
    pub fn open(
        _producer: AudioProducer,
        _running: Arc<AtomicBool>,
        _preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        Err(VultusError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }
}
