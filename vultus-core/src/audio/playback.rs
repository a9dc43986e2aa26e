//! Inbound audio playback: sticky stream format, gapless scheduling and a
//! live level estimate for lip sync.
//!
//! ## Data flow
//!
//! ```text
//! binary ws frame ──► handle_received_audio
//!                        │  header sniff → sticky StreamFormat
//!                        │  PCM16 LE → f32, downmix, resample to device rate
//!                        ▼
//!                  playback SPSC ring ──► cpal output callback
//!                                              │ copies played samples
//!                                              ▼
//!                                         tap SPSC ring ──► SpectrumAnalyser
//! ```
//!
//! Scheduling itself is pure: [`ScheduleCursor`] only does arithmetic on a
//! [`Clock`], so back-to-back placement is testable without a device.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::{
    audio::{
        analyser::SpectrumAnalyser,
        pcm,
        resample::RateConverter,
        wav::parse_wav_header,
    },
    buffering::{
        create_playback_ring, create_tap_ring, AudioConsumer, AudioProducer, Consumer, Producer,
    },
    config::PlaybackConfig,
    error::Result,
};

/// Declared format of the inbound PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub channels: u16,
    pub sample_rate: u32,
}

impl StreamFormat {
    pub fn from_config(config: &PlaybackConfig) -> Self {
        Self {
            channels: config.default_channels,
            sample_rate: config.default_sample_rate,
        }
    }
}

/// Source of "now" for the scheduler, in seconds.
pub trait Clock {
    fn now(&self) -> f64;
}

/// Monotonic wall clock anchored at construction.
pub struct WallClock {
    epoch: Instant,
}

impl WallClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for WallClock {
    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}

/// Hand-advanced clock for tests and offline drivers.
pub struct ManualClock {
    now: std::cell::Cell<f64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: std::cell::Cell::new(0.0),
        }
    }

    pub fn advance(&self, dt: f64) {
        self.now.set(self.now.get() + dt);
    }

    pub fn set(&self, t: f64) {
        self.now.set(t);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.now.get()
    }
}

/// Places chunks strictly back to back on a time axis.
///
/// For each chunk: `start = max(now, next_start)`, then
/// `next_start = start + duration`. Chunks arriving faster than real time
/// queue seamlessly; a late chunk starts immediately with no attempt to
/// catch up.
#[derive(Debug, Default)]
pub struct ScheduleCursor {
    next_start: f64,
}

impl ScheduleCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a chunk of `duration` seconds; returns its start time.
    pub fn schedule(&mut self, now: f64, duration: f64) -> f64 {
        let start = now.max(self.next_start);
        self.next_start = start + duration;
        start
    }

    /// Time the queue drains, i.e. when the last scheduled chunk ends.
    pub fn next_start(&self) -> f64 {
        self.next_start
    }

    /// True while scheduled audio extends past `now`.
    pub fn is_playing(&self, now: f64) -> bool {
        self.next_start > now
    }

    pub fn reset(&mut self) {
        self.next_start = 0.0;
    }
}

#[cfg(feature = "audio-cpal")]
struct OutputSink {
    _stream: cpal::Stream,
    sample_rate: u32,
}

#[cfg(feature = "audio-cpal")]
impl OutputSink {
    /// Open the default output device. The callback pulls from `consumer`
    /// and copies what it played into `tap` for the analyser; underruns
    /// emit silence.
    fn open(mut consumer: AudioConsumer, mut tap: AudioProducer) -> Result<Self> {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(crate::error::VultusError::NoDefaultOutputDevice)?;

        let supported = device
            .default_output_config()
            .map_err(|e| crate::audio::classify_device_error(e.to_string()))?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels() as usize;

        info!(
            device = device.name().unwrap_or_default().as_str(),
            sample_rate, channels, "opening output device"
        );

        let config = cpal::StreamConfig {
            channels: channels as u16,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _info| {
                    // Mono source fanned out to every output channel.
                    for frame in data.chunks_mut(channels) {
                        let mut sample = 0.0f32;
                        let got = consumer.pop_slice(std::slice::from_mut(&mut sample));
                        if got == 0 {
                            sample = 0.0;
                        }
                        for slot in frame.iter_mut() {
                            *slot = sample;
                        }
                        let _ = tap.push_slice(std::slice::from_ref(&sample));
                    }
                },
                |err| tracing::error!("playback stream error: {err}"),
                None,
            )
            .map_err(|e| crate::error::VultusError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| crate::error::VultusError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            sample_rate,
        })
    }
}

/// Schedules inbound PCM chunks for gapless playback.
///
/// **Not `Send`** once initialised — the cpal output stream is bound to
/// its creation thread. Construct and drive from one thread.
pub struct PlaybackScheduler<C: Clock = WallClock> {
    config: PlaybackConfig,
    clock: C,
    format: StreamFormat,
    cursor: ScheduleCursor,
    analyser: SpectrumAnalyser,
    /// Converts chunk-rate mono to the sink rate. Rebuilt when either rate
    /// changes.
    converter: Option<RateConverter>,
    converter_rates: (u32, u32),
    /// Producer feeding the output callback; `None` until initialised.
    ring: Option<AudioProducer>,
    /// Analyser tap fed by the output callback.
    tap: Option<AudioConsumer>,
    #[cfg(feature = "audio-cpal")]
    sink: Option<OutputSink>,
    initialised: bool,
    chunks_scheduled: u64,
}

impl PlaybackScheduler<WallClock> {
    pub fn new(config: PlaybackConfig) -> Self {
        Self::with_clock(config, WallClock::new())
    }
}

impl<C: Clock> PlaybackScheduler<C> {
    pub fn with_clock(config: PlaybackConfig, clock: C) -> Self {
        let format = StreamFormat::from_config(&config);
        Self {
            config,
            clock,
            format,
            cursor: ScheduleCursor::new(),
            analyser: SpectrumAnalyser::new(),
            converter: None,
            converter_rates: (0, 0),
            ring: None,
            tap: None,
            #[cfg(feature = "audio-cpal")]
            sink: None,
            initialised: false,
            chunks_scheduled: 0,
        }
    }

    /// Open the output path. Idempotent — repeat calls are no-ops.
    ///
    /// A missing output device is downgraded to a warning: chunks are
    /// still decoded, scheduled and fed to the analyser so lip sync keeps
    /// working without audible output.
    pub fn initialize_playback(&mut self) {
        if self.initialised {
            debug!("playback already initialised");
            return;
        }

        let (ring_prod, ring_cons) = create_playback_ring();
        let (tap_prod, tap_cons) = create_tap_ring();

        #[cfg(feature = "audio-cpal")]
        {
            match OutputSink::open(ring_cons, tap_prod) {
                Ok(sink) => {
                    self.sink = Some(sink);
                    self.ring = Some(ring_prod);
                    self.tap = Some(tap_cons);
                }
                Err(e) => {
                    warn!("no audible output ({e}); continuing analyser-only");
                }
            }
        }
        #[cfg(not(feature = "audio-cpal"))]
        {
            let _ = (ring_prod, ring_cons, tap_prod, tap_cons);
        }

        self.initialised = true;
        info!("playback initialised");
    }

    /// Handle one binary frame from the transport.
    ///
    /// An empty buffer marks end of stream and is a no-op. A leading RIFF
    /// header updates the sticky format and is stripped; everything else
    /// is raw PCM16 LE at the last-known format.
    pub fn handle_received_audio(&mut self, buf: &[u8]) {
        if buf.is_empty() {
            debug!("end-of-stream marker");
            self.flush_converter();
            return;
        }
        if !self.initialised {
            self.initialize_playback();
        }

        let payload = match parse_wav_header(buf) {
            Some((format, rest)) => {
                if format != self.format {
                    info!(
                        channels = format.channels,
                        sample_rate = format.sample_rate,
                        "stream format changed"
                    );
                    self.format = format;
                }
                rest
            }
            None => buf,
        };
        if payload.is_empty() {
            return;
        }

        let interleaved = pcm::i16_to_f32(&pcm::le_bytes_to_i16(payload));
        let mono: Vec<f32> = if self.format.channels == 1 {
            interleaved
        } else {
            let ch = self.format.channels as usize;
            interleaved
                .chunks_exact(ch)
                .map(|frame| frame.iter().sum::<f32>() / ch as f32)
                .collect()
        };
        if mono.is_empty() {
            return;
        }

        let duration = mono.len() as f64 / self.format.sample_rate as f64;
        let start = self.cursor.schedule(self.clock.now(), duration);
        self.chunks_scheduled += 1;
        debug!(
            samples = mono.len(),
            start = format_args!("{start:.3}"),
            "chunk scheduled"
        );

        self.enqueue(&mono);
    }

    fn enqueue(&mut self, mono: &[f32]) {
        if self.ring.is_none() {
            // Analyser-only mode: no sink, feed the level estimate directly.
            self.analyser.push(mono);
            return;
        }
        let sink_rate = self.sink_rate();
        let source_rate = self.format.sample_rate;

        if self.converter_rates != (source_rate, sink_rate) {
            match RateConverter::new(source_rate, sink_rate, 512) {
                Ok(conv) => {
                    self.converter = Some(conv);
                    self.converter_rates = (source_rate, sink_rate);
                }
                Err(e) => {
                    warn!("resampler init failed: {e}");
                    return;
                }
            }
        }

        let converter = match self.converter.as_mut() {
            Some(c) => c,
            None => return,
        };
        // The block remainder stays buffered in the converter so chunk
        // boundaries stay seamless; flush_converter handles end of stream.
        let out = converter.process(mono);
        self.push_to_ring(&out);
    }

    /// Pad and flush the resampler's partial block into the ring. Only
    /// correct at end of stream; mid-stream it would insert silence.
    fn flush_converter(&mut self) {
        let tail = match self.converter.as_mut() {
            Some(c) => c.drain(),
            None => return,
        };
        self.push_to_ring(&tail);
    }

    fn push_to_ring(&mut self, out: &[f32]) {
        if out.is_empty() {
            return;
        }
        if let Some(ring) = self.ring.as_mut() {
            let written = ring.push_slice(out);
            if written < out.len() {
                warn!("playback ring full: dropped {} samples", out.len() - written);
            }
        }
    }

    #[cfg(feature = "audio-cpal")]
    fn sink_rate(&self) -> u32 {
        self.sink
            .as_ref()
            .map(|s| s.sample_rate)
            .unwrap_or(self.format.sample_rate)
    }

    #[cfg(not(feature = "audio-cpal"))]
    fn sink_rate(&self) -> u32 {
        self.format.sample_rate
    }

    /// Current output level in [0, 1] for lip sync. 0.0 before
    /// `initialize_playback`.
    pub fn rms(&mut self) -> f32 {
        if !self.initialised {
            return 0.0;
        }
        if let Some(tap) = self.tap.as_mut() {
            let mut buf = [0f32; 256];
            loop {
                let n = tap.pop_slice(&mut buf);
                if n == 0 {
                    break;
                }
                self.analyser.push(&buf[..n]);
            }
        }
        self.analyser.rms()
    }

    /// True while scheduled audio has not yet finished.
    pub fn is_playing(&self) -> bool {
        self.cursor.is_playing(self.clock.now())
    }

    /// Sticky format currently applied to headerless chunks.
    pub fn format(&self) -> StreamFormat {
        self.format
    }

    pub fn chunks_scheduled(&self) -> u64 {
        self.chunks_scheduled
    }

    /// Drop the output stream and clear all queued audio and state.
    /// Safe to call twice.
    pub fn dispose(&mut self) {
        #[cfg(feature = "audio-cpal")]
        {
            self.sink = None;
        }
        self.ring = None;
        self.tap = None;
        self.converter = None;
        self.converter_rates = (0, 0);
        self.cursor.reset();
        self.analyser.reset();
        self.format = StreamFormat::from_config(&self.config);
        if self.initialised {
            info!("playback disposed");
        }
        self.initialised = false;
    }
}
