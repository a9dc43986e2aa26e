//! Blocking capture pipeline.
//!
//! ## Pipeline stages (per iteration)
//!
//! ```text
//! 1. Drain ring buffer → &[f32] (one block per iteration)
//! 2. Resample to the uplink rate (passthrough when rates match)
//! 3. VAD + transmit gate update
//! 4. FrameAssembler accumulates into fixed-length frames
//! 5. For each full frame that passes the gate:
//!    f32 → i16 → little-endian bytes → mpsc to the transport
//! 6. Broadcast ActivityEvent (rms + voice flag)
//! ```
//!
//! The loop runs in `spawn_blocking`, keeping the Tokio executor free for
//! the websocket transport. Frames are pushed with `try_send`; when the
//! transport channel is full the frame is dropped rather than stalling
//! the audio path.

use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Arc,
};

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::{
    audio::{pcm, resample::RateConverter, MicCapture},
    buffering::{create_capture_ring, AudioConsumer, Consumer},
    config::CaptureConfig,
    error::{Result, VultusError},
    events::ActivityEvent,
    vad::{EnergyVad, TransmitGate, VoiceActivityDetector},
};

/// Broadcast capacity for activity events.
const BROADCAST_CAP: usize = 256;

/// Bounded depth of the frame channel toward the transport.
const FRAME_CHANNEL_CAP: usize = 16;

/// Block size drained from the ring per iteration.
/// 20 ms at 48 kHz = 960 samples; a reasonable VAD stride for most rates.
const DRAIN_BLOCK: usize = 960;

/// Sleep when the ring is empty (avoids busy-wait burning a core).
const SLEEP_EMPTY_MS: u64 = 5;

/// Accumulates arbitrary-length sample runs into exact fixed-length frames.
///
/// Frames are cut purely by sample count. No frame is ever emitted short,
/// and no sample is ever dropped; a partial tail waits for the next push.
pub struct FrameAssembler {
    frame_len: usize,
    pending: Vec<f32>,
}

impl FrameAssembler {
    pub fn new(frame_len: usize) -> Self {
        Self {
            frame_len,
            pending: Vec::with_capacity(frame_len * 2),
        }
    }

    /// Append samples and return every complete frame now available.
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        self.pending.extend_from_slice(samples);

        let mut frames = Vec::new();
        while self.pending.len() >= self.frame_len {
            let rest = self.pending.split_off(self.frame_len);
            frames.push(std::mem::replace(&mut self.pending, rest));
        }
        frames
    }

    /// Samples buffered but not yet emitted.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Live VAD/gate settings shared with the running capture loop.
///
/// The f32 values travel as raw bits through `AtomicU32` so the loop can
/// pick up changes each iteration without locking; an update takes effect
/// on the next evaluated block.
pub struct FilterControls {
    vad_threshold: AtomicU32,
    noise_gate: AtomicU32,
    gate_enabled: AtomicBool,
}

impl FilterControls {
    fn new(config: &CaptureConfig) -> Self {
        Self {
            vad_threshold: AtomicU32::new(config.vad_threshold.to_bits()),
            noise_gate: AtomicU32::new(config.noise_gate.to_bits()),
            gate_enabled: AtomicBool::new(config.gate_enabled),
        }
    }

    pub fn set_vad_threshold(&self, value: f32) {
        self.vad_threshold.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn set_noise_gate(&self, value: f32) {
        self.noise_gate.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn set_gate_enabled(&self, enabled: bool) {
        self.gate_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn vad_threshold(&self) -> f32 {
        f32::from_bits(self.vad_threshold.load(Ordering::Relaxed))
    }

    pub fn noise_gate(&self) -> f32 {
        f32::from_bits(self.noise_gate.load(Ordering::Relaxed))
    }

    pub fn gate_enabled(&self) -> bool {
        self.gate_enabled.load(Ordering::Relaxed)
    }
}

/// All context the capture loop needs, passed as one struct so the closure
/// stays tidy.
pub struct CaptureContext {
    pub config: CaptureConfig,
    pub consumer: AudioConsumer,
    pub running: Arc<AtomicBool>,
    pub controls: Arc<FilterControls>,
    pub frame_tx: mpsc::Sender<Vec<u8>>,
    pub activity_tx: broadcast::Sender<ActivityEvent>,
    pub capture_sample_rate: u32,
}

/// Run the blocking capture loop until `ctx.running` becomes false.
pub fn run(mut ctx: CaptureContext) {
    info!("capture pipeline started");

    let mut resampler = match RateConverter::new(
        ctx.capture_sample_rate,
        ctx.config.target_sample_rate,
        DRAIN_BLOCK,
    ) {
        Ok(r) => r,
        Err(e) => {
            error!("failed to create resampler: {e}");
            return;
        }
    };

    if !resampler.is_passthrough() {
        info!(
            "resampling enabled from={} to={}",
            ctx.capture_sample_rate, ctx.config.target_sample_rate
        );
    }

    let mut vad = EnergyVad::new(ctx.controls.vad_threshold(), ctx.config.vad_hangover_blocks);
    let mut gate = TransmitGate::new(ctx.controls.noise_gate(), ctx.controls.gate_enabled());
    let mut assembler = FrameAssembler::new(ctx.config.frame_len);

    // Scratch buffer, reused each iteration
    let mut raw = vec![0f32; DRAIN_BLOCK];
    let mut activity_seq = 0u64;
    let mut frames_sent = 0usize;
    let mut frames_dropped = 0usize;
    let mut frames_gated = 0usize;

    loop {
        if !ctx.running.load(Ordering::Relaxed) {
            break;
        }

        let n = ctx.consumer.pop_slice(&mut raw);
        if n == 0 {
            std::thread::sleep(std::time::Duration::from_millis(SLEEP_EMPTY_MS));
            continue;
        }

        let resampled = resampler.process(&raw[..n]);
        if resampled.is_empty() {
            // Partial block — rubato is waiting for more input
            continue;
        }

        // Pick up live threshold changes before evaluating the block.
        vad.set_threshold(ctx.controls.vad_threshold());
        gate.set_filter_config(
            Some(ctx.controls.noise_gate()),
            Some(ctx.controls.gate_enabled()),
        );

        let decision = vad.process(&resampled);
        let admit = gate.admit(decision);

        let _ = ctx.activity_tx.send(ActivityEvent {
            seq: activity_seq,
            rms: decision.energy,
            is_voice: decision.voice_active,
        });
        activity_seq = activity_seq.saturating_add(1);

        if activity_seq % 50 == 0 {
            debug!(
                rms = format_args!("{:.4}", decision.energy),
                voice = decision.voice_active,
                pending = assembler.pending_len(),
                "audio level check"
            );
        }

        for frame in assembler.push(&resampled) {
            if !admit {
                frames_gated += 1;
                continue;
            }
            let bytes = pcm::i16_to_le_bytes(&pcm::f32_to_i16(&frame));
            match ctx.frame_tx.try_send(bytes) {
                Ok(()) => frames_sent += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    frames_dropped += 1;
                    if frames_dropped % 32 == 1 {
                        warn!(frames_dropped, "transport backlog full, dropping frames");
                    }
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    info!("frame channel closed, stopping capture loop");
                    ctx.running.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }
    }

    info!(
        frames_sent,
        frames_gated, frames_dropped, "capture pipeline stopped"
    );
}

/// Capture lifecycle controller.
///
/// `CapturePipeline` is `Send + Sync` — all fields use interior mutability
/// or Arc-wrapped state. The `cpal::Stream` never leaves the blocking
/// thread it is created on.
pub struct CapturePipeline {
    config: CaptureConfig,
    running: Arc<AtomicBool>,
    controls: Arc<FilterControls>,
    activity_tx: broadcast::Sender<ActivityEvent>,
}

impl CapturePipeline {
    pub fn new(config: CaptureConfig) -> Self {
        let (activity_tx, _) = broadcast::channel(BROADCAST_CAP);
        let controls = Arc::new(FilterControls::new(&config));
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            controls,
            activity_tx,
        }
    }

    /// Adjust VAD/gate settings while capture runs. `None` leaves a field
    /// unchanged; the loop applies the change on its next block.
    pub fn set_filter_config(
        &self,
        vad_threshold: Option<f32>,
        noise_gate: Option<f32>,
        gate_enabled: Option<bool>,
    ) {
        if let Some(v) = vad_threshold {
            self.controls.set_vad_threshold(v);
        }
        if let Some(g) = noise_gate {
            self.controls.set_noise_gate(g);
        }
        if let Some(e) = gate_enabled {
            self.controls.set_gate_enabled(e);
        }
    }

    /// Open the microphone and start the pipeline.
    ///
    /// Returns immediately — the device opens on a background blocking
    /// thread, which reports success (with the capture sample rate) or a
    /// device error on the confirmation channel. On failure the frame
    /// channel simply closes and the pipeline stops running.
    ///
    /// # Errors
    /// - `VultusError::AlreadyRunning` if already started. Device errors
    ///   (`PermissionDenied`, `NoDefaultInputDevice`, `AudioDevice`,
    ///   `AudioStream`) arrive on the confirmation channel instead.
    pub fn start(&self) -> Result<(mpsc::Receiver<Vec<u8>>, oneshot::Receiver<Result<u32>>)> {
        if self.running.load(Ordering::SeqCst) {
            return Err(VultusError::AlreadyRunning);
        }
        self.running.store(true, Ordering::SeqCst);

        let (producer, consumer) = create_capture_ring();
        let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_CAP);

        let config = self.config.clone();
        let running = Arc::clone(&self.running);
        let controls = Arc::clone(&self.controls);
        let activity_tx = self.activity_tx.clone();

        // The blocking thread signals open success/failure without the
        // caller having to wait for the device.
        let (open_tx, open_rx) = oneshot::channel::<Result<u32>>();

        tokio::task::spawn_blocking(move || {
            // Device must open on THIS thread — cpal::Stream is !Send.
            let capture = match MicCapture::open(
                producer,
                Arc::clone(&running),
                config.preferred_input_device.as_deref(),
            ) {
                Ok(c) => {
                    let _ = open_tx.send(Ok(c.sample_rate));
                    c
                }
                Err(e) => {
                    let _ = open_tx.send(Err(e));
                    running.store(false, Ordering::SeqCst);
                    return;
                }
            };

            let capture_sample_rate = capture.sample_rate;

            run(CaptureContext {
                config,
                consumer,
                running,
                controls,
                frame_tx,
                activity_tx,
                capture_sample_rate,
            });

            capture.stop();
            // Stream drops here, releasing the device on this thread.
            drop(capture);
        });

        Ok((frame_rx, open_rx))
    }

    /// Request the pipeline to stop. Idempotent — stopping an idle
    /// pipeline is a no-op.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("capture stop requested");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Subscribe to live voice activity events (RMS + voice flag).
    pub fn subscribe_activity(&self) -> broadcast::Receiver<ActivityEvent> {
        self.activity_tx.subscribe()
    }
}
