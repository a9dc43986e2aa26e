//! Lock-free SPSC ring buffers for audio samples.
//!
//! Two rings exist per session: the capture ring (cpal input callback →
//! capture pipeline) and the playback ring (scheduler → cpal output
//! callback). Both use `ringbuf::HeapRb<f32>` whose `push_slice` /
//! `pop_slice` are wait-free and allocation-free, safe on the RT threads.

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Observer, Producer};

/// Producer half — held by whichever side feeds samples in.
pub type AudioProducer = ringbuf::HeapProd<f32>;

/// Consumer half — held by whichever side drains samples out.
pub type AudioConsumer = ringbuf::HeapCons<f32>;

/// Capture ring capacity: 2^18 = 262 144 f32 samples ≈ 5.5 s at 48 kHz.
/// The capture pipeline drains every few milliseconds, so this only needs
/// to absorb scheduling hiccups, not whole utterances.
pub const CAPTURE_RING_CAPACITY: usize = 1 << 18;

/// Playback ring capacity: 2^20 = 1 048 576 f32 samples ≈ 21.8 s at 48 kHz.
/// Inbound chunks can arrive much faster than real time and must queue
/// without back-pressure onto the network reader.
pub const PLAYBACK_RING_CAPACITY: usize = 1 << 20;

/// Create the capture-side producer/consumer pair.
pub fn create_capture_ring() -> (AudioProducer, AudioConsumer) {
    HeapRb::<f32>::new(CAPTURE_RING_CAPACITY).split()
}

/// Create the playback-side producer/consumer pair.
pub fn create_playback_ring() -> (AudioProducer, AudioConsumer) {
    HeapRb::<f32>::new(PLAYBACK_RING_CAPACITY).split()
}

/// Tap ring capacity: the output callback copies played samples here for
/// the level analyser. Only the most recent fraction of a second matters,
/// but the ring must ride out slow `rms()` polls.
pub const TAP_RING_CAPACITY: usize = 1 << 15;

/// Create the analyser tap producer/consumer pair.
pub fn create_tap_ring() -> (AudioProducer, AudioConsumer) {
    HeapRb::<f32>::new(TAP_RING_CAPACITY).split()
}
