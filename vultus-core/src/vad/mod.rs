//! Voice activity detection and the transmit gate.
//!
//! The detector decides whether a block of samples contains speech; the
//! [`TransmitGate`] layers a rolling-energy noise gate on top so isolated
//! clicks above the VAD threshold do not open the uplink.

pub mod energy;

pub use energy::EnergyVad;

/// Outcome of running VAD over one block of samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadDecision {
    /// True when the block is judged to contain speech.
    pub voice_active: bool,
    /// RMS energy of the block, in [0, 1] for full-scale f32 input.
    pub energy: f32,
}

/// A voice activity detector over mono f32 sample blocks.
pub trait VoiceActivityDetector: Send {
    /// Analyse one block and return the speech decision for it.
    fn process(&mut self, samples: &[f32]) -> VadDecision;

    /// Reset internal state (hangover counters, smoothing).
    fn reset(&mut self);
}

/// Number of recent block energies averaged by the noise gate.
const ENERGY_HISTORY_LEN: usize = 10;

/// Decides whether a frame should be sent upstream.
///
/// A frame is transmitted only when the detector reports voice activity
/// AND the average energy over the last [`ENERGY_HISTORY_LEN`] blocks
/// exceeds the noise gate floor. With the gate disabled every frame
/// passes.
pub struct TransmitGate {
    noise_gate: f32,
    enabled: bool,
    history: [f32; ENERGY_HISTORY_LEN],
    filled: usize,
    next: usize,
}

impl TransmitGate {
    pub fn new(noise_gate: f32, enabled: bool) -> Self {
        Self {
            noise_gate,
            enabled,
            history: [0.0; ENERGY_HISTORY_LEN],
            filled: 0,
            next: 0,
        }
    }

    /// Record one block's energy and decide whether the uplink opens.
    pub fn admit(&mut self, decision: VadDecision) -> bool {
        self.history[self.next] = decision.energy;
        self.next = (self.next + 1) % ENERGY_HISTORY_LEN;
        self.filled = (self.filled + 1).min(ENERGY_HISTORY_LEN);

        if !self.enabled {
            return true;
        }
        decision.voice_active && self.average_energy() > self.noise_gate
    }

    /// Average energy over the recorded history (0 when nothing recorded).
    pub fn average_energy(&self) -> f32 {
        if self.filled == 0 {
            return 0.0;
        }
        self.history[..self.filled].iter().sum::<f32>() / self.filled as f32
    }

    /// Adjust the gate at runtime. `None` leaves a field unchanged.
    pub fn set_filter_config(&mut self, noise_gate: Option<f32>, enabled: Option<bool>) {
        if let Some(g) = noise_gate {
            self.noise_gate = g;
        }
        if let Some(e) = enabled {
            self.enabled = e;
        }
    }

    pub fn reset(&mut self) {
        self.history = [0.0; ENERGY_HISTORY_LEN];
        self.filled = 0;
        self.next = 0;
    }
}
