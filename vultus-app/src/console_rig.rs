//! In-memory rig for running the session without a renderer.
//!
//! Holds a flat parameter table and logs motion and expression requests.
//! Useful for protocol debugging against a live server: the animation
//! layer runs for real, the parameter writes just land here.

use std::time::{Duration, Instant};

use tracing::{debug, info};
use vultus_core::rig::params;
use vultus_core::{MotionPriority, ParamHandle, Rig, VultusError};

/// How long a "playing" motion blocks the next resolution pass.
const MOTION_HOLD: Duration = Duration::from_secs(3);

pub struct ConsoleRig {
    names: Vec<String>,
    values: Vec<f32>,
    motion_until: Option<Instant>,
}

impl ConsoleRig {
    /// A rig with the built-in parameter set every character carries.
    pub fn new() -> Self {
        let names: Vec<String> = [
            params::ANGLE_X,
            params::ANGLE_Y,
            params::ANGLE_Z,
            params::BODY_ANGLE_X,
            params::EYE_BALL_X,
            params::EYE_BALL_Y,
            params::EYE_L_OPEN,
            params::EYE_R_OPEN,
            params::MOUTH_OPEN_Y,
            params::JAW_OPEN,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let values = names
            .iter()
            .map(|n| {
                if n == params::EYE_L_OPEN || n == params::EYE_R_OPEN {
                    1.0
                } else {
                    0.0
                }
            })
            .collect();
        Self {
            names,
            values,
            motion_until: None,
        }
    }
}

impl Default for ConsoleRig {
    fn default() -> Self {
        Self::new()
    }
}

impl Rig for ConsoleRig {
    fn parameter_handle(&self, name: &str) -> vultus_core::Result<ParamHandle> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| ParamHandle(i as u32))
            .ok_or_else(|| VultusError::UnknownParameter {
                name: name.to_string(),
            })
    }

    fn value(&self, handle: ParamHandle) -> f32 {
        self.values.get(handle.0 as usize).copied().unwrap_or(0.0)
    }

    fn set_value(&mut self, handle: ParamHandle, value: f32, weight: f32) {
        if let Some(slot) = self.values.get_mut(handle.0 as usize) {
            *slot = *slot * (1.0 - weight) + value * weight;
        }
    }

    fn add_value(&mut self, handle: ParamHandle, value: f32) {
        if let Some(slot) = self.values.get_mut(handle.0 as usize) {
            *slot += value;
        }
    }

    fn start_motion(&mut self, group: &str, index: u32, priority: MotionPriority) {
        info!(group, index, ?priority, "motion started");
        self.motion_until = Some(Instant::now() + MOTION_HOLD);
    }

    fn motion_finished(&self) -> bool {
        match self.motion_until {
            Some(until) => Instant::now() >= until,
            None => true,
        }
    }

    fn set_expression(&mut self, id: &str) {
        debug!(id, "expression set");
    }
}
