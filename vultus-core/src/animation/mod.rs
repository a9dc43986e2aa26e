//! Per-frame avatar animation.
//!
//! [`AvatarAnimator`] owns the transition engine, blink controller and
//! lip-sync source and applies them to the rig in a fixed order each tick:
//!
//! 1. drag-follow offsets (additive)
//! 2. parameter transitions (eased writes)
//! 3. blink closure (subtracted from the eye-open parameters)
//! 4. lip-sync amplitude (added to the mouth parameters)
//!
//! Everything is synchronous and O(tracked parameters); the session calls
//! `tick` from its single animation thread.

pub mod blink;
pub mod lipsync;
pub mod transition;

pub use blink::{BlinkController, BlinkPhase};
pub use lipsync::LipSync;
pub use transition::TransitionEngine;

use rand::rngs::SmallRng;
use rand::Rng;
use tracing::debug;

use crate::rig::{params, ParamHandle, Rig};

/// Head follows the drag point strongly, body slightly, eyes exactly.
const DRAG_HEAD_GAIN: f32 = 30.0;
const DRAG_HEAD_Z_GAIN: f32 = -30.0;
const DRAG_BODY_GAIN: f32 = 10.0;

/// Built-in parameters, resolved once at construction. A rig without one
/// of them simply skips that effect.
struct Handles {
    angle_x: Option<ParamHandle>,
    angle_y: Option<ParamHandle>,
    angle_z: Option<ParamHandle>,
    body_angle_x: Option<ParamHandle>,
    eye_ball_x: Option<ParamHandle>,
    eye_ball_y: Option<ParamHandle>,
    eye_l_open: Option<ParamHandle>,
    eye_r_open: Option<ParamHandle>,
    jaw_open: Option<ParamHandle>,
    mouth: Vec<ParamHandle>,
}

fn resolve(rig: &dyn Rig, name: &str) -> Option<ParamHandle> {
    match rig.parameter_handle(name) {
        Ok(h) => Some(h),
        Err(_) => {
            debug!(name, "rig lacks parameter, effect disabled");
            None
        }
    }
}

/// Drives all continuous animation against one rig.
pub struct AvatarAnimator<R: Rng = SmallRng> {
    transitions: TransitionEngine,
    blink: BlinkController<R>,
    lipsync: LipSync,
    handles: Handles,
    drag: (f32, f32),
}

impl AvatarAnimator<SmallRng> {
    /// Resolve built-in parameters against `rig` and assemble the default
    /// animator. `mouth_params` lists the lip-sync parameter names the
    /// character declares (`ParamMouthOpenY` alone for most).
    pub fn new(rig: &dyn Rig, transition_rate: f32, mouth_params: &[String], lipsync: LipSync) -> Self {
        Self::with_blink(rig, transition_rate, mouth_params, lipsync, BlinkController::new())
    }
}

impl<R: Rng> AvatarAnimator<R> {
    pub fn with_blink(
        rig: &dyn Rig,
        transition_rate: f32,
        mouth_params: &[String],
        lipsync: LipSync,
        blink: BlinkController<R>,
    ) -> Self {
        let mouth = mouth_params
            .iter()
            .filter_map(|name| resolve(rig, name))
            .collect();

        let handles = Handles {
            angle_x: resolve(rig, params::ANGLE_X),
            angle_y: resolve(rig, params::ANGLE_Y),
            angle_z: resolve(rig, params::ANGLE_Z),
            body_angle_x: resolve(rig, params::BODY_ANGLE_X),
            eye_ball_x: resolve(rig, params::EYE_BALL_X),
            eye_ball_y: resolve(rig, params::EYE_BALL_Y),
            eye_l_open: resolve(rig, params::EYE_L_OPEN),
            eye_r_open: resolve(rig, params::EYE_R_OPEN),
            jaw_open: resolve(rig, params::JAW_OPEN),
            mouth,
        };

        Self {
            transitions: TransitionEngine::new(transition_rate),
            blink,
            lipsync,
            handles,
            drag: (0.0, 0.0),
        }
    }

    /// Update the drag-follow point, each axis in [-1, 1].
    pub fn set_drag(&mut self, x: f32, y: f32) {
        self.drag = (x.clamp(-1.0, 1.0), y.clamp(-1.0, 1.0));
    }

    /// The emotion layer steers parameters through this engine.
    pub fn transitions_mut(&mut self) -> &mut TransitionEngine {
        &mut self.transitions
    }

    pub fn transitions(&self) -> &TransitionEngine {
        &self.transitions
    }

    /// Run one frame. `lip_external` is the live playback level, if any.
    pub fn tick(&mut self, dt: f64, rig: &mut dyn Rig, lip_external: Option<f32>) {
        // 1. Drag follow (additive, on top of whatever motions wrote)
        let (dx, dy) = self.drag;
        if dx != 0.0 || dy != 0.0 {
            if let Some(h) = self.handles.angle_x {
                rig.add_value(h, dx * DRAG_HEAD_GAIN);
            }
            if let Some(h) = self.handles.angle_y {
                rig.add_value(h, dy * DRAG_HEAD_GAIN);
            }
            if let Some(h) = self.handles.angle_z {
                rig.add_value(h, dx * dy * DRAG_HEAD_Z_GAIN);
            }
            if let Some(h) = self.handles.body_angle_x {
                rig.add_value(h, dx * DRAG_BODY_GAIN);
            }
            if let Some(h) = self.handles.eye_ball_x {
                rig.add_value(h, dx);
            }
            if let Some(h) = self.handles.eye_ball_y {
                rig.add_value(h, dy);
            }
        }

        // 2. Eased parameter transitions
        self.transitions.advance(dt as f32, rig);

        // 3. Blink, subtracted so a closing lid wins over expressions
        let closure = self.blink.advance(dt);
        if closure > 0.0 {
            if let Some(h) = self.handles.eye_l_open {
                rig.add_value(h, -closure);
            }
            if let Some(h) = self.handles.eye_r_open {
                rig.add_value(h, -closure);
            }
        }

        // 4. Mouth
        let amplitude = self.lipsync.amplitude(lip_external, dt);
        if amplitude > 0.0 {
            for &h in &self.handles.mouth {
                rig.add_value(h, amplitude);
            }
            if let Some(h) = self.handles.jaw_open {
                rig.add_value(h, amplitude);
            }
        }
    }
}
