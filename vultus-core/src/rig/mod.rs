//! The rig: whatever actually owns the avatar's parameters and motions.
//!
//! The animation layer never touches parameter names at runtime — it
//! resolves each name to a [`ParamHandle`] once, up front, and fails loudly
//! on a name the rig does not know. Everything per-frame is index-based.

#[cfg(test)]
pub(crate) mod fake;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Opaque index of one rig parameter, valid for the rig that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamHandle(pub u32);

/// Priority a motion starts with; higher interrupts lower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionPriority {
    None = 0,
    Idle = 1,
    Normal = 2,
    Force = 3,
}

/// Well-known parameter names the animator drives directly.
pub mod params {
    pub const ANGLE_X: &str = "ParamAngleX";
    pub const ANGLE_Y: &str = "ParamAngleY";
    pub const ANGLE_Z: &str = "ParamAngleZ";
    pub const BODY_ANGLE_X: &str = "ParamBodyAngleX";
    pub const EYE_BALL_X: &str = "ParamEyeBallX";
    pub const EYE_BALL_Y: &str = "ParamEyeBallY";
    pub const EYE_L_OPEN: &str = "ParamEyeLOpen";
    pub const EYE_R_OPEN: &str = "ParamEyeROpen";
    pub const MOUTH_OPEN_Y: &str = "ParamMouthOpenY";
    pub const JAW_OPEN: &str = "ParamJawOpen";
}

/// An avatar parameter/motion backend.
///
/// Implementations are expected to be cheap per call — the animator makes
/// O(tracked parameters) calls every frame.
pub trait Rig {
    /// Resolve a parameter name to a handle.
    ///
    /// # Errors
    /// `VultusError::UnknownParameter` when the rig has no such parameter.
    fn parameter_handle(&self, name: &str) -> Result<ParamHandle>;

    /// Current value of a parameter.
    fn value(&self, handle: ParamHandle) -> f32;

    /// Set a parameter, blended by `weight` in [0, 1] against the current
    /// value (1.0 overwrites).
    fn set_value(&mut self, handle: ParamHandle, value: f32, weight: f32);

    /// Add to a parameter's current value.
    fn add_value(&mut self, handle: ParamHandle, value: f32);

    /// Begin a motion from `group` at `index`.
    fn start_motion(&mut self, group: &str, index: u32, priority: MotionPriority);

    /// True when no motion is playing (or the current one finished).
    fn motion_finished(&self) -> bool;

    /// Switch to a named expression.
    fn set_expression(&mut self, id: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering_matches_interrupt_rules() {
        assert!(MotionPriority::Force > MotionPriority::Normal);
        assert!(MotionPriority::Normal > MotionPriority::Idle);
        assert!(MotionPriority::Idle > MotionPriority::None);
    }

    #[test]
    fn priority_serialises_lowercase() {
        let json = serde_json::to_value(MotionPriority::Force).unwrap();
        assert_eq!(json, "force");
        let p: MotionPriority = serde_json::from_value(json).unwrap();
        assert_eq!(p, MotionPriority::Force);
    }
}
