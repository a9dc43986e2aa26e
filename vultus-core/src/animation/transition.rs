//! Smooth parameter transitions.
//!
//! Each tracked parameter eases toward its target with exponential decay:
//! `current += (target - current) * min(1, rate * dt)`. Targets never jump
//! the parameter; only `hard_reset()` discards state instantly.

use std::collections::HashMap;

use tracing::debug;

use crate::rig::{ParamHandle, Rig};

/// A parameter settles and is dropped once its target is zero and the
/// residual is below this.
const SETTLE_EPSILON: f32 = 0.01;

/// Lowest permitted rate; anything slower is effectively frozen.
const MIN_RATE: f32 = 0.1;

#[derive(Debug, Clone, Copy)]
struct Transition {
    current: f32,
    target: f32,
}

/// Eases a set of rig parameters toward their targets each frame.
pub struct TransitionEngine {
    transitions: HashMap<ParamHandle, Transition>,
    rate: f32,
}

impl TransitionEngine {
    pub fn new(rate: f32) -> Self {
        Self {
            transitions: HashMap::new(),
            rate: rate.max(MIN_RATE),
        }
    }

    /// Steer a parameter toward `target`.
    ///
    /// On first contact the ease starts from the rig's live value, so a
    /// parameter mid-motion never snaps.
    pub fn set_target(&mut self, handle: ParamHandle, target: f32, rig: &dyn Rig) {
        self.transitions
            .entry(handle)
            .and_modify(|t| t.target = target)
            .or_insert_with(|| Transition {
                current: rig.value(handle),
                target,
            });
    }

    /// Advance every transition by `dt` seconds and write results to the
    /// rig. Settled parameters (target zero, residual below epsilon) are
    /// dropped from tracking.
    pub fn advance(&mut self, dt: f32, rig: &mut dyn Rig) {
        if self.transitions.is_empty() {
            return;
        }
        let factor = (self.rate * dt).min(1.0);

        self.transitions.retain(|handle, t| {
            t.current += (t.target - t.current) * factor;
            rig.set_value(*handle, t.current, 1.0);
            !(t.target == 0.0 && t.current.abs() < SETTLE_EPSILON)
        });
    }

    /// Ease every tracked parameter back to zero.
    pub fn reset_all_to_neutral(&mut self) {
        for t in self.transitions.values_mut() {
            t.target = 0.0;
        }
    }

    /// Drop all state instantly. Used when the character itself changes
    /// and old handles stop being meaningful.
    pub fn hard_reset(&mut self) {
        if !self.transitions.is_empty() {
            debug!(dropped = self.transitions.len(), "transition hard reset");
        }
        self.transitions.clear();
    }

    /// Change the ease rate. Clamped to at least 0.1.
    pub fn set_rate(&mut self, rate: f32) {
        self.rate = rate.max(MIN_RATE);
    }

    pub fn tracked(&self) -> usize {
        self.transitions.len()
    }

    /// Current eased value of a tracked parameter, if any.
    pub fn current(&self, handle: ParamHandle) -> Option<f32> {
        self.transitions.get(&handle).map(|t| t.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rig::fake::FakeRig;
    use approx::assert_relative_eq;

    #[test]
    fn eases_toward_target_without_overshoot() {
        let mut rig = FakeRig::new(&["ParamA"]);
        let handle = rig.handle("ParamA");
        let mut engine = TransitionEngine::new(5.0);

        engine.set_target(handle, 1.0, &rig);
        let mut last = 0.0;
        for _ in 0..60 {
            engine.advance(1.0 / 60.0, &mut rig);
            let v = rig.value_of("ParamA");
            assert!(v >= last, "must approach monotonically");
            assert!(v <= 1.0, "must not overshoot");
            last = v;
        }
        // Exponential ease at rate 5 covers most of the gap within 1 s.
        assert!(last > 0.95, "got {last}");
    }

    #[test]
    fn large_dt_clamps_factor_to_one() {
        let mut rig = FakeRig::new(&["ParamA"]);
        let handle = rig.handle("ParamA");
        let mut engine = TransitionEngine::new(5.0);

        engine.set_target(handle, 0.8, &rig);
        // A 2 s stall must land exactly on target, not beyond it.
        engine.advance(2.0, &mut rig);
        assert_relative_eq!(rig.value_of("ParamA"), 0.8);
    }

    #[test]
    fn first_contact_starts_from_live_rig_value() {
        let mut rig = FakeRig::new(&["ParamA"]);
        let handle = rig.handle("ParamA");
        rig.set_value(handle, 0.5, 1.0);

        let mut engine = TransitionEngine::new(5.0);
        engine.set_target(handle, 1.0, &rig);
        engine.advance(0.01, &mut rig);

        let v = rig.value_of("ParamA");
        assert!(v > 0.5 && v < 0.55, "ease starts at 0.5, got {v}");
    }

    #[test]
    fn settled_zero_target_is_dropped() {
        let mut rig = FakeRig::new(&["ParamA"]);
        let handle = rig.handle("ParamA");
        let mut engine = TransitionEngine::new(5.0);

        engine.set_target(handle, 1.0, &rig);
        engine.advance(1.0, &mut rig);
        engine.set_target(handle, 0.0, &rig);
        for _ in 0..300 {
            engine.advance(1.0 / 60.0, &mut rig);
        }
        assert_eq!(engine.tracked(), 0);
        assert!(rig.value_of("ParamA").abs() < SETTLE_EPSILON);
    }

    #[test]
    fn nonzero_target_stays_tracked() {
        let mut rig = FakeRig::new(&["ParamA"]);
        let handle = rig.handle("ParamA");
        let mut engine = TransitionEngine::new(5.0);

        engine.set_target(handle, 0.3, &rig);
        for _ in 0..300 {
            engine.advance(1.0 / 60.0, &mut rig);
        }
        assert_eq!(engine.tracked(), 1);
        assert!((rig.value_of("ParamA") - 0.3).abs() < 1e-3);
    }

    #[test]
    fn reset_all_to_neutral_eases_back() {
        let mut rig = FakeRig::new(&["ParamA", "ParamB"]);
        let a = rig.handle("ParamA");
        let b = rig.handle("ParamB");
        let mut engine = TransitionEngine::new(5.0);

        engine.set_target(a, 1.0, &rig);
        engine.set_target(b, -0.6, &rig);
        engine.advance(1.0, &mut rig);

        engine.reset_all_to_neutral();
        // First frame after reset still moves smoothly, not a snap.
        engine.advance(1.0 / 60.0, &mut rig);
        assert!(rig.value_of("ParamA") > 0.5);

        for _ in 0..300 {
            engine.advance(1.0 / 60.0, &mut rig);
        }
        assert_eq!(engine.tracked(), 0);
    }

    #[test]
    fn hard_reset_clears_immediately() {
        let mut rig = FakeRig::new(&["ParamA"]);
        let handle = rig.handle("ParamA");
        let mut engine = TransitionEngine::new(5.0);

        engine.set_target(handle, 1.0, &rig);
        engine.advance(0.1, &mut rig);
        engine.hard_reset();
        assert_eq!(engine.tracked(), 0);
        // Rig keeps whatever value it last had; nothing is written anymore.
        let before = rig.value_of("ParamA");
        engine.advance(1.0, &mut rig);
        assert_relative_eq!(rig.value_of("ParamA"), before);
    }

    #[test]
    fn rate_clamps_at_minimum() {
        let mut rig = FakeRig::new(&["ParamA"]);
        let handle = rig.handle("ParamA");
        let mut engine = TransitionEngine::new(0.0);
        engine.set_rate(-3.0);

        engine.set_target(handle, 1.0, &rig);
        engine.advance(1.0, &mut rig);
        // Even fully clamped down, the parameter still moves.
        assert!(rig.value_of("ParamA") > 0.0);
    }
}
