//! End-to-end animation frame loop against an in-memory rig.
//!
//! Drives the animator + dispatch layer the way a host application does:
//! fixed 30 fps ticks, an emotion change mid-stream, and a playback level
//! for the mouth. Asserts the combined parameter writes, not any single
//! stage in isolation.

use std::collections::HashMap;

use vultus_core::animation::{AvatarAnimator, BlinkController, LipSync};
use vultus_core::dispatch::{keys, resolve_current_motion, Emotion, EmotionTable, MotionMap};
use vultus_core::rig::{params, MotionPriority, ParamHandle, Rig};
use vultus_core::{Result, VultusError};

use rand::rngs::SmallRng;
use rand::SeedableRng;

/// Minimal parameter-table rig, the shape a real renderer binding has.
struct TestRig {
    names: Vec<&'static str>,
    values: Vec<f32>,
    motions: Vec<(String, u32, MotionPriority)>,
}

impl TestRig {
    fn new() -> Self {
        let names = vec![
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
            "ParamMouthForm",
            "ParamBrowLY",
        ];
        let values = names
            .iter()
            .map(|&n| {
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
            motions: Vec::new(),
        }
    }

    fn value_of(&self, name: &str) -> f32 {
        let i = self.names.iter().position(|&n| n == name).unwrap();
        self.values[i]
    }

    fn snapshot(&self) -> HashMap<&'static str, f32> {
        self.names
            .iter()
            .copied()
            .zip(self.values.iter().copied())
            .collect()
    }
}

impl Rig for TestRig {
    fn parameter_handle(&self, name: &str) -> Result<ParamHandle> {
        self.names
            .iter()
            .position(|&n| n == name)
            .map(|i| ParamHandle(i as u32))
            .ok_or_else(|| VultusError::UnknownParameter {
                name: name.to_string(),
            })
    }

    fn value(&self, handle: ParamHandle) -> f32 {
        self.values[handle.0 as usize]
    }

    fn set_value(&mut self, handle: ParamHandle, value: f32, weight: f32) {
        let slot = &mut self.values[handle.0 as usize];
        *slot = *slot * (1.0 - weight) + value * weight;
    }

    fn add_value(&mut self, handle: ParamHandle, value: f32) {
        self.values[handle.0 as usize] += value;
    }

    fn start_motion(&mut self, group: &str, index: u32, priority: MotionPriority) {
        self.motions.push((group.to_string(), index, priority));
    }

    fn motion_finished(&self) -> bool {
        true
    }

    fn set_expression(&mut self, _id: &str) {}
}

fn animator(rig: &TestRig) -> AvatarAnimator {
    AvatarAnimator::with_blink(
        rig,
        5.0,
        &[params::MOUTH_OPEN_Y.to_string()],
        LipSync::new(),
        BlinkController::with_rng(SmallRng::seed_from_u64(11)),
    )
}

const DT: f64 = 1.0 / 30.0;

#[test]
fn emotion_settles_then_neutral_returns() {
    let mut rig = TestRig::new();
    let mut anim = animator(&rig);
    let emotions = EmotionTable::from_json(
        r#"{
            "happy": [["ParamMouthForm", 1.0], ["ParamBrowLY", 0.3]],
            "neutral": []
        }"#,
    )
    .unwrap();

    emotions.apply("happy", anim.transitions_mut(), &rig);
    for _ in 0..90 {
        anim.tick(DT, &mut rig, None);
    }
    assert!(rig.value_of("ParamMouthForm") > 0.95);
    assert!((rig.value_of("ParamBrowLY") - 0.3).abs() < 0.02);

    emotions.apply("neutral", anim.transitions_mut(), &rig);
    for _ in 0..300 {
        anim.tick(DT, &mut rig, None);
    }
    assert!(rig.value_of("ParamMouthForm").abs() < 0.02);
    assert!(rig.value_of("ParamBrowLY").abs() < 0.02);
}

#[test]
fn a_blink_happens_within_the_first_four_seconds() {
    let mut rig = TestRig::new();
    let mut anim = animator(&rig);

    let mut min_eye = f32::MAX;
    for _ in 0..(4.0 / DT) as usize {
        // Eye-open parameters are reset by the renderer each frame; the
        // animator re-applies its closure on top.
        let l = rig.parameter_handle(params::EYE_L_OPEN).unwrap();
        let r = rig.parameter_handle(params::EYE_R_OPEN).unwrap();
        rig.set_value(l, 1.0, 1.0);
        rig.set_value(r, 1.0, 1.0);

        anim.tick(DT, &mut rig, None);
        min_eye = min_eye.min(rig.value_of(params::EYE_L_OPEN));
    }
    assert!(min_eye < 0.2, "blink should nearly close the eye, got {min_eye}");
}

#[test]
fn mouth_follows_playback_level_and_closes_after() {
    let mut rig = TestRig::new();
    let mut anim = animator(&rig);

    // While "audio plays", the level drives mouth and jaw additively.
    let m = rig.parameter_handle(params::MOUTH_OPEN_Y).unwrap();
    let j = rig.parameter_handle(params::JAW_OPEN).unwrap();
    for _ in 0..30 {
        rig.set_value(m, 0.0, 1.0);
        rig.set_value(j, 0.0, 1.0);
        anim.tick(DT, &mut rig, Some(0.55));
    }
    assert!((rig.value_of(params::MOUTH_OPEN_Y) - 0.55).abs() < 1e-4);
    assert!((rig.value_of(params::JAW_OPEN) - 0.55).abs() < 1e-4);

    // Stream over: no external level, no fallback configured.
    rig.set_value(m, 0.0, 1.0);
    rig.set_value(j, 0.0, 1.0);
    anim.tick(DT, &mut rig, None);
    assert_eq!(rig.value_of(params::MOUTH_OPEN_Y), 0.0);
}

#[test]
fn drag_and_emotion_compose_on_the_same_frame() {
    let mut rig = TestRig::new();
    let mut anim = animator(&rig);
    let emotions =
        EmotionTable::from_json(r#"{"happy": [["ParamMouthForm", 1.0]]}"#).unwrap();

    emotions.apply("happy", anim.transitions_mut(), &rig);
    anim.set_drag(1.0, 0.0);
    for _ in 0..90 {
        let h = rig.parameter_handle(params::ANGLE_X).unwrap();
        rig.set_value(h, 0.0, 1.0);
        anim.tick(DT, &mut rig, None);
    }

    let snap = rig.snapshot();
    assert!((snap[params::ANGLE_X] - 30.0).abs() < 1e-3, "drag offset");
    assert!(snap["ParamMouthForm"] > 0.95, "emotion target");
}

#[test]
fn motion_resolution_feeds_the_rig() {
    let mut rig = TestRig::new();
    let motions = MotionMap::from_json(
        r#"{
            "speaking": {"group": "Talk", "index": 2, "priority": "force"},
            "idle": {"group": "Idle", "index": 0, "priority": "idle"},
            "idleAlt": {"group": "Idle", "index": 1, "priority": "idle"}
        }"#,
    )
    .unwrap();
    let mut rng = SmallRng::seed_from_u64(5);

    let key = resolve_current_motion(true, false, false, Emotion::Neutral, &mut rng);
    assert_eq!(key, keys::SPEAKING);
    assert!(motions.play(key, &mut rig));
    assert_eq!(
        rig.motions,
        vec![("Talk".to_string(), 2, MotionPriority::Force)]
    );

    // Unmapped key degrades to a false return, never a panic.
    let key = resolve_current_motion(false, true, false, Emotion::Neutral, &mut rng);
    assert_eq!(key, keys::LISTENING);
    assert!(!motions.play(key, &mut rig));
}
