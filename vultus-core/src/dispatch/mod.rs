//! Emotion and motion dispatch.
//!
//! Both tables are character data, not code: they are loaded from JSON
//! next to the character assets. The code only knows the well-known
//! motion keys and the handful of emotion names with special casing.

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::animation::TransitionEngine;
use crate::rig::{MotionPriority, Rig};

/// Emotion names the motion resolver treats specially. Anything else is
/// [`Emotion::Other`] and behaves like neutral everywhere except the
/// emotion table lookup, which uses the raw name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emotion {
    Neutral,
    Happy,
    Surprised,
    Shy,
    Despise,
    Other,
}

impl Emotion {
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "neutral" => Self::Neutral,
            "happy" => Self::Happy,
            "surprised" => Self::Surprised,
            "shy" => Self::Shy,
            "despise" => Self::Despise,
            _ => Self::Other,
        }
    }

    fn calm(self) -> bool {
        matches!(self, Self::Neutral | Self::Happy | Self::Surprised)
    }

    fn frozen(self) -> bool {
        matches!(self, Self::Shy | Self::Despise)
    }
}

/// Parameter targets per emotion name, as shipped with the character.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmotionTable {
    entries: HashMap<String, Vec<(String, f32)>>,
}

impl EmotionTable {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Steer the rig toward `name`'s parameter set.
    ///
    /// Always soft-clears first so parameters from the previous emotion
    /// ease back to zero. An unknown name or parameter never fails — it
    /// just leaves the avatar settling to neutral.
    pub fn apply(&self, name: &str, engine: &mut TransitionEngine, rig: &dyn Rig) {
        engine.reset_all_to_neutral();

        let Some(targets) = self.entries.get(name) else {
            debug!(emotion = name, "no emotion entry, settling to neutral");
            return;
        };

        for (param, value) in targets {
            match rig.parameter_handle(param) {
                Ok(handle) => engine.set_target(handle, *value, rig),
                Err(_) => {
                    warn!(emotion = name, param = %param, "emotion names unknown parameter, skipped")
                }
            }
        }
    }
}

/// Well-known motion map keys.
pub mod keys {
    pub const SPEAKING: &str = "speaking";
    pub const LISTENING: &str = "listening";
    pub const THINKING: &str = "thinking";
    pub const STATIC: &str = "static";
    pub const IDLE: &str = "idle";
    pub const IDLE_ALT: &str = "idleAlt";
}

/// One motion the character can play.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotionRequest {
    pub group: String,
    pub index: u32,
    pub priority: MotionPriority,
}

/// Named motions, loaded with the character.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MotionMap {
    entries: HashMap<String, MotionRequest>,
}

impl MotionMap {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn get(&self, key: &str) -> Option<&MotionRequest> {
        self.entries.get(key)
    }

    /// Start the motion mapped to `key`; false (with a warning) when the
    /// character has no such mapping.
    pub fn play(&self, key: &str, rig: &mut dyn Rig) -> bool {
        match self.entries.get(key) {
            Some(req) => {
                rig.start_motion(&req.group, req.index, req.priority);
                true
            }
            None => {
                warn!(key, "no motion mapped");
                false
            }
        }
    }
}

/// Pick the motion key for the avatar's current situation.
///
/// Precedence: speaking beats listening beats thinking; a calm emotion
/// (neutral/happy/surprised) is required for the thinking pose; shy and
/// despise hold a static pose; everything else idles on one of two
/// randomly chosen loops.
pub fn resolve_current_motion<R: Rng>(
    is_audio_playing: bool,
    is_user_speaking: bool,
    is_bot_thinking: bool,
    emotion: Emotion,
    rng: &mut R,
) -> &'static str {
    if is_audio_playing {
        return keys::SPEAKING;
    }
    if is_user_speaking {
        return keys::LISTENING;
    }
    if is_bot_thinking && emotion.calm() {
        return keys::THINKING;
    }
    if emotion.frozen() {
        return keys::STATIC;
    }
    if rng.gen_bool(0.5) {
        keys::IDLE
    } else {
        keys::IDLE_ALT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rig::fake::FakeRig;
    use rand::{rngs::SmallRng, SeedableRng};

    fn table() -> EmotionTable {
        EmotionTable::from_json(
            r#"{
                "happy": [["ParamMouthForm", 1.0], ["ParamCheek", 0.8]],
                "sad": [["ParamBrowLY", -0.6], ["ParamMissing", 1.0]]
            }"#,
        )
        .expect("valid table json")
    }

    #[test]
    fn apply_sets_targets_for_known_emotion() {
        let mut rig = FakeRig::new(&["ParamMouthForm", "ParamCheek"]);
        let mut engine = TransitionEngine::new(5.0);

        table().apply("happy", &mut engine, &rig);
        engine.advance(10.0, &mut rig);

        assert!((rig.value_of("ParamMouthForm") - 1.0).abs() < 1e-4);
        assert!((rig.value_of("ParamCheek") - 0.8).abs() < 1e-4);
    }

    #[test]
    fn apply_unknown_emotion_settles_previous_to_neutral() {
        let mut rig = FakeRig::new(&["ParamMouthForm", "ParamCheek"]);
        let mut engine = TransitionEngine::new(5.0);

        let table = table();
        table.apply("happy", &mut engine, &rig);
        engine.advance(10.0, &mut rig);

        table.apply("nonexistent", &mut engine, &rig);
        for _ in 0..600 {
            engine.advance(1.0 / 60.0, &mut rig);
        }
        assert!(rig.value_of("ParamMouthForm").abs() < 0.02);
    }

    #[test]
    fn apply_skips_unknown_parameters_without_failing() {
        // "sad" names ParamMissing which this rig lacks.
        let mut rig = FakeRig::new(&["ParamBrowLY"]);
        let mut engine = TransitionEngine::new(5.0);

        table().apply("sad", &mut engine, &rig);
        engine.advance(10.0, &mut rig);
        assert!((rig.value_of("ParamBrowLY") - (-0.6)).abs() < 1e-4);
    }

    fn motions() -> MotionMap {
        MotionMap::from_json(
            r#"{
                "speaking": {"group": "Talk", "index": 0, "priority": "force"},
                "idle": {"group": "Idle", "index": 0, "priority": "idle"}
            }"#,
        )
        .expect("valid motion json")
    }

    #[test]
    fn play_starts_mapped_motion() {
        let mut rig = FakeRig::new(&[]);
        assert!(motions().play("speaking", &mut rig));
        assert_eq!(
            rig.motions,
            vec![("Talk".to_string(), 0, MotionPriority::Force)]
        );
    }

    #[test]
    fn play_missing_key_returns_false() {
        let mut rig = FakeRig::new(&[]);
        assert!(!motions().play("thinking", &mut rig));
        assert!(rig.motions.is_empty());
    }

    #[test]
    fn speaking_beats_everything() {
        let mut rng = SmallRng::seed_from_u64(0);
        let key = resolve_current_motion(true, true, true, Emotion::Shy, &mut rng);
        assert_eq!(key, keys::SPEAKING);
    }

    #[test]
    fn listening_beats_thinking() {
        let mut rng = SmallRng::seed_from_u64(0);
        let key = resolve_current_motion(false, true, true, Emotion::Neutral, &mut rng);
        assert_eq!(key, keys::LISTENING);
    }

    #[test]
    fn thinking_requires_a_calm_emotion() {
        let mut rng = SmallRng::seed_from_u64(0);
        for calm in [Emotion::Neutral, Emotion::Happy, Emotion::Surprised] {
            assert_eq!(
                resolve_current_motion(false, false, true, calm, &mut rng),
                keys::THINKING
            );
        }
        // Shy while thinking drops to the static pose instead.
        assert_eq!(
            resolve_current_motion(false, false, true, Emotion::Shy, &mut rng),
            keys::STATIC
        );
    }

    #[test]
    fn shy_and_despise_hold_static_pose() {
        let mut rng = SmallRng::seed_from_u64(0);
        for e in [Emotion::Shy, Emotion::Despise] {
            assert_eq!(
                resolve_current_motion(false, false, false, e, &mut rng),
                keys::STATIC
            );
        }
    }

    #[test]
    fn idle_picks_one_of_two_loops() {
        let mut rng = SmallRng::seed_from_u64(3);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..64 {
            seen.insert(resolve_current_motion(
                false,
                false,
                false,
                Emotion::Neutral,
                &mut rng,
            ));
        }
        assert_eq!(
            seen,
            [keys::IDLE, keys::IDLE_ALT].into_iter().collect()
        );
    }

    #[test]
    fn emotion_parse_is_case_insensitive() {
        assert_eq!(Emotion::from_name("HAPPY"), Emotion::Happy);
        assert_eq!(Emotion::from_name("despise"), Emotion::Despise);
        assert_eq!(Emotion::from_name("확신"), Emotion::Other);
    }
}
