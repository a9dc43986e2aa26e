//! Autonomous eye blinking.
//!
//! Timing: the first blink fires 3.0 s after start, later ones after a
//! randomised 2.0–5.0 s idle. A blink lasts 0.4 s total — 40% closing
//! (0 → 1 linear), 60% opening (1 → 0 linear). The returned closure
//! amount is *subtracted* from the eye-open parameters by the animator.

use rand::{rngs::SmallRng, Rng, SeedableRng};

/// Seconds before the very first blink.
const FIRST_BLINK_AFTER: f64 = 3.0;
/// Base and random span of the idle gap between blinks.
const IDLE_BASE: f64 = 2.0;
const IDLE_SPAN: f64 = 3.0;
/// Full blink duration and its closing share.
const BLINK_TOTAL: f64 = 0.4;
const CLOSING_FRACTION: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlinkPhase {
    /// Eyes open, waiting out the idle gap.
    Idle,
    /// Lids moving down.
    Closing,
    /// Lids moving back up.
    Opening,
}

/// Drives the blink state machine; one per avatar.
pub struct BlinkController<R: Rng = SmallRng> {
    rng: R,
    phase: BlinkPhase,
    /// Seconds spent in the current phase.
    elapsed: f64,
    /// Idle gap before the next blink starts.
    threshold: f64,
}

impl BlinkController<SmallRng> {
    pub fn new() -> Self {
        Self::with_rng(SmallRng::from_entropy())
    }
}

impl Default for BlinkController<SmallRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> BlinkController<R> {
    /// Inject the RNG so blink timing is reproducible in tests.
    pub fn with_rng(rng: R) -> Self {
        Self {
            rng,
            phase: BlinkPhase::Idle,
            elapsed: 0.0,
            threshold: FIRST_BLINK_AFTER,
        }
    }

    pub fn phase(&self) -> BlinkPhase {
        self.phase
    }

    /// Advance by `dt` seconds; returns eye closure in [0, 1].
    pub fn advance(&mut self, dt: f64) -> f32 {
        self.elapsed += dt;
        let closing = BLINK_TOTAL * CLOSING_FRACTION;
        let opening = BLINK_TOTAL - closing;

        match self.phase {
            BlinkPhase::Idle => {
                if self.elapsed >= self.threshold {
                    self.phase = BlinkPhase::Closing;
                    self.elapsed = 0.0;
                }
                0.0
            }
            BlinkPhase::Closing => {
                let closure = (self.elapsed / closing).min(1.0);
                if self.elapsed >= closing {
                    self.elapsed -= closing;
                    self.phase = BlinkPhase::Opening;
                }
                closure as f32
            }
            BlinkPhase::Opening => {
                let closure = (1.0 - self.elapsed / opening).max(0.0);
                if self.elapsed >= opening {
                    self.phase = BlinkPhase::Idle;
                    self.elapsed = 0.0;
                    self.threshold = IDLE_BASE + self.rng.gen::<f64>() * IDLE_SPAN;
                }
                closure as f32
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> BlinkController<SmallRng> {
        BlinkController::with_rng(SmallRng::seed_from_u64(7))
    }

    #[test]
    fn no_blink_before_three_seconds() {
        let mut blink = controller();
        let mut t = 0.0;
        while t < 2.99 {
            assert_eq!(blink.advance(0.01), 0.0, "at t={t}");
            t += 0.01;
        }
        assert_eq!(blink.phase(), BlinkPhase::Idle);
    }

    #[test]
    fn first_blink_fires_at_three_seconds() {
        let mut blink = controller();
        blink.advance(3.0);
        assert_eq!(blink.phase(), BlinkPhase::Closing);
        let closure = blink.advance(0.08);
        assert!(closure > 0.0, "eyes should be closing");
    }

    #[test]
    fn closure_ramps_up_then_down() {
        // Step in exact halves of each phase length; summed decimals like
        // 0.08 + 0.08 land one ulp short of the boundary.
        let closing = BLINK_TOTAL * CLOSING_FRACTION;
        let opening = BLINK_TOTAL - closing;
        let mut blink = controller();
        blink.advance(3.0);

        // Halfway through the 0.16 s closing phase.
        let mid_close = blink.advance(closing / 2.0);
        assert!((mid_close - 0.5).abs() < 1e-6, "got {mid_close}");

        // Finish closing: full closure at the boundary.
        let full = blink.advance(closing / 2.0);
        assert!((full - 1.0).abs() < 1e-6, "got {full}");
        assert_eq!(blink.phase(), BlinkPhase::Opening);

        // Halfway through the 0.24 s opening phase.
        let mid_open = blink.advance(opening / 2.0);
        assert!((mid_open - 0.5).abs() < 1e-6, "got {mid_open}");

        let done = blink.advance(opening / 2.0);
        assert_eq!(done, 0.0);
        assert_eq!(blink.phase(), BlinkPhase::Idle);
    }

    #[test]
    fn later_blinks_wait_two_to_five_seconds() {
        let mut blink = controller();
        // Run through the first full blink phase by phase.
        blink.advance(3.0);
        blink.advance(BLINK_TOTAL * CLOSING_FRACTION);
        blink.advance(BLINK_TOTAL * (1.0 - CLOSING_FRACTION));
        assert_eq!(blink.phase(), BlinkPhase::Idle);

        // Under two seconds of idle can never trigger the next blink.
        blink.advance(1.99);
        assert_eq!(blink.phase(), BlinkPhase::Idle);

        // 5.01 s of idle exceeds any possible threshold.
        blink.advance(3.02);
        assert_eq!(blink.phase(), BlinkPhase::Closing);
    }

    #[test]
    fn seeded_rng_gives_reproducible_timing() {
        let run = || {
            let mut blink = BlinkController::with_rng(SmallRng::seed_from_u64(42));
            let mut closures = Vec::new();
            for _ in 0..2_000 {
                closures.push(blink.advance(1.0 / 60.0));
            }
            closures
        };
        assert_eq!(run(), run());
    }
}
