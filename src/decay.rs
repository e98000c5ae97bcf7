//! Decay curves — forgetting and emotional settling over simulated time.
//!
//! Everything settles toward a target with the closed form
//! `w' = target + (w − target) · r^Δt`, which makes catching up a gap of
//! N ticks in one pass identical to N single-tick passes. The policy table
//! maps event kinds to retention rates and floors: traumatic memories decay
//! slowest and keep the highest floor, trivial ones fade fast.
//!
//! Fuzzy variance: each settling step scales the computed delta by a bounded
//! factor drawn from a PRNG seeded from (character id, tick). The jitter
//! looks organic to an observer but replays byte-identically.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{DecayConfig, DecayPolicy};
use crate::event::EventKind;
use crate::types::CharacterId;

/// Salience decay policy for an event kind.
#[must_use]
pub fn policy_for(kind: EventKind, config: &DecayConfig) -> DecayPolicy {
    match kind {
        EventKind::Trauma | EventKind::Betrayal | EventKind::Transformation => config.traumatic,
        EventKind::Kindness | EventKind::Conflict | EventKind::SkillPractice => config.notable,
        _ => config.trivial,
    }
}

/// Closed-form settling of `value` toward `target` over `elapsed` ticks.
#[must_use]
pub fn settle(value: f32, target: f32, rate: f64, elapsed: u64) -> f32 {
    let retained = rate.powi(elapsed.min(i32::MAX as u64) as i32);
    target + ((value - target) as f64 * retained) as f32
}

/// Deterministic jitter source for one character's settling pass at one tick.
///
/// Draws are consumed in the store's fixed iteration order, so replay sees
/// the same sequence.
#[derive(Debug)]
pub struct JitterSource {
    rng: StdRng,
    frac: f32,
}

impl JitterSource {
    /// Seed a jitter source from (character id, tick).
    #[must_use]
    pub fn new(character: CharacterId, tick: u64, frac: f32) -> Self {
        let bits = character.0.as_u128();
        let seed = (bits as u64)
            ^ ((bits >> 64) as u64)
            ^ tick.wrapping_mul(0x9E37_79B9_7F4A_7C15);
        Self {
            rng: StdRng::seed_from_u64(seed),
            frac: frac.clamp(0.0, 0.5),
        }
    }

    /// Next delta scale factor, in [1 − frac, 1 + frac].
    pub fn factor(&mut self) -> f32 {
        if self.frac <= f32::EPSILON {
            return 1.0;
        }
        1.0 + self.rng.gen_range(-self.frac..=self.frac)
    }
}

/// Settle `value` toward `target`, perturbing the delta by the next jitter
/// draw and clamping the result to `[lo, hi]`.
pub fn settle_fuzzy(
    value: f32,
    target: f32,
    rate: f64,
    elapsed: u64,
    jitter: &mut JitterSource,
    lo: f32,
    hi: f32,
) -> f32 {
    let settled = settle(value, target, rate, elapsed);
    let delta = settled - value;
    (value + delta * jitter.factor()).clamp(lo, hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settle_is_closed_form() {
        // Two 50-tick passes must equal one 100-tick pass.
        let one_pass = settle(0.2, 0.0, 0.99, 100);
        let half = settle(0.2, 0.0, 0.99, 50);
        let two_pass = settle(half, 0.0, 0.99, 50);
        assert!((one_pass - two_pass).abs() < 1e-6);
    }

    #[test]
    fn settle_matches_reference_value() {
        // 0.2 · 0.99^100 ≈ 0.0734
        let settled = settle(0.2, 0.0, 0.99, 100);
        assert!((settled - 0.0734).abs() < 0.001, "got {settled}");
    }

    #[test]
    fn settle_moves_negative_values_toward_zero() {
        let settled = settle(-0.8, 0.0, 0.99, 50);
        assert!(settled > -0.8 && settled < 0.0);
    }

    #[test]
    fn settle_respects_target_above_value() {
        // Trust decaying upward toward its neutral 0.5.
        let settled = settle(0.1, 0.5, 0.99, 100);
        assert!(settled > 0.1 && settled < 0.5);
    }

    #[test]
    fn zero_elapsed_is_identity() {
        assert!((settle(0.42, 0.0, 0.99, 0) - 0.42).abs() < f32::EPSILON);
    }

    #[test]
    fn jitter_is_deterministic_per_seed() {
        let character = CharacterId::new();
        let mut a = JitterSource::new(character, 50, 0.05);
        let mut b = JitterSource::new(character, 50, 0.05);
        for _ in 0..16 {
            assert!((a.factor() - b.factor()).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn jitter_differs_across_ticks() {
        let character = CharacterId::new();
        let mut a = JitterSource::new(character, 50, 0.05);
        let mut b = JitterSource::new(character, 51, 0.05);
        let same = (0..8).all(|_| (a.factor() - b.factor()).abs() < f32::EPSILON);
        assert!(!same, "different ticks should draw different jitter");
    }

    #[test]
    fn jitter_is_bounded() {
        let mut source = JitterSource::new(CharacterId::new(), 7, 0.05);
        for _ in 0..64 {
            let f = source.factor();
            assert!((0.95..=1.05).contains(&f), "factor {f} out of bounds");
        }
    }

    #[test]
    fn zero_frac_disables_jitter() {
        let mut source = JitterSource::new(CharacterId::new(), 7, 0.0);
        assert!((source.factor() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn traumatic_kinds_decay_slower_than_trivial() {
        let config = DecayConfig::default();
        let trauma = policy_for(EventKind::Trauma, &config);
        let chat = policy_for(EventKind::Dialogue, &config);
        assert!(trauma.rate > chat.rate);
        assert!(trauma.floor > chat.floor);
    }
}
