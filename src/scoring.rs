// ⏱️ Scoring Model - car attributes + track difficulty → finish time
//
//   base    = 100 / (horsepower / weight) * 10
//   jitter  = U(0.9, 1.1)
//   penalty = 1 + difficulty * U(0.1, 0.3)
//   time    = base * jitter * penalty
//
// Lower is better. Horsepower and weight must be positive; nothing is clamped.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::RangeInclusive;

use crate::models::Car;

/// Race-day variance range
pub const JITTER_RANGE: RangeInclusive<f64> = 0.9..=1.1;

/// Per-car draw scaled by track difficulty
pub const PENALTY_DRAW_RANGE: RangeInclusive<f64> = 0.1..=0.3;

// ============================================================================
// RANDOMNESS
// ============================================================================

/// Source of uniform draws. Injected so race outcomes can be replayed.
pub trait UniformSource {
    /// Next value in `[low, high]`
    fn uniform(&mut self, low: f64, high: f64) -> f64;
}

impl<S: UniformSource + ?Sized> UniformSource for &mut S {
    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        (**self).uniform(low, high)
    }
}

/// `StdRng`-backed source; the same seed replays the same race.
pub struct SeededSource {
    rng: StdRng,
}

impl SeededSource {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl UniformSource for SeededSource {
    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        if low >= high {
            return low;
        }
        self.rng.gen_range(low..=high)
    }
}

/// Replays a recorded sequence of draws verbatim, cycling when exhausted.
///
/// Values are returned as-is; keeping them inside the requested range is
/// the caller's business. An empty script answers every draw with the
/// range's lower bound.
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    draws: Vec<f64>,
    next: usize,
}

impl ScriptedSource {
    pub fn new(draws: Vec<f64>) -> Self {
        Self { draws, next: 0 }
    }

    /// Jitter and penalty draw repeated for every car
    pub fn fixed(jitter: f64, penalty_draw: f64) -> Self {
        Self::new(vec![jitter, penalty_draw])
    }
}

impl UniformSource for ScriptedSource {
    fn uniform(&mut self, low: f64, _high: f64) -> f64 {
        if self.draws.is_empty() {
            return low;
        }
        let value = self.draws[self.next % self.draws.len()];
        self.next += 1;
        value
    }
}

// ============================================================================
// SCORING
// ============================================================================

/// Power-to-weight inverse cost before any randomness
pub fn base_time(car: &Car) -> f64 {
    100.0 / car.power_to_weight() * 10.0
}

/// Multiplier `1 + difficulty * draw`
pub fn difficulty_penalty(difficulty: f64, draw: f64) -> f64 {
    1.0 + difficulty * draw
}

/// Deterministic score for already-drawn randomness
pub fn score_with_draws(car: &Car, track_difficulty: f64, jitter: f64, penalty_draw: f64) -> f64 {
    base_time(car) * jitter * difficulty_penalty(track_difficulty, penalty_draw)
}

/// Score one car. Draws jitter first, then the difficulty draw.
pub fn score<S: UniformSource + ?Sized>(car: &Car, track_difficulty: f64, source: &mut S) -> f64 {
    let jitter = source.uniform(*JITTER_RANGE.start(), *JITTER_RANGE.end());
    let penalty_draw = source.uniform(*PENALTY_DRAW_RANGE.start(), *PENALTY_DRAW_RANGE.end());
    score_with_draws(car, track_difficulty, jitter, penalty_draw)
}

/// Round to 2 decimals for display
pub fn round_time(time: f64) -> f64 {
    (time * 100.0).round() / 100.0
}
