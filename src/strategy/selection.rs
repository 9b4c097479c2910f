//! Parent selection.
//!
//! Selection works on *utilities*: fitness values oriented so that higher is
//! better regardless of the objective's direction (see
//! [`Direction::utility`](crate::objective::Direction::utility)).
//!
//! # References
//!
//! - Blickle & Thiele (1996), "A Comparison of Selection Schemes used in
//!   Evolutionary Algorithms"
//! - Baker (1985), "Adaptive Selection Methods for Genetic Algorithms"

use rand::Rng;

const EPSILON: f64 = 1e-10;

/// Selection strategy for choosing parents.
///
/// `selection_pressure` from the run parameters shapes every variant:
///
/// - `Roulette`: weights are raised to the power `pressure` (1 = plain
///   fitness-proportionate).
/// - `Tournament(k)`: unaffected; `k` is the pressure.
/// - `Rank`: linear ranking with `s = clamp(pressure, 1, 2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Selection {
    /// Fitness-proportionate (roulette wheel) selection.
    ///
    /// Utilities are shifted so the worst individual gets a tiny positive
    /// weight; a uniform draw in `[0, total)` picks the first individual
    /// whose cumulative weight exceeds it.
    #[default]
    Roulette,

    /// Pick `k` individuals at random (with replacement), keep the best.
    Tournament(usize),

    /// Linear rank selection.
    Rank,
}

impl Selection {
    /// Selects a parent index.
    ///
    /// # Panics
    /// Panics if `utilities` is empty.
    pub fn select<R: Rng>(&self, utilities: &[f64], pressure: f64, rng: &mut R) -> usize {
        assert!(!utilities.is_empty(), "cannot select from empty population");

        match self {
            Selection::Roulette => roulette(utilities, pressure, rng),
            Selection::Tournament(k) => tournament(utilities, *k, rng),
            Selection::Rank => rank(utilities, pressure, rng),
        }
    }
}

fn roulette<R: Rng>(utilities: &[f64], pressure: f64, rng: &mut R) -> usize {
    let n = utilities.len();
    if n == 1 {
        return 0;
    }

    let min = utilities.iter().cloned().fold(f64::INFINITY, f64::min);
    let weights: Vec<f64> = utilities
        .iter()
        .map(|&u| {
            let w = (u - min + EPSILON).powf(pressure);
            if w.is_finite() && w > 0.0 {
                w
            } else {
                EPSILON
            }
        })
        .collect();

    let total: f64 = weights.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        return rng.random_range(0..n);
    }

    let threshold = rng.random_range(0.0..total);
    let mut cumulative = 0.0;
    for (i, &w) in weights.iter().enumerate() {
        cumulative += w;
        if cumulative > threshold {
            return i;
        }
    }

    n - 1 // floating-point fallback
}

fn tournament<R: Rng>(utilities: &[f64], k: usize, rng: &mut R) -> usize {
    let k = k.max(1);
    let n = utilities.len();

    let mut best = rng.random_range(0..n);
    for _ in 1..k {
        let idx = rng.random_range(0..n);
        if utilities[idx] > utilities[best] {
            best = idx;
        }
    }
    best
}

fn rank<R: Rng>(utilities: &[f64], pressure: f64, rng: &mut R) -> usize {
    let n = utilities.len();
    if n == 1 {
        return 0;
    }

    // worst first, so position == rank
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        utilities[a]
            .partial_cmp(&utilities[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let s = pressure.clamp(1.0, 2.0);
    let weight = |r: usize| (2.0 - s) + 2.0 * (s - 1.0) * r as f64 / (n - 1) as f64;
    let total: f64 = (0..n).map(weight).sum();
    if total <= 0.0 {
        return order[n - 1];
    }

    let threshold = rng.random_range(0.0..total);
    let mut cumulative = 0.0;
    for (r, &idx) in order.iter().enumerate() {
        cumulative += weight(r);
        if cumulative > threshold {
            return idx;
        }
    }
    order[n - 1]
}
