//! Surrogate-guided (Bayesian) generation step.
//!
//! Every evaluated solution becomes an observation in normalized
//! coordinates. A kernel-regression surrogate predicts the utility and an
//! uncertainty at candidate points; the candidates with the highest
//! Expected Improvement become the next generation.
//!
//! The surrogate is a Nadaraya–Watson estimator with an RBF kernel rather
//! than a full Gaussian process: prediction is `O(n)` per candidate with no
//! matrix factorization, and the uncertainty grows with the distance to the
//! nearest observation.
//!
//! # References
//!
//! - Jones, Schonlau & Welch (1998), "Efficient Global Optimization of
//!   Expensive Black-Box Functions"
//! - Abramowitz & Stegun (1964), formula 7.1.26 (erf approximation)

use super::StrategyContext;
use crate::error::OptimizeError;
use crate::random::gaussian;
use crate::solution::Solution;
use rand::Rng;

/// Surrogate-guided search settings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BayesianConfig {
    /// Candidate points scored by the acquisition function per generation.
    ///
    /// Raised to twice the offspring count when smaller.
    pub candidate_samples: usize,

    /// RBF kernel length scale in normalized coordinates.
    pub length_scale: f64,

    /// Exploration margin `ξ` of Expected Improvement.
    pub exploration: f64,

    /// Optional observation cap; the oldest observations are discarded
    /// beyond it. `None` keeps every observation.
    pub max_observations: Option<usize>,
}

impl Default for BayesianConfig {
    fn default() -> Self {
        Self {
            candidate_samples: 64,
            length_scale: 0.2,
            exploration: 0.01,
            max_observations: None,
        }
    }
}

impl BayesianConfig {
    pub fn with_candidate_samples(mut self, n: usize) -> Self {
        self.candidate_samples = n.max(1);
        self
    }

    pub fn with_length_scale(mut self, length_scale: f64) -> Self {
        self.length_scale = length_scale;
        self
    }

    pub fn with_exploration(mut self, xi: f64) -> Self {
        self.exploration = xi.max(0.0);
        self
    }

    pub fn with_max_observations(mut self, n: usize) -> Self {
        self.max_observations = Some(n.max(1));
        self
    }

    pub fn validate(&self) -> Result<(), OptimizeError> {
        if self.candidate_samples == 0 {
            return Err(OptimizeError::config("candidate_samples must be > 0"));
        }
        if !(self.length_scale.is_finite() && self.length_scale > 0.0) {
            return Err(OptimizeError::config("length_scale must be positive"));
        }
        if !(self.exploration.is_finite() && self.exploration >= 0.0) {
            return Err(OptimizeError::config("exploration must be >= 0"));
        }
        if self.max_observations == Some(0) {
            return Err(OptimizeError::config("max_observations must be > 0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Observation {
    point: Vec<f64>,
    utility: f64,
}

/// Surrogate-guided step accumulating observations across generations.
#[derive(Debug, Clone)]
pub struct BayesianStrategy {
    config: BayesianConfig,
    observations: Vec<Observation>,
}

impl BayesianStrategy {
    pub fn new(config: BayesianConfig) -> Self {
        Self {
            config,
            observations: Vec::new(),
        }
    }

    /// Number of stored observations.
    pub fn observation_count(&self) -> usize {
        self.observations.len()
    }

    pub fn next_generation<R: Rng>(&mut self, ctx: &StrategyContext<'_>, rng: &mut R) -> Vec<Solution> {
        let utilities = ctx.utilities();
        for (s, &u) in ctx.population.iter().zip(&utilities) {
            let point = ctx.space.normalize(&s.attributes);
            // the carried-over elite is already known
            if self.observations.iter().any(|o| o.point == point) {
                continue;
            }
            self.observations.push(Observation { point, utility: u });
        }
        if let Some(cap) = self.config.max_observations {
            let excess = self.observations.len().saturating_sub(cap);
            self.observations.drain(..excess);
        }

        let Some(best) = ctx.direction.best_index(ctx.fitness) else {
            return Vec::new();
        };
        let parent = &ctx.population[best];
        let incumbent = ctx.space.normalize(&parent.attributes);

        let surrogate = Surrogate::fit(&self.observations, self.config.length_scale);
        let dim = ctx.space.dim();
        let n_candidates = self.config.candidate_samples.max(ctx.offspring * 2);

        let mut scored: Vec<(f64, Vec<f64>)> = (0..n_candidates)
            .map(|i| {
                let point: Vec<f64> = if i % 2 == 0 {
                    (0..dim).map(|_| rng.random::<f64>()).collect()
                } else {
                    incumbent
                        .iter()
                        .map(|&x| (x + gaussian(rng) * self.config.length_scale).clamp(0.0, 1.0))
                        .collect()
                };
                (surrogate.expected_improvement(&point, self.config.exploration), point)
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        tracing::trace!(
            generation = ctx.generation,
            observations = self.observations.len(),
            top_ei = scored.first().map(|c| c.0).unwrap_or(0.0),
            "surrogate acquisition"
        );

        scored
            .into_iter()
            .take(ctx.offspring)
            .map(|(_, point)| {
                let mut attrs = ctx.space.denormalize(&point);
                ctx.space.clamp(&mut attrs);
                parent.derive(attrs)
            })
            .collect()
    }
}

/// Standardized kernel-regression model over the observations.
struct Surrogate<'a> {
    observations: &'a [Observation],
    length_scale: f64,
    mean: f64,
    std: f64,
    best: f64,
}

impl<'a> Surrogate<'a> {
    fn fit(observations: &'a [Observation], length_scale: f64) -> Self {
        let n = observations.len().max(1) as f64;
        let mean = observations.iter().map(|o| o.utility).sum::<f64>() / n;
        let var = observations
            .iter()
            .map(|o| (o.utility - mean).powi(2))
            .sum::<f64>()
            / n;
        let std = if var > 1e-24 { var.sqrt() } else { 1.0 };
        let best = observations
            .iter()
            .map(|o| (o.utility - mean) / std)
            .fold(f64::NEG_INFINITY, f64::max);
        Self {
            observations,
            length_scale,
            mean,
            std,
            best: if best.is_finite() { best } else { 0.0 },
        }
    }

    /// Standardized (mean, standard deviation) prediction at `point`.
    fn predict(&self, point: &[f64]) -> (f64, f64) {
        let two_l2 = 2.0 * self.length_scale * self.length_scale;
        let mut weight_sum = 0.0;
        let mut weighted = 0.0;
        let mut k_max: f64 = 0.0;
        for o in self.observations {
            let d2: f64 = o.point.iter().zip(point).map(|(a, b)| (a - b) * (a - b)).sum();
            let k = (-d2 / two_l2).exp();
            weight_sum += k;
            weighted += k * (o.utility - self.mean) / self.std;
            k_max = k_max.max(k);
        }
        let mu = if weight_sum > 1e-300 { weighted / weight_sum } else { 0.0 };
        let sigma = (1.0 - k_max).max(1e-9).sqrt();
        (mu, sigma)
    }

    fn expected_improvement(&self, point: &[f64], xi: f64) -> f64 {
        let (mu, sigma) = self.predict(point);
        let improvement = mu - self.best - xi;
        let z = improvement / sigma;
        let ei = improvement * normal_cdf(z) + sigma * normal_pdf(z);
        ei.max(0.0)
    }
}

fn normal_pdf(z: f64) -> f64 {
    (-0.5 * z * z).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

// Abramowitz & Stegun 7.1.26, |error| < 1.5e-7
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.327_591_1 * x);
    let poly = t
        * (0.254_829_592
            + t * (-0.284_496_736 + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));
    sign * (1.0 - poly * (-x * x).exp())
}
