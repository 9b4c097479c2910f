//! Simulated annealing generation step.
//!
//! The population is a batch of neighbours around one *current* solution.
//! After each evaluation the best neighbour is proposed as the next current
//! solution and accepted by the Metropolis criterion; the temperature then
//! cools by the configured schedule.
//!
//! # References
//!
//! - Kirkpatrick, Gelatt & Vecchi (1983), "Optimization by Simulated Annealing"
//! - Lundy & Mees (1986), "Convergence of an Annealing Algorithm"

use super::StrategyContext;
use crate::error::OptimizeError;
use crate::random::gaussian;
use crate::solution::Solution;
use rand::Rng;

/// Cooling schedule for temperature reduction.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CoolingSchedule {
    /// `T_{k+1} = alpha · T_k`. Typical `alpha`: 0.95–0.99.
    Geometric {
        /// Cooling factor in (0, 1). Higher = slower cooling.
        alpha: f64,
    },

    /// `T_k = T_0 − k · (T_0 − T_min) / max_iterations`.
    Linear,

    /// `T_{k+1} = T_k / (1 + beta · T_k)`.
    LundyMees {
        /// Cooling parameter, > 0.
        beta: f64,
    },
}

impl Default for CoolingSchedule {
    fn default() -> Self {
        CoolingSchedule::Geometric { alpha: 0.95 }
    }
}

/// Simulated annealing settings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnnealingConfig {
    /// Starting temperature, in utility units.
    pub initial_temperature: f64,

    /// Temperature floor.
    pub min_temperature: f64,

    pub cooling: CoolingSchedule,

    /// Neighbour step standard deviation as a fraction of each span.
    pub neighbor_scale: f64,
}

impl Default for AnnealingConfig {
    fn default() -> Self {
        Self {
            initial_temperature: 10.0,
            min_temperature: 1e-8,
            cooling: CoolingSchedule::default(),
            neighbor_scale: 0.1,
        }
    }
}

impl AnnealingConfig {
    pub fn with_initial_temperature(mut self, t: f64) -> Self {
        self.initial_temperature = t;
        self
    }

    pub fn with_min_temperature(mut self, t: f64) -> Self {
        self.min_temperature = t;
        self
    }

    pub fn with_cooling(mut self, cooling: CoolingSchedule) -> Self {
        self.cooling = cooling;
        self
    }

    pub fn with_neighbor_scale(mut self, scale: f64) -> Self {
        self.neighbor_scale = scale.max(0.0);
        self
    }

    pub fn validate(&self) -> Result<(), OptimizeError> {
        if !(self.initial_temperature.is_finite() && self.initial_temperature > 0.0) {
            return Err(OptimizeError::config("initial_temperature must be positive"));
        }
        if !(self.min_temperature >= 0.0 && self.min_temperature < self.initial_temperature) {
            return Err(OptimizeError::config(
                "min_temperature must be in [0, initial_temperature)",
            ));
        }
        match self.cooling {
            CoolingSchedule::Geometric { alpha } if !(alpha > 0.0 && alpha < 1.0) => {
                return Err(OptimizeError::config("geometric cooling alpha must be in (0, 1)"));
            }
            CoolingSchedule::LundyMees { beta } if !(beta.is_finite() && beta > 0.0) => {
                return Err(OptimizeError::config("Lundy-Mees beta must be positive"));
            }
            _ => {}
        }
        if !(self.neighbor_scale.is_finite() && self.neighbor_scale > 0.0) {
            return Err(OptimizeError::config("neighbor_scale must be positive"));
        }
        Ok(())
    }
}

/// SA step holding the current solution and temperature.
#[derive(Debug, Clone)]
pub struct AnnealingStrategy {
    config: AnnealingConfig,
    current: Option<(Solution, f64)>,
    temperature: f64,
    step: usize,
    accepted: usize,
}

impl AnnealingStrategy {
    pub fn new(config: AnnealingConfig) -> Self {
        let temperature = config.initial_temperature;
        Self {
            config,
            current: None,
            temperature,
            step: 0,
            accepted: 0,
        }
    }

    /// Current temperature.
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Number of accepted proposals so far.
    pub fn accepted_moves(&self) -> usize {
        self.accepted
    }

    pub fn next_generation<R: Rng>(&mut self, ctx: &StrategyContext<'_>, rng: &mut R) -> Vec<Solution> {
        let utilities = ctx.utilities();
        let Some(best) = ctx.direction.best_index(ctx.fitness) else {
            return Vec::new();
        };
        let proposal = (ctx.population[best].clone(), utilities[best]);

        let accept = match &self.current {
            None => true,
            Some((_, current_utility)) => {
                let delta = proposal.1 - current_utility;
                // Metropolis acceptance criterion
                delta >= 0.0
                    || (self.temperature > 0.0 && rng.random::<f64>() < (delta / self.temperature).exp())
            }
        };
        if accept {
            self.current = Some(proposal);
            self.accepted += 1;
        }

        self.step += 1;
        self.temperature = self.cool(ctx.params.max_iterations);
        tracing::trace!(
            generation = ctx.generation,
            temperature = self.temperature,
            accepted = accept,
            "annealing step"
        );

        let Some((current, _)) = &self.current else {
            return Vec::new();
        };
        let mut next = Vec::with_capacity(ctx.offspring);
        if ctx.offspring > 0 {
            next.push(current.clone());
        }
        while next.len() < ctx.offspring {
            next.push(self.neighbor(current, ctx, rng));
        }
        next
    }

    fn neighbor<R: Rng>(&self, current: &Solution, ctx: &StrategyContext<'_>, rng: &mut R) -> Solution {
        let mut attrs = current.attributes.clone();
        for (x, v) in attrs.iter_mut().zip(&ctx.space.variables) {
            *x += gaussian(rng) * self.config.neighbor_scale * v.span();
        }
        ctx.space.clamp(&mut attrs);
        current.derive(attrs)
    }

    fn cool(&self, max_iterations: usize) -> f64 {
        let t_min = self.config.min_temperature;
        let next = match self.config.cooling {
            CoolingSchedule::Geometric { alpha } => self.temperature * alpha,
            CoolingSchedule::Linear => {
                let t0 = self.config.initial_temperature;
                t0 - self.step as f64 * (t0 - t_min) / max_iterations.max(1) as f64
            }
            CoolingSchedule::LundyMees { beta } => self.temperature / (1.0 + beta * self.temperature),
        };
        next.max(t_min)
    }
}
