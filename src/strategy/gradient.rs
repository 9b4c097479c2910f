//! Gradient step.
//!
//! Moves every individual along the gradient of the primary objective:
//! `x − η·∇f` when minimizing, `x + η·∇f` when maximizing, with
//! `η = learning_rate / (1 + decay · generation)`. Results are clamped into
//! the search space.
//!
//! # Preconditions
//!
//! The objective must report [`has_gradient`](crate::objective::Objective::has_gradient);
//! the orchestrator rejects the run at initialization otherwise. Constraint
//! penalties do not contribute to the gradient, so infeasible regions are
//! left only through the clamping and the orchestrator's elite.

use super::StrategyContext;
use crate::error::OptimizeError;
use crate::objective::Direction;
use crate::solution::Solution;

/// Gradient step settings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GradientConfig {
    /// Base step size.
    pub learning_rate: f64,

    /// Inverse-time decay of the step size. 0 keeps it constant.
    pub decay: f64,
}

impl Default for GradientConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            decay: 0.0,
        }
    }
}

impl GradientConfig {
    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_decay(mut self, decay: f64) -> Self {
        self.decay = decay.max(0.0);
        self
    }

    pub fn validate(&self) -> Result<(), OptimizeError> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(OptimizeError::config("learning_rate must be positive"));
        }
        if !(self.decay.is_finite() && self.decay >= 0.0) {
            return Err(OptimizeError::config("decay must be >= 0"));
        }
        Ok(())
    }

    /// Step size at `generation` (1-based).
    pub fn step_size(&self, generation: usize) -> f64 {
        self.learning_rate / (1.0 + self.decay * generation as f64)
    }
}

/// Stateless gradient step.
#[derive(Debug, Clone)]
pub struct GradientStrategy {
    config: GradientConfig,
}

impl GradientStrategy {
    pub fn new(config: GradientConfig) -> Self {
        Self { config }
    }

    pub fn next_generation(&mut self, ctx: &StrategyContext<'_>) -> Result<Vec<Solution>, OptimizeError> {
        let Some(gradient) = ctx.gradient else {
            return Err(OptimizeError::config(
                "gradient strategy requires an objective that provides gradients",
            ));
        };
        let eta = self.config.step_size(ctx.generation);
        let sign = match ctx.direction {
            Direction::Minimize => -1.0,
            Direction::Maximize => 1.0,
        };

        let mut next = Vec::with_capacity(ctx.offspring);
        for (index, solution) in ctx.population.iter().enumerate().take(ctx.offspring) {
            let grad = gradient(solution).map_err(|e| OptimizeError::Evaluation {
                generation: ctx.generation,
                index,
                reason: e.message().to_string(),
            })?;
            let mut attrs: Vec<f64> = solution
                .attributes
                .iter()
                .zip(&grad)
                .map(|(&x, &g)| x + sign * eta * g)
                .collect();
            ctx.space.clamp(&mut attrs);
            next.push(solution.derive(attrs));
        }
        tracing::trace!(generation = ctx.generation, eta, "gradient step");
        Ok(next)
    }
}
