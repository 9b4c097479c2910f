//! Genetic algorithm generation step.
//!
//! selection → BLX-α crossover (probability `crossover_rate`) → Gaussian
//! mutation (probability `mutation_rate`), repeated until the requested
//! number of offspring exists.
//!
//! # References
//!
//! - Holland (1975), *Adaptation in Natural and Artificial Systems*
//! - Goldberg (1989), *Genetic Algorithms in Search, Optimization, and Machine Learning*

use super::operators::{blend_crossover, gaussian_mutation};
use super::selection::Selection;
use super::StrategyContext;
use crate::error::OptimizeError;
use crate::solution::Solution;
use rand::Rng;

/// Genetic algorithm settings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeneticConfig {
    /// Parent selection scheme.
    pub selection: Selection,

    /// BLX-α extension factor. 0 keeps children inside the parents' box.
    pub blend_alpha: f64,

    /// Mutation standard deviation as a fraction of each variable's span.
    pub mutation_scale: f64,
}

impl Default for GeneticConfig {
    fn default() -> Self {
        Self {
            selection: Selection::Roulette,
            blend_alpha: 0.5,
            mutation_scale: 0.1,
        }
    }
}

impl GeneticConfig {
    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_blend_alpha(mut self, alpha: f64) -> Self {
        self.blend_alpha = alpha.max(0.0);
        self
    }

    pub fn with_mutation_scale(mut self, scale: f64) -> Self {
        self.mutation_scale = scale.max(0.0);
        self
    }

    pub fn validate(&self) -> Result<(), OptimizeError> {
        if !self.blend_alpha.is_finite() || self.blend_alpha < 0.0 {
            return Err(OptimizeError::config("blend_alpha must be finite and >= 0"));
        }
        if !self.mutation_scale.is_finite() || self.mutation_scale <= 0.0 {
            return Err(OptimizeError::config("mutation_scale must be finite and > 0"));
        }
        Ok(())
    }
}

/// Stateless GA step.
#[derive(Debug, Clone)]
pub struct GeneticStrategy {
    config: GeneticConfig,
}

impl GeneticStrategy {
    pub fn new(config: GeneticConfig) -> Self {
        Self { config }
    }

    pub fn next_generation<R: Rng>(&mut self, ctx: &StrategyContext<'_>, rng: &mut R) -> Vec<Solution> {
        let utilities = ctx.utilities();
        let pressure = ctx.params.selection_pressure;
        let dim = ctx.space.dim().max(1);
        let mut next = Vec::with_capacity(ctx.offspring);

        while next.len() < ctx.offspring {
            let i = self.config.selection.select(&utilities, pressure, rng);
            let j = self.config.selection.select(&utilities, pressure, rng);
            let (p1, p2) = (&ctx.population[i], &ctx.population[j]);

            let (genes1, genes2) = if rng.random_bool(ctx.params.crossover_rate) {
                blend_crossover(&p1.attributes, &p2.attributes, self.config.blend_alpha, ctx.space, rng)
            } else {
                (p1.attributes.clone(), p2.attributes.clone())
            };

            for (parent, mut genes) in [(p1, genes1), (p2, genes2)] {
                if next.len() >= ctx.offspring {
                    break;
                }
                if rng.random_bool(ctx.params.mutation_rate) {
                    gaussian_mutation(&mut genes, ctx.space, self.config.mutation_scale, 1.0 / dim as f64, rng);
                }
                next.push(parent.derive(genes));
            }
        }

        next
    }
}
