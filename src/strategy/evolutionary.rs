//! Evolution strategy generation step.
//!
//! Mutation only: every child is a copy of one selected parent perturbed by
//! a Gaussian step `σ`; `crossover_rate` is ignored. `σ` adapts to the
//! population spread: it widens while the population is collapsed below
//! `target_diversity` and narrows otherwise.
//!
//! # References
//!
//! - Rechenberg (1973), *Evolutionsstrategie*
//! - Beyer & Schwefel (2002), "Evolution strategies – A comprehensive introduction"

use super::operators::gaussian_mutation;
use super::selection::Selection;
use super::StrategyContext;
use crate::error::OptimizeError;
use crate::solution::{population_diversity, Solution};
use rand::Rng;

/// Evolution strategy settings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EvolutionaryConfig {
    pub selection: Selection,

    /// Starting mutation step, as a fraction of each span.
    pub initial_sigma: f64,

    pub min_sigma: f64,

    pub max_sigma: f64,

    /// Multiplicative σ adjustment per generation, > 1.
    pub adapt_factor: f64,

    /// Population diversity (see [`population_diversity`]) that σ steers towards.
    pub target_diversity: f64,
}

impl Default for EvolutionaryConfig {
    fn default() -> Self {
        Self {
            selection: Selection::Tournament(3),
            initial_sigma: 0.1,
            min_sigma: 1e-4,
            max_sigma: 0.5,
            adapt_factor: 1.2,
            target_diversity: 0.05,
        }
    }
}

impl EvolutionaryConfig {
    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_initial_sigma(mut self, sigma: f64) -> Self {
        self.initial_sigma = sigma;
        self
    }

    pub fn with_sigma_bounds(mut self, min: f64, max: f64) -> Self {
        self.min_sigma = min;
        self.max_sigma = max;
        self
    }

    pub fn with_adapt_factor(mut self, factor: f64) -> Self {
        self.adapt_factor = factor;
        self
    }

    pub fn with_target_diversity(mut self, target: f64) -> Self {
        self.target_diversity = target.max(0.0);
        self
    }

    pub fn validate(&self) -> Result<(), OptimizeError> {
        if !(self.min_sigma > 0.0 && self.min_sigma <= self.max_sigma && self.max_sigma.is_finite()) {
            return Err(OptimizeError::config("sigma bounds must satisfy 0 < min <= max"));
        }
        if !(self.initial_sigma >= self.min_sigma && self.initial_sigma <= self.max_sigma) {
            return Err(OptimizeError::config("initial_sigma must lie within the sigma bounds"));
        }
        if !(self.adapt_factor.is_finite() && self.adapt_factor > 1.0) {
            return Err(OptimizeError::config("adapt_factor must be > 1"));
        }
        if !self.target_diversity.is_finite() {
            return Err(OptimizeError::config("target_diversity must be finite"));
        }
        Ok(())
    }
}

/// Evolution strategy step with an adaptive step size.
#[derive(Debug, Clone)]
pub struct EvolutionaryStrategy {
    config: EvolutionaryConfig,
    sigma: f64,
}

impl EvolutionaryStrategy {
    pub fn new(config: EvolutionaryConfig) -> Self {
        let sigma = config.initial_sigma;
        Self { config, sigma }
    }

    /// Current mutation step.
    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    pub fn next_generation<R: Rng>(&mut self, ctx: &StrategyContext<'_>, rng: &mut R) -> Vec<Solution> {
        let diversity = population_diversity(ctx.space, ctx.population);
        self.sigma = if diversity < self.config.target_diversity {
            self.sigma * self.config.adapt_factor
        } else {
            self.sigma / self.config.adapt_factor
        }
        .clamp(self.config.min_sigma, self.config.max_sigma);
        tracing::trace!(generation = ctx.generation, diversity, sigma = self.sigma, "step size adapted");

        let utilities = ctx.utilities();
        let pressure = ctx.params.selection_pressure;
        let gene_probability = ctx.params.mutation_rate.max(1.0 / ctx.space.dim().max(1) as f64);

        let mut next = Vec::with_capacity(ctx.offspring);
        while next.len() < ctx.offspring {
            let i = self.config.selection.select(&utilities, pressure, rng);
            let parent = &ctx.population[i];
            let mut genes = parent.attributes.clone();
            gaussian_mutation(&mut genes, ctx.space, self.sigma, gene_probability, rng);
            next.push(parent.derive(genes));
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objective::Direction;
    use crate::optimizer::OptimizationParameters;
    use crate::random::create_rng;
    use crate::solution::SearchSpace;

    #[test]
    fn test_sigma_widens_on_collapsed_population() {
        let space = SearchSpace::uniform(2, 0.0, 1.0);
        let params = OptimizationParameters::default().with_population_size(4);
        let population = vec![Solution::new(vec![0.5, 0.5]); 4];
        let fitness = vec![1.0; 4];
        let ctx = StrategyContext::new(&population, &fitness, &space, &params, Direction::Minimize, 1, 3);
        let mut es = EvolutionaryStrategy::new(EvolutionaryConfig::default());
        let mut rng = create_rng(42);
        let next = es.next_generation(&ctx, &mut rng);
        assert_eq!(next.len(), 3);
        assert!((es.sigma() - 0.12).abs() < 1e-12);
        // every child is mutated
        assert!(next.iter().all(|s| s.attributes != vec![0.5, 0.5]));
    }

    #[test]
    fn test_sigma_narrows_on_spread_population() {
        let space = SearchSpace::uniform(1, 0.0, 1.0);
        let params = OptimizationParameters::default().with_population_size(2);
        let population = vec![Solution::new(vec![0.0]), Solution::new(vec![1.0])];
        let fitness = vec![0.0, 1.0];
        let ctx = StrategyContext::new(&population, &fitness, &space, &params, Direction::Minimize, 1, 2);
        let mut es = EvolutionaryStrategy::new(EvolutionaryConfig::default().with_sigma_bounds(0.09, 0.5));
        let mut rng = create_rng(7);
        es.next_generation(&ctx, &mut rng);
        assert_eq!(es.sigma(), 0.09);
    }

    #[test]
    fn test_children_stay_near_a_single_parent() {
        let space = SearchSpace::uniform(1, 0.0, 1.0);
        let params = OptimizationParameters::default()
            .with_population_size(2)
            .with_crossover_rate(1.0);
        let population = vec![Solution::new(vec![0.0]), Solution::new(vec![1.0])];
        let fitness = vec![0.0, 0.0];
        let ctx = StrategyContext::new(&population, &fitness, &space, &params, Direction::Minimize, 1, 200);
        let config = EvolutionaryConfig::default()
            .with_selection(Selection::Tournament(1))
            .with_sigma_bounds(1e-4, 1e-4)
            .with_initial_sigma(1e-4);
        let mut es = EvolutionaryStrategy::new(config);
        let mut rng = create_rng(3);
        let next = es.next_generation(&ctx, &mut rng);
        assert_eq!(next.len(), 200);
        let blended = next
            .iter()
            .filter(|s| s.attributes[0] > 0.01 && s.attributes[0] < 0.99)
            .count();
        assert_eq!(blended, 0);
    }

    #[test]
    fn test_validate() {
        assert!(EvolutionaryConfig::default().validate().is_ok());
        assert!(EvolutionaryConfig::default().with_adapt_factor(1.0).validate().is_err());
        assert!(EvolutionaryConfig::default().with_initial_sigma(0.9).validate().is_err());
    }
}
