//! Search strategies.
//!
//! A strategy turns an evaluated population into the next candidate
//! population. Each strategy is a closed variant of [`Strategy`]; all of
//! them share the same generation-step contract:
//!
//! - the input population and fitness are read-only;
//! - the output holds exactly `ctx.offspring` fresh solutions, every one
//!   inside the search space;
//! - randomness comes only from the supplied generator, so runs are
//!   reproducible under a fixed seed.
//!
//! GA, Bayesian and evolution-strategy steps leave the first slot of the
//! next population to the orchestrator's elite; PSO, annealing and gradient
//! steps produce a full population whose first slot the elite overwrites.

mod annealing;
mod bayesian;
mod evolutionary;
mod genetic;
mod gradient;
pub mod operators;
pub mod selection;
mod swarm;

pub use annealing::{AnnealingConfig, AnnealingStrategy, CoolingSchedule};
pub use bayesian::{BayesianConfig, BayesianStrategy};
pub use evolutionary::{EvolutionaryConfig, EvolutionaryStrategy};
pub use genetic::{GeneticConfig, GeneticStrategy};
pub use gradient::{GradientConfig, GradientStrategy};
pub use selection::Selection;
pub use swarm::{SwarmConfig, SwarmStrategy};

use crate::error::{OptimizeError, ScoreError};
use crate::objective::Direction;
use crate::optimizer::OptimizationParameters;
use crate::solution::{SearchSpace, Solution};
use rand::Rng;
use std::fmt;
use std::str::FromStr;

/// The closed set of supported search algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum AlgorithmKind {
    #[default]
    Genetic,
    ParticleSwarm,
    SimulatedAnnealing,
    Bayesian,
    Gradient,
    Evolutionary,
}

impl AlgorithmKind {
    pub const ALL: [AlgorithmKind; 6] = [
        AlgorithmKind::Genetic,
        AlgorithmKind::ParticleSwarm,
        AlgorithmKind::SimulatedAnnealing,
        AlgorithmKind::Bayesian,
        AlgorithmKind::Gradient,
        AlgorithmKind::Evolutionary,
    ];

    /// Canonical tag.
    pub fn name(self) -> &'static str {
        match self {
            AlgorithmKind::Genetic => "genetic",
            AlgorithmKind::ParticleSwarm => "particle_swarm",
            AlgorithmKind::SimulatedAnnealing => "simulated_annealing",
            AlgorithmKind::Bayesian => "bayesian",
            AlgorithmKind::Gradient => "gradient",
            AlgorithmKind::Evolutionary => "evolutionary",
        }
    }

    /// Whether the orchestrator reserves slot 0 of the next population.
    pub fn reserves_elite_slot(self) -> bool {
        matches!(
            self,
            AlgorithmKind::Genetic | AlgorithmKind::Bayesian | AlgorithmKind::Evolutionary
        )
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AlgorithmKind {
    type Err = OptimizeError;

    /// Parses a tag, case-insensitively. `-` and ` ` are read as `_`.
    ///
    /// ```
    /// use u_optengine::strategy::AlgorithmKind;
    ///
    /// assert_eq!("PSO".parse::<AlgorithmKind>().unwrap(), AlgorithmKind::ParticleSwarm);
    /// assert!("hill_climbing".parse::<AlgorithmKind>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match tag.as_str() {
            "genetic" | "ga" => Ok(AlgorithmKind::Genetic),
            "pso" | "particle_swarm" => Ok(AlgorithmKind::ParticleSwarm),
            "simulated_annealing" | "annealing" | "sa" => Ok(AlgorithmKind::SimulatedAnnealing),
            "bayesian" => Ok(AlgorithmKind::Bayesian),
            "gradient" => Ok(AlgorithmKind::Gradient),
            "evolutionary" | "es" => Ok(AlgorithmKind::Evolutionary),
            _ => Err(OptimizeError::config(format!("unknown algorithm '{s}'"))),
        }
    }
}

/// Per-algorithm settings. Only the entry matching the selected
/// [`AlgorithmKind`] is used.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AlgorithmSettings {
    pub genetic: GeneticConfig,
    pub swarm: SwarmConfig,
    pub annealing: AnnealingConfig,
    pub bayesian: BayesianConfig,
    pub gradient: GradientConfig,
    pub evolutionary: EvolutionaryConfig,
}

impl AlgorithmSettings {
    /// Validates the settings of `kind`.
    pub fn validate(&self, kind: AlgorithmKind) -> Result<(), OptimizeError> {
        match kind {
            AlgorithmKind::Genetic => self.genetic.validate(),
            AlgorithmKind::ParticleSwarm => self.swarm.validate(),
            AlgorithmKind::SimulatedAnnealing => self.annealing.validate(),
            AlgorithmKind::Bayesian => self.bayesian.validate(),
            AlgorithmKind::Gradient => self.gradient.validate(),
            AlgorithmKind::Evolutionary => self.evolutionary.validate(),
        }
    }
}

/// Gradient oracle handed to strategies that need one.
pub type GradientFn<'a> = dyn Fn(&Solution) -> Result<Vec<f64>, ScoreError> + Sync + 'a;

/// Read-only view of one evaluated generation.
pub struct StrategyContext<'a> {
    pub population: &'a [Solution],
    /// Penalized fitness, index-aligned with `population`.
    pub fitness: &'a [f64],
    pub space: &'a SearchSpace,
    pub params: &'a OptimizationParameters,
    pub direction: Direction,
    /// 1-based index of the generation that was just evaluated.
    pub generation: usize,
    /// Number of solutions the strategy must return.
    pub offspring: usize,
    pub gradient: Option<&'a GradientFn<'a>>,
}

impl<'a> StrategyContext<'a> {
    pub fn new(
        population: &'a [Solution],
        fitness: &'a [f64],
        space: &'a SearchSpace,
        params: &'a OptimizationParameters,
        direction: Direction,
        generation: usize,
        offspring: usize,
    ) -> Self {
        Self {
            population,
            fitness,
            space,
            params,
            direction,
            generation,
            offspring,
            gradient: None,
        }
    }

    /// Fitness oriented so that higher is better.
    pub fn utilities(&self) -> Vec<f64> {
        self.fitness.iter().map(|&f| self.direction.utility(f)).collect()
    }
}

/// A configured strategy together with its per-run state.
#[derive(Debug, Clone)]
pub enum Strategy {
    Genetic(GeneticStrategy),
    ParticleSwarm(SwarmStrategy),
    SimulatedAnnealing(AnnealingStrategy),
    Bayesian(BayesianStrategy),
    Gradient(GradientStrategy),
    Evolutionary(EvolutionaryStrategy),
}

impl Strategy {
    /// Creates a fresh strategy of `kind`.
    pub fn new(kind: AlgorithmKind, settings: &AlgorithmSettings) -> Self {
        match kind {
            AlgorithmKind::Genetic => Strategy::Genetic(GeneticStrategy::new(settings.genetic.clone())),
            AlgorithmKind::ParticleSwarm => Strategy::ParticleSwarm(SwarmStrategy::new(settings.swarm.clone())),
            AlgorithmKind::SimulatedAnnealing => {
                Strategy::SimulatedAnnealing(AnnealingStrategy::new(settings.annealing.clone()))
            }
            AlgorithmKind::Bayesian => Strategy::Bayesian(BayesianStrategy::new(settings.bayesian.clone())),
            AlgorithmKind::Gradient => Strategy::Gradient(GradientStrategy::new(settings.gradient.clone())),
            AlgorithmKind::Evolutionary => {
                Strategy::Evolutionary(EvolutionaryStrategy::new(settings.evolutionary.clone()))
            }
        }
    }

    pub fn kind(&self) -> AlgorithmKind {
        match self {
            Strategy::Genetic(_) => AlgorithmKind::Genetic,
            Strategy::ParticleSwarm(_) => AlgorithmKind::ParticleSwarm,
            Strategy::SimulatedAnnealing(_) => AlgorithmKind::SimulatedAnnealing,
            Strategy::Bayesian(_) => AlgorithmKind::Bayesian,
            Strategy::Gradient(_) => AlgorithmKind::Gradient,
            Strategy::Evolutionary(_) => AlgorithmKind::Evolutionary,
        }
    }

    /// Produces the next candidate population.
    pub fn next_generation<R: Rng>(
        &mut self,
        ctx: &StrategyContext<'_>,
        rng: &mut R,
    ) -> Result<Vec<Solution>, OptimizeError> {
        let next = match self {
            Strategy::Genetic(s) => s.next_generation(ctx, rng),
            Strategy::ParticleSwarm(s) => s.next_generation(ctx, rng),
            Strategy::SimulatedAnnealing(s) => s.next_generation(ctx, rng),
            Strategy::Bayesian(s) => s.next_generation(ctx, rng),
            Strategy::Gradient(s) => s.next_generation(ctx)?,
            Strategy::Evolutionary(s) => s.next_generation(ctx, rng),
        };
        debug_assert_eq!(next.len(), ctx.offspring);
        Ok(next)
    }
}
