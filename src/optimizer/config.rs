//! Run configuration.
//!
//! [`OptimizationParameters`] holds the loop knobs shared by every strategy;
//! [`OptimizerConfig`] bundles them with the search space, objective,
//! constraints, convergence thresholds and the selected algorithm.

use crate::constraint::Constraint;
use crate::convergence::ConvergenceConfig;
use crate::error::OptimizeError;
use crate::objective::ObjectiveConfig;
use crate::solution::SearchSpace;
use crate::strategy::{AlgorithmKind, AlgorithmSettings};

/// Generation-loop parameters.
///
/// # Defaults
///
/// ```
/// use u_optengine::optimizer::OptimizationParameters;
///
/// let params = OptimizationParameters::default();
/// assert_eq!(params.population_size, 50);
/// assert_eq!(params.max_iterations, 200);
/// assert!(params.elitism);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OptimizationParameters {
    /// Number of individuals per generation.
    pub population_size: usize,

    /// Generation budget.
    pub max_iterations: usize,

    /// Probability of mutating an offspring (0.0–1.0).
    pub mutation_rate: f64,

    /// Probability of recombining a pair of parents (0.0–1.0). Used by the
    /// genetic strategy only.
    pub crossover_rate: f64,

    /// Selection sharpness, > 0. 1 is neutral.
    pub selection_pressure: f64,

    /// Carry the best-so-far solution into every generation unmodified.
    pub elitism: bool,

    /// Replace near-duplicate offspring with fresh random samples.
    pub diversity_preservation: bool,

    /// Refine each generation's best by coordinate perturbation.
    pub local_search: bool,

    /// Perturbation steps per local-search pass.
    pub local_search_steps: usize,
}

impl Default for OptimizationParameters {
    fn default() -> Self {
        Self {
            population_size: 50,
            max_iterations: 200,
            mutation_rate: 0.1,
            crossover_rate: 0.9,
            selection_pressure: 1.0,
            elitism: true,
            diversity_preservation: false,
            local_search: false,
            local_search_steps: 8,
        }
    }
}

impl OptimizationParameters {
    pub fn with_population_size(mut self, n: usize) -> Self {
        self.population_size = n;
        self
    }

    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    /// Sets the mutation rate, clamped to [0, 1].
    pub fn with_mutation_rate(mut self, rate: f64) -> Self {
        self.mutation_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Sets the crossover rate, clamped to [0, 1].
    pub fn with_crossover_rate(mut self, rate: f64) -> Self {
        self.crossover_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_selection_pressure(mut self, pressure: f64) -> Self {
        self.selection_pressure = pressure;
        self
    }

    pub fn with_elitism(mut self, enabled: bool) -> Self {
        self.elitism = enabled;
        self
    }

    pub fn with_diversity_preservation(mut self, enabled: bool) -> Self {
        self.diversity_preservation = enabled;
        self
    }

    pub fn with_local_search(mut self, enabled: bool) -> Self {
        self.local_search = enabled;
        self
    }

    pub fn with_local_search_steps(mut self, steps: usize) -> Self {
        self.local_search_steps = steps;
        self
    }

    /// Small population, short budget.
    ///
    /// - Population: 20, Iterations: 50
    pub fn fast() -> Self {
        Self {
            population_size: 20,
            max_iterations: 50,
            ..Self::default()
        }
    }

    /// - Population: 50, Iterations: 200, diversity preservation on
    pub fn balanced() -> Self {
        Self {
            population_size: 50,
            max_iterations: 200,
            diversity_preservation: true,
            ..Self::default()
        }
    }

    /// Large population, long budget, local search on.
    ///
    /// - Population: 100, Iterations: 500
    pub fn quality() -> Self {
        Self {
            population_size: 100,
            max_iterations: 500,
            diversity_preservation: true,
            local_search: true,
            ..Self::default()
        }
    }

    /// Picks a preset from the number of decision variables.
    ///
    /// - `dim < 5` → [`fast()`](Self::fast)
    /// - `5 ≤ dim < 20` → [`balanced()`](Self::balanced)
    /// - `dim ≥ 20` → [`quality()`](Self::quality)
    pub fn auto_select(dim: usize) -> Self {
        if dim < 5 {
            Self::fast()
        } else if dim < 20 {
            Self::balanced()
        } else {
            Self::quality()
        }
    }

    pub fn validate(&self) -> Result<(), OptimizeError> {
        if self.population_size == 0 {
            return Err(OptimizeError::config("population_size must be greater than 0"));
        }
        if self.max_iterations == 0 {
            return Err(OptimizeError::config("max_iterations must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(OptimizeError::config("mutation_rate must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.crossover_rate) {
            return Err(OptimizeError::config("crossover_rate must be in [0, 1]"));
        }
        if !(self.selection_pressure.is_finite() && self.selection_pressure > 0.0) {
            return Err(OptimizeError::config("selection_pressure must be finite and > 0"));
        }
        Ok(())
    }
}

/// Everything a run needs besides the scorer and the target.
///
/// # Examples
///
/// ```
/// use u_optengine::constraint::Constraint;
/// use u_optengine::objective::ObjectiveConfig;
/// use u_optengine::optimizer::{OptimizationParameters, OptimizerConfig};
/// use u_optengine::solution::SearchSpace;
/// use u_optengine::strategy::AlgorithmKind;
///
/// let config = OptimizerConfig::new(
///     SearchSpace::new().with_variable("x", 0.0, 10.0),
///     ObjectiveConfig::new("value").maximize(),
/// )
/// .with_constraint(Constraint::inequality("cap", "x <= 5").with_penalty(100.0))
/// .with_parameters(OptimizationParameters::fast())
/// .with_algorithm(AlgorithmKind::Genetic)
/// .with_workers(4)
/// .with_seed(7);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OptimizerConfig {
    pub space: SearchSpace,
    pub objective: ObjectiveConfig,
    /// Constraints compiled at `initialize`. `optimize` may supply its own set.
    pub constraints: Vec<Constraint>,
    pub parameters: OptimizationParameters,
    pub convergence: ConvergenceConfig,
    pub algorithm: AlgorithmKind,
    pub settings: AlgorithmSettings,

    /// Evaluation threads. 1 evaluates on the calling thread.
    pub worker_count: usize,

    /// `None` draws a fresh seed at `initialize`.
    pub seed: Option<u64>,

    /// Wall-clock budget in milliseconds, checked at iteration boundaries.
    pub time_limit_ms: Option<u64>,
}

impl OptimizerConfig {
    pub fn new(space: SearchSpace, objective: ObjectiveConfig) -> Self {
        Self {
            space,
            objective,
            constraints: Vec::new(),
            parameters: OptimizationParameters::default(),
            convergence: ConvergenceConfig::default(),
            algorithm: AlgorithmKind::default(),
            settings: AlgorithmSettings::default(),
            worker_count: std::thread::available_parallelism().map_or(1, |n| n.get()),
            seed: None,
            time_limit_ms: None,
        }
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn with_constraints(mut self, constraints: impl IntoIterator<Item = Constraint>) -> Self {
        self.constraints.extend(constraints);
        self
    }

    pub fn with_parameters(mut self, parameters: OptimizationParameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_convergence(mut self, convergence: ConvergenceConfig) -> Self {
        self.convergence = convergence;
        self
    }

    pub fn with_algorithm(mut self, algorithm: AlgorithmKind) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_settings(mut self, settings: AlgorithmSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the evaluation worker count (at least 1).
    pub fn with_workers(mut self, n: usize) -> Self {
        self.worker_count = n.max(1);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_time_limit_ms(mut self, ms: u64) -> Self {
        self.time_limit_ms = Some(ms);
        self
    }

    /// Validates every part except the constraints, which need the
    /// evaluator registry and are checked when compiled.
    pub fn validate(&self) -> Result<(), OptimizeError> {
        self.space.validate()?;
        self.objective.validate()?;
        self.parameters.validate()?;
        self.convergence.validate()?;
        self.settings.validate(self.algorithm)?;
        if self.worker_count == 0 {
            return Err(OptimizeError::config("worker_count must be at least 1"));
        }
        if self.time_limit_ms == Some(0) {
            return Err(OptimizeError::config("time_limit_ms must be positive or None"));
        }
        Ok(())
    }
}
