//! Constrained multi-algorithm optimization engine.
//!
//! Searches a bounded parameter space for the solution that best satisfies
//! a caller-defined objective under equality, inequality, bound and custom
//! constraints. Six interchangeable strategies share one orchestrator:
//!
//! - **Genetic Algorithm**: roulette/tournament/rank selection, BLX-α
//!   crossover, Gaussian mutation.
//! - **Particle Swarm**: inertia-weighted velocity updates towards personal
//!   and global bests.
//! - **Simulated Annealing**: Metropolis acceptance with geometric, linear
//!   or Lundy–Mees cooling.
//! - **Bayesian**: kernel-regression surrogate with Expected Improvement.
//! - **Gradient**: steps along a caller-supplied gradient.
//! - **Evolution Strategy**: mutation only (no crossover), diversity-adaptive
//!   step size.
//!
//! Constraint violations never abort a run; they are converted into
//! penalties that worsen fitness in the objective's own direction. Scorer
//! failures are fatal to the run and surface as
//! [`OptimizeError::Evaluation`].
//!
//! # Architecture
//!
//! [`optimizer::Optimizer`] drives the generation loop. Each generation is
//! scored by [`fitness::FitnessEvaluator`] (scorer +
//! [`constraint::ConstraintChecker`]), advanced by a
//! [`strategy::Strategy`], judged by [`convergence::assess`] and logged to
//! [`history::OptimizationHistory`].

pub mod constraint;
pub mod convergence;
pub mod error;
pub mod fitness;
pub mod history;
pub mod objective;
pub mod optimizer;
pub mod random;
pub mod solution;
pub mod strategy;

pub use error::{OptimizeError, ScoreError};
pub use objective::{Direction, FnObjective, Objective, ObjectiveConfig, ScoreContext};
pub use optimizer::{OptimizationParameters, OptimizationResult, Optimizer, OptimizerConfig};
pub use solution::{SearchSpace, Solution};
pub use strategy::AlgorithmKind;
