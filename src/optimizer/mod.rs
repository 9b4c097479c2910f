//! The optimization orchestrator.
//!
//! # Usage
//!
//! 1. Build an [`OptimizerConfig`] (search space, objective, constraints,
//!    parameters, algorithm).
//! 2. Wrap it with a scorer in an [`Optimizer`] and call
//!    [`initialize`](Optimizer::initialize).
//! 3. Call [`optimize`](Optimizer::optimize) with the target; observe
//!    progress through [`subscribe`](Optimizer::subscribe) or snapshots,
//!    cancel with [`stop`](Optimizer::stop).
//!
//! One optimizer runs at most one `optimize` call at a time. Within a
//! generation, solutions are scored in parallel on a dedicated worker pool
//! of `worker_count` threads.

mod config;
mod events;
mod result;
mod runner;
mod state;

pub use config::{OptimizationParameters, OptimizerConfig};
pub use events::{EventBus, EventKind, OptimizationEvent, Progress};
pub use result::{OptimizationResult, ResultMetadata};
pub use runner::{IterationOutcome, Optimizer, StopHandle};
pub use state::{RunState, RunStats, RunStatus, StopReason};
