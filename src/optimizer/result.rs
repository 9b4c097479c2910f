//! Run outcome.

use super::config::OptimizationParameters;
use super::state::StopReason;
use crate::constraint::ConstraintStatus;
use crate::history::OptimizationHistory;
use crate::solution::Solution;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Descriptive data about how a run was executed.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResultMetadata {
    /// Canonical algorithm tag.
    pub algorithm: String,
    pub parameters: OptimizationParameters,
    /// Seed the run was driven by.
    pub seed: u64,
    pub duration: Duration,
    /// Approximate bytes held by the history and final population.
    pub memory_estimate_bytes: usize,
    pub worker_count: usize,
    pub stop_reason: StopReason,
    pub evaluations: usize,
}

/// Returned by a run that did not fail.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OptimizationResult {
    /// `true` unless the run was cancelled or nothing was evaluated.
    pub success: bool,
    /// Best solution found.
    pub solution: Option<Solution>,
    /// Fitness of `solution`.
    pub fitness: Option<f64>,
    /// Completed iterations.
    pub iterations: usize,
    pub converged: bool,
    pub stagnated: bool,
    /// Constraints re-checked against `solution`.
    pub constraint_status: Vec<ConstraintStatus>,
    pub metadata: ResultMetadata,
    pub history: OptimizationHistory,
    pub completed_at: DateTime<Utc>,
}

impl OptimizationResult {
    /// Whether the reported solution satisfies every constraint.
    pub fn is_feasible(&self) -> bool {
        self.solution.is_some() && self.constraint_status.iter().all(|s| s.satisfied)
    }
}
