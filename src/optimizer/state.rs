//! Run state and statistics snapshots.

use crate::error::OptimizeError;
use crate::solution::Solution;
use std::fmt;
use std::time::Duration;

/// Lifecycle of one orchestrator.
///
/// ```text
/// Idle → Running → {Converged | Stagnated | IterationsExhausted} → Completed
///          ├──────→ Cancelled
///          └──────→ Failed
/// ```
///
/// The three intermediate stop states are observable only between the
/// loop's exit and result assembly; every normal run ends in `Completed`
/// and records why it stopped as a [`StopReason`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Converged,
    Stagnated,
    IterationsExhausted,
    Completed,
    Cancelled,
    Failed,
}

impl RunStatus {
    /// Whether the status ends a run.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Cancelled | RunStatus::Failed)
    }
}

/// Why the iteration loop exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StopReason {
    /// Improvement fell below tolerance for `patience` iterations.
    Converged,
    /// No new best for `max_stagnation` iterations.
    Stagnated,
    /// `max_iterations` reached.
    IterationsExhausted,
    /// Wall-clock budget exhausted.
    TimeLimit,
    /// `stop()` was honored.
    Cancelled,
}

impl StopReason {
    /// Status the run passes through before `Completed`.
    pub(crate) fn status(self) -> RunStatus {
        match self {
            StopReason::Converged => RunStatus::Converged,
            StopReason::Stagnated => RunStatus::Stagnated,
            StopReason::IterationsExhausted | StopReason::TimeLimit => RunStatus::IterationsExhausted,
            StopReason::Cancelled => RunStatus::Cancelled,
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::Converged => "converged",
            StopReason::Stagnated => "stagnated",
            StopReason::IterationsExhausted => "iterations exhausted",
            StopReason::TimeLimit => "time limit",
            StopReason::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Mutable state of the current (or last) run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunState {
    pub status: RunStatus,
    /// Number of completed iterations.
    pub iteration: usize,
    /// Best fitness of the last evaluated generation.
    pub current_fitness: Option<f64>,
    pub best_fitness: Option<f64>,
    pub best_solution: Option<Solution>,
    pub running: bool,
    pub converged: bool,
    pub stagnated: bool,
    /// Iterations since the last qualifying improvement.
    pub stagnation: usize,
    pub errors: Vec<OptimizeError>,
    /// Population awaiting evaluation.
    pub population: Vec<Solution>,
}

/// Aggregate counters for the current (or last) run.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunStats {
    pub generations: usize,
    /// Objective evaluations, including local-search moves.
    pub evaluations: usize,
    pub best_fitness: Option<f64>,
    /// Mean fitness of the last evaluated generation.
    pub mean_fitness: Option<f64>,
    /// Population diversity of the last evaluated generation.
    pub diversity: f64,
    /// Feasible individuals in the last evaluated generation.
    pub feasible: usize,
    pub elapsed: Duration,
    /// Event deliveries dropped because a subscriber's buffer was full.
    pub dropped_events: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!RunStatus::Idle.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::Converged.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }

    #[test]
    fn test_stop_reason_status() {
        assert_eq!(StopReason::Converged.status(), RunStatus::Converged);
        assert_eq!(StopReason::TimeLimit.status(), RunStatus::IterationsExhausted);
        assert_eq!(StopReason::Cancelled.status(), RunStatus::Cancelled);
        assert_eq!(StopReason::IterationsExhausted.to_string(), "iterations exhausted");
    }
}
