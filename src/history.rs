//! Per-iteration audit trail.
//!
//! The history is append-only and has no eviction policy: the full trail is
//! kept for post-run analysis, and memory is bounded by `max_iterations`.

use crate::constraint::ConstraintStatus;
use crate::solution::Solution;
use chrono::{DateTime, Utc};

/// Parallel, append-only sequences with one entry per completed iteration.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OptimizationHistory {
    pub iterations: Vec<usize>,
    /// Best-so-far fitness after each iteration.
    pub fitness: Vec<f64>,
    /// Best-so-far solution after each iteration.
    pub solutions: Vec<Solution>,
    /// Constraint statuses of that solution.
    pub constraint_status: Vec<Vec<ConstraintStatus>>,
    pub timestamps: Vec<DateTime<Utc>>,
}

/// Borrowed view of one history row.
#[derive(Debug, Clone, Copy)]
pub struct HistoryEntry<'a> {
    pub iteration: usize,
    pub fitness: f64,
    pub solution: &'a Solution,
    pub constraint_status: &'a [ConstraintStatus],
    pub timestamp: DateTime<Utc>,
}

impl OptimizationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a history with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            iterations: Vec::with_capacity(capacity),
            fitness: Vec::with_capacity(capacity),
            solutions: Vec::with_capacity(capacity),
            constraint_status: Vec::with_capacity(capacity),
            timestamps: Vec::with_capacity(capacity),
        }
    }

    /// Appends one row.
    pub fn record(
        &mut self,
        iteration: usize,
        fitness: f64,
        solution: Solution,
        constraint_status: Vec<ConstraintStatus>,
        timestamp: DateTime<Utc>,
    ) {
        self.iterations.push(iteration);
        self.fitness.push(fitness);
        self.solutions.push(solution);
        self.constraint_status.push(constraint_status);
        self.timestamps.push(timestamp);
    }

    pub fn len(&self) -> usize {
        self.iterations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.iterations.is_empty()
    }

    /// Row `index`, if present.
    pub fn get(&self, index: usize) -> Option<HistoryEntry<'_>> {
        Some(HistoryEntry {
            iteration: *self.iterations.get(index)?,
            fitness: self.fitness[index],
            solution: &self.solutions[index],
            constraint_status: &self.constraint_status[index],
            timestamp: self.timestamps[index],
        })
    }

    /// Most recent row.
    pub fn last(&self) -> Option<HistoryEntry<'_>> {
        self.len().checked_sub(1).and_then(|i| self.get(i))
    }

    /// Rows in recording order.
    pub fn entries(&self) -> impl Iterator<Item = HistoryEntry<'_>> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    /// Approximate heap footprint in bytes.
    pub fn estimated_bytes(&self) -> usize {
        let solutions: usize = self
            .solutions
            .iter()
            .map(|s| s.attributes.len() * std::mem::size_of::<f64>() + s.metadata.len() * 48)
            .sum();
        let statuses: usize = self
            .constraint_status
            .iter()
            .map(|v| v.len() * (std::mem::size_of::<ConstraintStatus>() + 16))
            .sum();
        self.len()
            * (std::mem::size_of::<usize>()
                + std::mem::size_of::<f64>()
                + std::mem::size_of::<Solution>()
                + std::mem::size_of::<Vec<ConstraintStatus>>()
                + std::mem::size_of::<DateTime<Utc>>())
            + solutions
            + statuses
    }
}
