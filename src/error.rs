//! Error taxonomy for the optimization engine.
//!
//! Constraint violations are **not** errors: they are folded into fitness as
//! penalties and reported through [`ConstraintStatus`](crate::constraint::ConstraintStatus).
//! Cancellation is not an error either; a cancelled run returns a result
//! with `success == false`.

/// Errors surfaced by the optimizer.
///
/// The type is `Clone` so the orchestrator can keep a copy in the run's
/// error log while returning the original to the caller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OptimizeError {
    /// Invalid configuration: population size, unknown algorithm, malformed
    /// constraint, unresolvable objective or evaluator. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// `optimize` was called while another run is active on the same instance.
    #[error("an optimization run is already in progress on this optimizer")]
    AlreadyRunning,

    /// The caller's scorer (or gradient) failed or returned a non-finite value.
    ///
    /// Fatal for the current run.
    #[error("evaluation failed in generation {generation} for individual {index}: {reason}")]
    Evaluation {
        /// 1-based generation in which the failure happened.
        generation: usize,
        /// Index of the individual within the population.
        index: usize,
        /// Message produced by the scorer.
        reason: String,
    },
}

impl OptimizeError {
    /// Shorthand for [`OptimizeError::Configuration`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

/// Error returned by a caller-supplied scorer or gradient function.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ScoreError {
    message: String,
}

impl ScoreError {
    /// Creates a new scorer error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for ScoreError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for ScoreError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}
