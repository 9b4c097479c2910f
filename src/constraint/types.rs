//! Constraint model types.

use crate::error::OptimizeError;
use crate::solution::Solution;

/// Category of a constraint.
///
/// The kind decides which expression shapes are accepted:
///
/// | Kind | Expression |
/// |---|---|
/// | `Equality` | exactly one `==` / `=` |
/// | `Inequality` | exactly one of `<`, `<=`, `>`, `>=` |
/// | `Bound` | a chained pair such as `0 <= x <= 5` |
/// | `Custom` | no expression; names a registered [`ConstraintEvaluator`] |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConstraintKind {
    Equality,
    Inequality,
    Bound,
    Custom,
}

/// A user-defined constraint evaluator referenced by [`ConstraintKind::Custom`].
///
/// Returns the violation magnitude of `solution`: 0 when satisfied, positive
/// otherwise. Negative or non-finite returns are treated as 0 and infinite
/// respectively.
pub trait ConstraintEvaluator: Send + Sync {
    fn violation(&self, solution: &Solution) -> f64;
}

impl<F> ConstraintEvaluator for F
where
    F: Fn(&Solution) -> f64 + Send + Sync,
{
    fn violation(&self, solution: &Solution) -> f64 {
        self(solution)
    }
}

/// A constraint on solutions.
///
/// # Examples
///
/// ```
/// use u_optengine::constraint::Constraint;
///
/// let c = Constraint::inequality("cap", "x + y <= 10")
///     .with_tolerance(1e-6)
///     .with_penalty(50.0)
///     .with_priority(1);
/// assert!(c.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Constraint {
    /// Identifier reported back in [`ConstraintStatus`].
    pub id: String,

    /// Constraint category.
    pub kind: ConstraintKind,

    /// Symbolic expression, or the evaluator name for `Custom`.
    pub expression: String,

    /// Violations up to this magnitude count as satisfied (≥ 0).
    pub tolerance: f64,

    /// Penalty per unit of violation (≥ 0).
    pub penalty: f64,

    /// Ordering key for diagnostic output (higher first).
    pub priority: i32,
}

impl Constraint {
    /// Creates a constraint with tolerance 0, penalty 1 and priority 0.
    pub fn new(id: impl Into<String>, kind: ConstraintKind, expression: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            expression: expression.into(),
            tolerance: 0.0,
            penalty: 1.0,
            priority: 0,
        }
    }

    pub fn equality(id: impl Into<String>, expression: impl Into<String>) -> Self {
        Self::new(id, ConstraintKind::Equality, expression)
    }

    pub fn inequality(id: impl Into<String>, expression: impl Into<String>) -> Self {
        Self::new(id, ConstraintKind::Inequality, expression)
    }

    pub fn bound(id: impl Into<String>, expression: impl Into<String>) -> Self {
        Self::new(id, ConstraintKind::Bound, expression)
    }

    /// A custom constraint evaluated by the evaluator registered under `evaluator`.
    pub fn custom(id: impl Into<String>, evaluator: impl Into<String>) -> Self {
        Self::new(id, ConstraintKind::Custom, evaluator)
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_penalty(mut self, penalty: f64) -> Self {
        self.penalty = penalty;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Checks the numeric invariants. Expression syntax is checked on compile.
    pub fn validate(&self) -> Result<(), OptimizeError> {
        if self.id.is_empty() {
            return Err(OptimizeError::config("constraint id is empty"));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(OptimizeError::config(format!(
                "constraint '{}': tolerance must be finite and >= 0, got {}",
                self.id, self.tolerance
            )));
        }
        if !self.penalty.is_finite() || self.penalty < 0.0 {
            return Err(OptimizeError::config(format!(
                "constraint '{}': penalty must be finite and >= 0, got {}",
                self.id, self.penalty
            )));
        }
        if self.expression.trim().is_empty() {
            return Err(OptimizeError::config(format!(
                "constraint '{}' has an empty expression",
                self.id
            )));
        }
        Ok(())
    }
}

/// Outcome of checking one constraint against one solution.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConstraintStatus {
    pub id: String,
    pub satisfied: bool,
    /// Violation magnitude; 0 when the constraint holds exactly.
    pub violation: f64,
    /// `violation × penalty coefficient` when unsatisfied, else 0.
    pub penalty: f64,
    pub priority: i32,
}
