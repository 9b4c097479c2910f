//! Constraint model and checker.
//!
//! Constraints are declared as symbolic expressions over named solution
//! attributes (or as references to registered evaluators), compiled once per
//! run, and checked independently: every constraint is always reported, even
//! after the first violation.
//!
//! Violations are never errors. They become penalties:
//! `penalty = violation × coefficient` when `violation > tolerance`, else 0.
//!
//! # Key Types
//!
//! - [`Constraint`]: declaration (kind, expression, tolerance, penalty, priority)
//! - [`ConstraintChecker`]: compiled set, produces [`ConstraintStatus`] values
//! - [`calculate_penalty`]: pure reduction used by the fitness evaluator

mod checker;
pub mod expr;
mod types;

pub use checker::{all_satisfied, by_priority, calculate_penalty, ConstraintChecker, EvaluatorRegistry};
pub use expr::ExpressionError;
pub use types::{Constraint, ConstraintEvaluator, ConstraintKind, ConstraintStatus};
