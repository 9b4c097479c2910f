//! Constraint checking and penalty reduction.

use super::expr::{Comparison, Relation};
use super::types::{Constraint, ConstraintEvaluator, ConstraintKind, ConstraintStatus};
use crate::error::OptimizeError;
use crate::solution::{SearchSpace, Solution};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of named custom evaluators.
pub type EvaluatorRegistry = HashMap<String, Arc<dyn ConstraintEvaluator>>;

enum Rule {
    Expression(Relation),
    Custom(Arc<dyn ConstraintEvaluator>),
}

struct Compiled {
    constraint: Constraint,
    rule: Rule,
}

/// Evaluates a fixed set of compiled constraints.
///
/// Built once per run; checking is read-only and can be shared across
/// evaluation workers.
pub struct ConstraintChecker {
    compiled: Vec<Compiled>,
}

impl std::fmt::Debug for ConstraintChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstraintChecker")
            .field(
                "constraints",
                &self.compiled.iter().map(|c| &c.constraint.id).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ConstraintChecker {
    /// A checker with no constraints.
    pub fn empty() -> Self {
        Self {
            compiled: Vec::new(),
        }
    }

    /// Validates and compiles `constraints` against `space`.
    ///
    /// Fails with [`OptimizeError::Configuration`] on a malformed expression,
    /// an expression shape that does not match the constraint kind, an
    /// unknown variable, or an unregistered custom evaluator.
    pub fn compile(
        constraints: &[Constraint],
        space: &SearchSpace,
        evaluators: &EvaluatorRegistry,
    ) -> Result<Self, OptimizeError> {
        let mut compiled = Vec::with_capacity(constraints.len());
        for (i, c) in constraints.iter().enumerate() {
            c.validate()?;
            if constraints[..i].iter().any(|o| o.id == c.id) {
                return Err(OptimizeError::config(format!(
                    "duplicate constraint id '{}'",
                    c.id
                )));
            }
            let rule = match c.kind {
                ConstraintKind::Custom => {
                    let evaluator = evaluators.get(c.expression.trim()).ok_or_else(|| {
                        OptimizeError::config(format!(
                            "constraint '{}': no evaluator registered as '{}'",
                            c.id, c.expression
                        ))
                    })?;
                    Rule::Custom(Arc::clone(evaluator))
                }
                kind => {
                    let relation = Relation::parse(&c.expression, space).map_err(|e| {
                        OptimizeError::config(format!("constraint '{}': {e}", c.id))
                    })?;
                    check_shape(c, kind, relation.comparisons())?;
                    Rule::Expression(relation)
                }
            };
            compiled.push(Compiled {
                constraint: c.clone(),
                rule,
            });
        }
        Ok(Self { compiled })
    }

    /// Number of constraints.
    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }

    /// Checks every constraint against `solution`.
    ///
    /// Never short-circuits: one status per constraint, in definition order.
    pub fn check(&self, solution: &Solution) -> Vec<ConstraintStatus> {
        self.compiled
            .iter()
            .map(|c| {
                let raw = match &c.rule {
                    Rule::Expression(rel) => rel.violation(&solution.attributes),
                    Rule::Custom(ev) => ev.violation(solution),
                };
                let violation = if raw.is_nan() { f64::INFINITY } else { raw.max(0.0) };
                let satisfied = violation <= c.constraint.tolerance;
                // a zero coefficient must not turn an infinite violation into NaN
                let penalty = if satisfied || c.constraint.penalty == 0.0 {
                    0.0
                } else {
                    violation * c.constraint.penalty
                };
                ConstraintStatus {
                    id: c.constraint.id.clone(),
                    satisfied,
                    violation,
                    penalty,
                    priority: c.constraint.priority,
                }
            })
            .collect()
    }
}

/// Total penalty of a set of statuses.
pub fn calculate_penalty(statuses: &[ConstraintStatus]) -> f64 {
    statuses.iter().map(|s| s.penalty).sum()
}

/// Whether every status is satisfied.
pub fn all_satisfied(statuses: &[ConstraintStatus]) -> bool {
    statuses.iter().all(|s| s.satisfied)
}

/// Statuses sorted for display: highest priority first, then by id.
pub fn by_priority(statuses: &[ConstraintStatus]) -> Vec<ConstraintStatus> {
    let mut sorted = statuses.to_vec();
    sorted.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
    sorted
}

fn check_shape(
    c: &Constraint,
    kind: ConstraintKind,
    comparisons: &[Comparison],
) -> Result<(), OptimizeError> {
    let ok = match kind {
        ConstraintKind::Equality => comparisons == [Comparison::Equal],
        ConstraintKind::Inequality => comparisons.len() == 1 && comparisons[0].is_inequality(),
        ConstraintKind::Bound => comparisons.len() == 2 && comparisons.iter().all(|c| c.is_inequality()),
        ConstraintKind::Custom => true,
    };
    if ok {
        Ok(())
    } else {
        Err(OptimizeError::config(format!(
            "constraint '{}': expression '{}' does not match kind {:?}",
            c.id, c.expression, kind
        )))
    }
}
