//! Fitness evaluation: caller score combined with constraint penalties.
//!
//! `raw = score(primary) + Σ wᵢ · score(secondaryᵢ)`, then the total
//! constraint penalty is applied against the objective's direction
//! (`raw − penalty` when maximizing, `raw + penalty` when minimizing).

use crate::constraint::{calculate_penalty, ConstraintChecker, ConstraintStatus};
use crate::error::ScoreError;
use crate::objective::{Objective, ObjectiveConfig, ScoreContext};
use crate::solution::Solution;

/// Full evaluation record for one solution.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Weighted objective score before penalties.
    pub raw_score: f64,
    /// Sum of constraint penalties.
    pub penalty: f64,
    /// Comparable fitness.
    pub fitness: f64,
    /// Per-constraint outcome.
    pub constraints: Vec<ConstraintStatus>,
}

impl Evaluation {
    /// Whether every constraint is satisfied.
    pub fn feasible(&self) -> bool {
        self.constraints.iter().all(|s| s.satisfied)
    }
}

/// Scores solutions against a target.
///
/// Holds only shared references, so one evaluator can be used from many
/// worker threads at once.
pub struct FitnessEvaluator<'a, O: Objective> {
    objective: &'a O,
    config: &'a ObjectiveConfig,
    checker: &'a ConstraintChecker,
}

impl<'a, O: Objective> FitnessEvaluator<'a, O> {
    pub fn new(objective: &'a O, config: &'a ObjectiveConfig, checker: &'a ConstraintChecker) -> Self {
        Self {
            objective,
            config,
            checker,
        }
    }

    /// Evaluates `solution` against `target`.
    ///
    /// Fails if the scorer fails or any objective score is non-finite.
    pub fn evaluate(&self, solution: &Solution, target: &O::Target) -> Result<Evaluation, ScoreError> {
        let mut raw = self.score_one(&self.config.primary, solution, target)?;
        for (name, weight) in self.config.secondary.iter().zip(&self.config.weights) {
            raw += weight * self.score_one(name, solution, target)?;
        }
        if !raw.is_finite() {
            return Err(ScoreError::new(format!("weighted score is not finite: {raw}")));
        }

        let constraints = self.checker.check(solution);
        let penalty = calculate_penalty(&constraints);
        let fitness = self.config.direction.penalize(raw, penalty);

        Ok(Evaluation {
            raw_score: raw,
            penalty,
            fitness,
            constraints,
        })
    }

    /// Gradient of the primary objective.
    pub fn gradient(&self, solution: &Solution, target: &O::Target) -> Result<Vec<f64>, ScoreError> {
        let ctx = ScoreContext {
            objective: &self.config.primary,
            parameters: &self.config.parameters,
        };
        let grad = self.objective.gradient(solution, target, &ctx)?;
        if grad.len() != solution.dim() {
            return Err(ScoreError::new(format!(
                "gradient has {} components, solution has {}",
                grad.len(),
                solution.dim()
            )));
        }
        if let Some(g) = grad.iter().find(|g| !g.is_finite()) {
            return Err(ScoreError::new(format!("gradient component is not finite: {g}")));
        }
        Ok(grad)
    }

    fn score_one(&self, name: &str, solution: &Solution, target: &O::Target) -> Result<f64, ScoreError> {
        let ctx = ScoreContext {
            objective: name,
            parameters: &self.config.parameters,
        };
        let score = self.objective.score(solution, target, &ctx)?;
        if score.is_finite() {
            Ok(score)
        } else {
            Err(ScoreError::new(format!("objective '{name}' returned {score}")))
        }
    }
}
