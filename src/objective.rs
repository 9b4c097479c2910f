//! Objective definition and the caller-supplied scorer contract.
//!
//! The engine treats the scorer as an opaque, deterministic function of
//! `(solution, target)`. [`ObjectiveConfig`] names what is scored and in which
//! direction; secondary objectives are folded into one number with a
//! weighted sum (weights need not sum to 1).

use crate::error::{OptimizeError, ScoreError};
use crate::solution::Solution;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::marker::PhantomData;

/// Whether lower or higher objective values are better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    /// Lower is better.
    #[default]
    Minimize,
    /// Higher is better.
    Maximize,
}

impl Direction {
    /// Maps a fitness into a "higher is better" utility.
    pub fn utility(self, fitness: f64) -> f64 {
        match self {
            Direction::Minimize => -fitness,
            Direction::Maximize => fitness,
        }
    }

    /// Returns `true` if `a` is strictly better than `b`.
    pub fn is_better(self, a: f64, b: f64) -> bool {
        self.utility(a) > self.utility(b)
    }

    /// Signed improvement of `new` over `old` (positive when `new` is better).
    pub fn improvement(self, new: f64, old: f64) -> f64 {
        self.utility(new) - self.utility(old)
    }

    /// Applies a non-negative penalty so that it always worsens the fitness.
    pub fn penalize(self, raw: f64, penalty: f64) -> f64 {
        match self {
            Direction::Minimize => raw + penalty,
            Direction::Maximize => raw - penalty,
        }
    }

    /// Index of the best fitness value, or `None` for an empty slice.
    pub fn best_index(self, fitness: &[f64]) -> Option<usize> {
        fitness
            .iter()
            .enumerate()
            .max_by(|a, b| {
                self.utility(*a.1)
                    .partial_cmp(&self.utility(*b.1))
                    .unwrap_or(Ordering::Equal)
                    // prefer the earliest index among ties
                    .then(b.0.cmp(&a.0))
            })
            .map(|(i, _)| i)
    }
}

/// What is optimized.
///
/// # Examples
///
/// ```
/// use u_optengine::objective::{Direction, ObjectiveConfig};
///
/// let objective = ObjectiveConfig::new("drag")
///     .with_secondary("mass", 0.5)
///     .with_direction(Direction::Minimize)
///     .with_parameter("reynolds", 1.2e5);
/// assert!(objective.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObjectiveConfig {
    /// Name of the primary objective.
    pub primary: String,

    /// Names of secondary objectives, parallel to `weights`.
    pub secondary: Vec<String>,

    /// Non-negative weights of the secondary objectives.
    pub weights: Vec<f64>,

    /// Optimization direction.
    pub direction: Direction,

    /// Opaque parameters forwarded to the scorer.
    pub parameters: BTreeMap<String, f64>,
}

impl Default for ObjectiveConfig {
    fn default() -> Self {
        Self::new("objective")
    }
}

impl ObjectiveConfig {
    /// Creates a minimization objective with no secondaries.
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: Vec::new(),
            weights: Vec::new(),
            direction: Direction::Minimize,
            parameters: BTreeMap::new(),
        }
    }

    /// Adds a weighted secondary objective.
    pub fn with_secondary(mut self, name: impl Into<String>, weight: f64) -> Self {
        self.secondary.push(name.into());
        self.weights.push(weight);
        self
    }

    /// Sets the direction.
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Shorthand for `with_direction(Direction::Maximize)`.
    pub fn maximize(self) -> Self {
        self.with_direction(Direction::Maximize)
    }

    /// Adds a custom scorer parameter.
    pub fn with_parameter(mut self, key: impl Into<String>, value: f64) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// Validates the weight invariants.
    pub fn validate(&self) -> Result<(), OptimizeError> {
        if self.primary.is_empty() {
            return Err(OptimizeError::config("primary objective name is empty"));
        }
        if self.weights.len() != self.secondary.len() {
            return Err(OptimizeError::config(format!(
                "{} secondary objectives but {} weights",
                self.secondary.len(),
                self.weights.len()
            )));
        }
        if let Some(w) = self.weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(OptimizeError::config(format!(
                "objective weights must be finite and non-negative, got {w}"
            )));
        }
        Ok(())
    }
}

/// Context handed to the scorer for one call.
#[derive(Debug, Clone, Copy)]
pub struct ScoreContext<'a> {
    /// Which objective is being scored.
    pub objective: &'a str,
    /// Custom parameters from [`ObjectiveConfig::parameters`].
    pub parameters: &'a BTreeMap<String, f64>,
}

/// The caller-supplied scoring function.
///
/// Implementations must be deterministic for a given `(solution, target)`
/// within one run and are called concurrently from worker threads.
///
/// # Gradient precondition
///
/// The gradient strategy only works with differentiable objectives. An
/// implementation that supports it must override both [`has_gradient`]
/// and [`gradient`]; the optimizer refuses to initialize the gradient
/// strategy otherwise.
///
/// [`has_gradient`]: Objective::has_gradient
/// [`gradient`]: Objective::gradient
pub trait Objective: Send + Sync {
    /// What the solution is scored against.
    type Target: Sync;

    /// Scores `solution` for the objective named in `ctx`.
    fn score(
        &self,
        solution: &Solution,
        target: &Self::Target,
        ctx: &ScoreContext<'_>,
    ) -> Result<f64, ScoreError>;

    /// Whether this scorer can evaluate the named objective.
    ///
    /// Checked at `initialize` for the primary and every secondary objective.
    fn supports(&self, _objective: &str) -> bool {
        true
    }

    /// Whether [`gradient`](Objective::gradient) is implemented.
    fn has_gradient(&self) -> bool {
        false
    }

    /// Gradient of the primary objective with respect to the attributes.
    fn gradient(
        &self,
        _solution: &Solution,
        _target: &Self::Target,
        _ctx: &ScoreContext<'_>,
    ) -> Result<Vec<f64>, ScoreError> {
        Err(ScoreError::new("objective does not provide a gradient"))
    }
}

/// Adapts a closure `Fn(&Solution, &T) -> f64` into an [`Objective`].
///
/// The closure scores every objective name identically; use a custom
/// [`Objective`] implementation for multi-objective scoring.
pub struct FnObjective<F, T> {
    func: F,
    _target: PhantomData<fn(&T)>,
}

impl<F, T> FnObjective<F, T>
where
    F: Fn(&Solution, &T) -> f64 + Send + Sync,
    T: Sync,
{
    /// Wraps a scoring closure.
    pub fn new(func: F) -> Self {
        Self {
            func,
            _target: PhantomData,
        }
    }
}

impl<F, T> Objective for FnObjective<F, T>
where
    F: Fn(&Solution, &T) -> f64 + Send + Sync,
    T: Sync,
{
    type Target = T;

    fn score(&self, solution: &Solution, target: &T, _ctx: &ScoreContext<'_>) -> Result<f64, ScoreError> {
        Ok((self.func)(solution, target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_orientation() {
        assert!(Direction::Minimize.is_better(1.0, 2.0));
        assert!(Direction::Maximize.is_better(2.0, 1.0));
        assert_eq!(Direction::Minimize.improvement(1.0, 3.0), 2.0);
        assert_eq!(Direction::Maximize.improvement(1.0, 3.0), -2.0);
        assert_eq!(Direction::Minimize.penalize(1.0, 2.0), 3.0);
        assert_eq!(Direction::Maximize.penalize(1.0, 2.0), -1.0);
    }

    #[test]
    fn test_best_index() {
        let f = [3.0, 1.0, 5.0, 1.0];
        assert_eq!(Direction::Minimize.best_index(&f), Some(1));
        assert_eq!(Direction::Maximize.best_index(&f), Some(2));
        assert_eq!(Direction::Minimize.best_index(&[]), None);
    }

    #[test]
    fn test_validate_weights() {
        let mut cfg = ObjectiveConfig::new("cost").with_secondary("time", 2.0);
        assert!(cfg.validate().is_ok());
        cfg.weights.push(1.0);
        assert!(cfg.validate().is_err());

        let negative = ObjectiveConfig::new("cost").with_secondary("time", -1.0);
        assert!(negative.validate().is_err());

        assert!(ObjectiveConfig::new("").validate().is_err());
    }

    #[test]
    fn test_fn_objective() {
        let obj = FnObjective::new(|s: &Solution, offset: &f64| s.attributes[0] + offset);
        let params = BTreeMap::new();
        let ctx = ScoreContext {
            objective: "any",
            parameters: &params,
        };
        let score = obj.score(&Solution::new(vec![2.0]), &0.5, &ctx);
        assert_eq!(score, Ok(2.5));
        assert!(!obj.has_gradient());
        assert!(obj.gradient(&Solution::new(vec![2.0]), &0.5, &ctx).is_err());
    }
}
