//! Convergence monitoring.
//!
//! [`assess`] is a pure predicate over the run's progress. It holds no
//! state; the orchestrator owns the stagnation counter and the best values.

/// Stopping thresholds.
///
/// # Examples
///
/// ```
/// use u_optengine::convergence::ConvergenceConfig;
///
/// let config = ConvergenceConfig::default()
///     .with_tolerance(1e-8)
///     .with_patience(30)
///     .with_max_stagnation(100);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConvergenceConfig {
    /// Improvement below this is considered negligible.
    pub tolerance: f64,

    /// Stagnating iterations required before declaring convergence.
    pub patience: usize,

    /// A new best resets the stagnation counter only if it improves by at
    /// least this much. 0 counts any strict improvement.
    pub min_improvement: f64,

    /// Iterations without a new best before declaring stagnation.
    ///
    /// 0 disables stagnation-based termination.
    pub max_stagnation: usize,

    /// Tighten the tolerance linearly (down to half) as the run progresses.
    pub adaptive: bool,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            patience: 20,
            min_improvement: 0.0,
            max_stagnation: 50,
            adaptive: false,
        }
    }
}

impl ConvergenceConfig {
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance.max(0.0);
        self
    }

    pub fn with_patience(mut self, patience: usize) -> Self {
        self.patience = patience;
        self
    }

    pub fn with_min_improvement(mut self, min_improvement: f64) -> Self {
        self.min_improvement = min_improvement.max(0.0);
        self
    }

    pub fn with_max_stagnation(mut self, max_stagnation: usize) -> Self {
        self.max_stagnation = max_stagnation;
        self
    }

    pub fn with_adaptive(mut self, adaptive: bool) -> Self {
        self.adaptive = adaptive;
        self
    }

    /// Tolerance in effect at `progress` ∈ [0, 1] through the iteration budget.
    pub fn effective_tolerance(&self, progress: f64) -> f64 {
        if self.adaptive {
            self.tolerance * (1.0 - 0.5 * progress.clamp(0.0, 1.0))
        } else {
            self.tolerance
        }
    }

    pub fn validate(&self) -> Result<(), crate::OptimizeError> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(crate::OptimizeError::config(
                "convergence tolerance must be finite and non-negative",
            ));
        }
        if !self.min_improvement.is_finite() || self.min_improvement < 0.0 {
            return Err(crate::OptimizeError::config(
                "min_improvement must be finite and non-negative",
            ));
        }
        Ok(())
    }
}

/// Verdict of the convergence monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConvergenceStatus {
    Continue,
    Converged,
    Stagnated,
}

/// Decides whether the run should stop.
///
/// - `Converged` when `|current_best − previous_best|` is below the
///   (possibly adaptive) tolerance **and** `stagnation ≥ patience`.
/// - `Stagnated` when `stagnation ≥ max_stagnation` (if enabled),
///   regardless of tolerance.
///
/// `previous_best` is `None` on the first iteration, which always continues.
pub fn assess(
    current_best: f64,
    previous_best: Option<f64>,
    stagnation: usize,
    progress: f64,
    config: &ConvergenceConfig,
) -> ConvergenceStatus {
    let Some(previous) = previous_best else {
        return ConvergenceStatus::Continue;
    };

    let delta = (current_best - previous).abs();
    if delta < config.effective_tolerance(progress) && stagnation >= config.patience {
        return ConvergenceStatus::Converged;
    }
    if config.max_stagnation > 0 && stagnation >= config.max_stagnation {
        return ConvergenceStatus::Stagnated;
    }
    ConvergenceStatus::Continue
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ConvergenceConfig {
        ConvergenceConfig::default()
            .with_tolerance(1e-3)
            .with_patience(3)
            .with_max_stagnation(10)
    }

    #[test]
    fn test_first_iteration_continues() {
        assert_eq!(assess(1.0, None, 100, 0.0, &cfg()), ConvergenceStatus::Continue);
    }

    #[test]
    fn test_converged_needs_patience() {
        let c = cfg();
        assert_eq!(assess(1.0, Some(1.0), 2, 0.5, &c), ConvergenceStatus::Continue);
        assert_eq!(assess(1.0, Some(1.0), 3, 0.5, &c), ConvergenceStatus::Converged);
    }

    #[test]
    fn test_large_improvement_is_not_convergence() {
        let c = cfg();
        assert_eq!(assess(0.5, Some(1.0), 5, 0.5, &c), ConvergenceStatus::Continue);
    }

    #[test]
    fn test_stagnation_regardless_of_tolerance() {
        let c = cfg().with_tolerance(0.0).with_patience(1000);
        assert_eq!(assess(1.0, Some(1.0), 9, 0.5, &c), ConvergenceStatus::Continue);
        assert_eq!(assess(1.0, Some(1.0), 10, 0.5, &c), ConvergenceStatus::Stagnated);
    }

    #[test]
    fn test_zero_tolerance_never_converges() {
        let c = cfg().with_tolerance(0.0).with_patience(1).with_max_stagnation(0);
        assert_eq!(assess(1.0, Some(1.0), 1000, 1.0, &c), ConvergenceStatus::Continue);
    }

    #[test]
    fn test_adaptive_tightens() {
        let c = cfg().with_adaptive(true);
        assert_eq!(c.effective_tolerance(0.0), 1e-3);
        assert!((c.effective_tolerance(1.0) - 5e-4).abs() < 1e-15);
        // 7e-4 is below the initial tolerance but above the final one
        assert_eq!(assess(1.0007, Some(1.0), 5, 0.0, &c), ConvergenceStatus::Converged);
        assert_eq!(assess(1.0007, Some(1.0), 5, 1.0, &c), ConvergenceStatus::Continue);
    }

    #[test]
    fn test_validate() {
        assert!(ConvergenceConfig::default().validate().is_ok());
        let mut c = ConvergenceConfig::default();
        c.tolerance = f64::NAN;
        assert!(c.validate().is_err());
    }
}
