//! Solution representation and the parameter domain it lives in.
//!
//! A [`Solution`] is an attribute vector plus free-form metadata. Strategies
//! never modify a solution owned by a previous generation: offspring are
//! cloned first and then perturbed, so history snapshots stay valid.

use rand::Rng;
use std::collections::BTreeMap;

/// A candidate point in the search space.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Solution {
    /// Numeric parameter vector, one entry per [`Variable`] of the space.
    pub attributes: Vec<f64>,

    /// Free-form configuration carried alongside the attributes.
    ///
    /// Offspring inherit the metadata of their first parent.
    pub metadata: BTreeMap<String, String>,
}

impl Solution {
    /// Creates a solution with empty metadata.
    pub fn new(attributes: Vec<f64>) -> Self {
        Self {
            attributes,
            metadata: BTreeMap::new(),
        }
    }

    /// Attaches a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Creates a new solution that carries this one's metadata but different attributes.
    pub fn derive(&self, attributes: Vec<f64>) -> Self {
        Self {
            attributes,
            metadata: self.metadata.clone(),
        }
    }

    /// Number of attributes.
    pub fn dim(&self) -> usize {
        self.attributes.len()
    }
}

/// A named, bounded decision variable.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Variable {
    /// Name used by constraint expressions.
    pub name: String,
    /// Inclusive lower bound.
    pub lower: f64,
    /// Inclusive upper bound.
    pub upper: f64,
}

impl Variable {
    /// Creates a new variable.
    pub fn new(name: impl Into<String>, lower: f64, upper: f64) -> Self {
        Self {
            name: name.into(),
            lower,
            upper,
        }
    }

    /// Width of the domain.
    pub fn span(&self) -> f64 {
        self.upper - self.lower
    }
}

/// The parameter domain: an ordered list of bounded variables.
///
/// # Examples
///
/// ```
/// use u_optengine::solution::SearchSpace;
///
/// let space = SearchSpace::new()
///     .with_variable("x", 0.0, 10.0)
///     .with_variable("y", -1.0, 1.0);
/// assert_eq!(space.dim(), 2);
/// assert_eq!(space.index_of("y"), Some(1));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SearchSpace {
    /// The variables, in attribute order.
    pub variables: Vec<Variable>,
}

impl SearchSpace {
    /// Creates an empty space.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a space of `dim` variables named `x0..x{dim-1}` sharing one range.
    pub fn uniform(dim: usize, lower: f64, upper: f64) -> Self {
        Self {
            variables: (0..dim)
                .map(|i| Variable::new(format!("x{i}"), lower, upper))
                .collect(),
        }
    }

    /// Appends a variable.
    pub fn with_variable(mut self, name: impl Into<String>, lower: f64, upper: f64) -> Self {
        self.variables.push(Variable::new(name, lower, upper));
        self
    }

    /// Number of variables.
    pub fn dim(&self) -> usize {
        self.variables.len()
    }

    /// Position of a variable by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|v| v.name == name)
    }

    /// Samples a uniformly random solution.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Solution {
        let attributes = self
            .variables
            .iter()
            .map(|v| {
                if v.span() > 0.0 {
                    rng.random_range(v.lower..=v.upper)
                } else {
                    v.lower
                }
            })
            .collect();
        Solution::new(attributes)
    }

    /// Clamps every attribute into its variable's bounds.
    pub fn clamp(&self, attributes: &mut [f64]) {
        for (x, v) in attributes.iter_mut().zip(&self.variables) {
            *x = x.clamp(v.lower, v.upper);
        }
    }

    /// Maps attributes into the unit hypercube.
    pub fn normalize(&self, attributes: &[f64]) -> Vec<f64> {
        attributes
            .iter()
            .zip(&self.variables)
            .map(|(&x, v)| {
                let span = v.span();
                if span > 0.0 {
                    (x - v.lower) / span
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Maps unit-hypercube coordinates back into the domain.
    pub fn denormalize(&self, unit: &[f64]) -> Vec<f64> {
        unit.iter()
            .zip(&self.variables)
            .map(|(&u, v)| v.lower + u.clamp(0.0, 1.0) * v.span())
            .collect()
    }

    /// Euclidean distance between two points in normalized coordinates.
    pub fn normalized_distance(&self, a: &[f64], b: &[f64]) -> f64 {
        a.iter()
            .zip(b)
            .zip(&self.variables)
            .map(|((&x, &y), v)| {
                let span = v.span();
                if span > 0.0 {
                    let d = (x - y) / span;
                    d * d
                } else {
                    0.0
                }
            })
            .sum::<f64>()
            .sqrt()
    }

    /// Validates names and bounds.
    pub fn validate(&self) -> Result<(), crate::OptimizeError> {
        use crate::OptimizeError;

        if self.variables.is_empty() {
            return Err(OptimizeError::config("search space has no variables"));
        }
        for (i, v) in self.variables.iter().enumerate() {
            if v.name.is_empty() {
                return Err(OptimizeError::config(format!("variable {i} has an empty name")));
            }
            let finite = v.lower.is_finite() && v.upper.is_finite() && v.span().is_finite();
            if !finite || v.lower > v.upper {
                return Err(OptimizeError::config(format!(
                    "variable '{}' has invalid bounds [{}, {}]",
                    v.name, v.lower, v.upper
                )));
            }
            if self.variables[..i].iter().any(|o| o.name == v.name) {
                return Err(OptimizeError::config(format!(
                    "duplicate variable name '{}'",
                    v.name
                )));
            }
        }
        Ok(())
    }
}

/// Mean per-variable standard deviation of a population, relative to each span.
///
/// 0 means every individual is identical; values around 0.29 correspond to a
/// uniform spread over the whole domain.
pub fn population_diversity(space: &SearchSpace, population: &[Solution]) -> f64 {
    let n = population.len();
    if n < 2 || space.dim() == 0 {
        return 0.0;
    }
    let mut total = 0.0;
    for (j, v) in space.variables.iter().enumerate() {
        let span = v.span();
        if span <= 0.0 {
            continue;
        }
        let mean = population.iter().map(|s| s.attributes[j]).sum::<f64>() / n as f64;
        let var = population
            .iter()
            .map(|s| {
                let d = s.attributes[j] - mean;
                d * d
            })
            .sum::<f64>()
            / n as f64;
        total += var.sqrt() / span;
    }
    total / space.dim() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::create_rng;

    #[test]
    fn test_sample_within_bounds() {
        let space = SearchSpace::new()
            .with_variable("a", -2.0, 3.0)
            .with_variable("b", 10.0, 10.0);
        let mut rng = create_rng(1);
        for _ in 0..500 {
            let s = space.sample(&mut rng);
            assert!((-2.0..=3.0).contains(&s.attributes[0]));
            assert_eq!(s.attributes[1], 10.0);
        }
    }

    #[test]
    fn test_clamp_and_normalize() {
        let space = SearchSpace::uniform(2, 0.0, 10.0);
        let mut attrs = vec![-5.0, 15.0];
        space.clamp(&mut attrs);
        assert_eq!(attrs, vec![0.0, 10.0]);
        assert_eq!(space.normalize(&[5.0, 2.5]), vec![0.5, 0.25]);
        assert_eq!(space.denormalize(&[0.5, 0.25]), vec![5.0, 2.5]);
    }

    #[test]
    fn test_derive_keeps_metadata_and_original() {
        let parent = Solution::new(vec![1.0, 2.0]).with_metadata("shape", "cube");
        let child = parent.derive(vec![3.0, 4.0]);
        assert_eq!(child.metadata.get("shape").map(String::as_str), Some("cube"));
        assert_eq!(parent.attributes, vec![1.0, 2.0]);
    }

    #[test]
    fn test_validate_rejects_bad_spaces() {
        assert!(SearchSpace::new().validate().is_err());
        assert!(SearchSpace::new()
            .with_variable("x", 1.0, 0.0)
            .validate()
            .is_err());
        assert!(SearchSpace::new()
            .with_variable("x", 0.0, 1.0)
            .with_variable("x", 0.0, 1.0)
            .validate()
            .is_err());
        assert!(SearchSpace::new()
            .with_variable("x", 0.0, f64::INFINITY)
            .validate()
            .is_err());
        // finite bounds whose span overflows
        assert!(SearchSpace::new()
            .with_variable("x", -1e308, 1e308)
            .validate()
            .is_err());
        assert!(SearchSpace::uniform(3, -1.0, 1.0).validate().is_ok());
    }

    #[test]
    fn test_diversity() {
        let space = SearchSpace::uniform(1, 0.0, 1.0);
        let same = vec![Solution::new(vec![0.5]); 4];
        assert_eq!(population_diversity(&space, &same), 0.0);
        let spread = vec![Solution::new(vec![0.0]), Solution::new(vec![1.0])];
        assert!((population_diversity(&space, &spread) - 0.5).abs() < 1e-12);
    }
}
