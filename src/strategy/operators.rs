//! Real-valued variation operators.
//!
//! All operators write into freshly allocated vectors or into a clone the
//! caller already owns; parents are only read.
//!
//! # References
//!
//! - Eshelman & Schaffer (1993), "Real-Coded Genetic Algorithms and
//!   Interval-Schemata" (BLX-α)
//! - Bäck & Schwefel (1993), "An Overview of Evolutionary Algorithms for
//!   Parameter Optimization" (Gaussian mutation)

use crate::random::gaussian;
use crate::solution::SearchSpace;
use rand::Rng;

/// Blend crossover (BLX-α).
///
/// Each child gene is drawn uniformly from `[lo − α·d, hi + α·d]` where
/// `lo`/`hi` are the parents' genes and `d = hi − lo`. Children are clamped
/// into the space.
///
/// # Panics
/// Panics if the parents have different lengths.
pub fn blend_crossover<R: Rng>(
    parent1: &[f64],
    parent2: &[f64],
    alpha: f64,
    space: &SearchSpace,
    rng: &mut R,
) -> (Vec<f64>, Vec<f64>) {
    assert_eq!(parent1.len(), parent2.len(), "parents must have equal length");

    let mut child1 = Vec::with_capacity(parent1.len());
    let mut child2 = Vec::with_capacity(parent1.len());
    for (&a, &b) in parent1.iter().zip(parent2) {
        let lo = a.min(b);
        let hi = a.max(b);
        let range = hi - lo;
        if range < 1e-15 {
            child1.push(lo);
            child2.push(lo);
        } else {
            let (from, to) = (lo - alpha * range, hi + alpha * range);
            child1.push(rng.random_range(from..to));
            child2.push(rng.random_range(from..to));
        }
    }
    space.clamp(&mut child1);
    space.clamp(&mut child2);
    (child1, child2)
}

/// Gaussian mutation.
///
/// Each gene is perturbed with probability `gene_probability` by
/// `N(0, (scale · span)²)`. At least one gene is always perturbed. The
/// result is clamped into the space.
pub fn gaussian_mutation<R: Rng>(
    genes: &mut [f64],
    space: &SearchSpace,
    scale: f64,
    gene_probability: f64,
    rng: &mut R,
) {
    let n = genes.len();
    if n == 0 {
        return;
    }
    let p = gene_probability.clamp(0.0, 1.0);
    let mut mutated = false;
    for (x, v) in genes.iter_mut().zip(&space.variables) {
        if rng.random_bool(p) {
            *x += gaussian(rng) * scale * v.span();
            mutated = true;
        }
    }
    if !mutated {
        let i = rng.random_range(0..n);
        genes[i] += gaussian(rng) * scale * space.variables[i].span();
    }
    space.clamp(genes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::create_rng;

    #[test]
    fn test_blend_stays_in_bounds() {
        let space = SearchSpace::uniform(3, 0.0, 1.0);
        let mut rng = create_rng(42);
        for _ in 0..200 {
            let (c1, c2) = blend_crossover(&[0.0, 0.5, 1.0], &[1.0, 0.5, 0.0], 0.5, &space, &mut rng);
            for x in c1.iter().chain(&c2) {
                assert!((0.0..=1.0).contains(x));
            }
            // identical genes are inherited unchanged
            assert_eq!(c1[1], 0.5);
            assert_eq!(c2[1], 0.5);
        }
    }

    #[test]
    fn test_blend_does_not_touch_parents() {
        let space = SearchSpace::uniform(2, -5.0, 5.0);
        let p1 = vec![1.0, 2.0];
        let p2 = vec![-1.0, -2.0];
        let mut rng = create_rng(1);
        let _ = blend_crossover(&p1, &p2, 0.5, &space, &mut rng);
        assert_eq!(p1, vec![1.0, 2.0]);
        assert_eq!(p2, vec![-1.0, -2.0]);
    }

    #[test]
    fn test_mutation_changes_at_least_one_gene() {
        let space = SearchSpace::uniform(5, -10.0, 10.0);
        let mut rng = create_rng(7);
        for _ in 0..100 {
            let original = vec![0.0; 5];
            let mut genes = original.clone();
            gaussian_mutation(&mut genes, &space, 0.1, 0.0, &mut rng);
            let changed = genes.iter().zip(&original).filter(|(a, b)| a != b).count();
            assert_eq!(changed, 1);
        }
    }

    #[test]
    fn test_mutation_clamps() {
        let space = SearchSpace::uniform(2, 0.0, 1.0);
        let mut rng = create_rng(3);
        for _ in 0..100 {
            let mut genes = vec![1.0, 0.0];
            gaussian_mutation(&mut genes, &space, 5.0, 1.0, &mut rng);
            assert!(genes.iter().all(|x| (0.0..=1.0).contains(x)));
        }
    }
}
