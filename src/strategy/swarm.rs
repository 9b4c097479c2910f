//! Particle swarm generation step.
//!
//! Each particle keeps a velocity and a personal best; the swarm shares a
//! global best. Positions are read from the evaluated population, index by
//! index, so the orchestrator's elite overwrite of slot 0 simply relocates
//! that particle.
//!
//! # References
//!
//! - Kennedy & Eberhart (1995), "Particle Swarm Optimization"
//! - Shi & Eberhart (1998), "A Modified Particle Swarm Optimizer" (inertia weight)

use super::StrategyContext;
use crate::error::OptimizeError;
use crate::solution::Solution;
use rand::Rng;

/// Particle swarm settings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SwarmConfig {
    /// Inertia weight `w`.
    pub inertia: f64,

    /// Attraction towards the personal best (`c1`).
    pub cognitive: f64,

    /// Attraction towards the global best (`c2`).
    pub social: f64,

    /// Velocity cap per dimension, as a fraction of the variable's span.
    pub max_velocity: f64,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            inertia: 0.7,
            cognitive: 1.5,
            social: 1.5,
            max_velocity: 0.2,
        }
    }
}

impl SwarmConfig {
    pub fn with_inertia(mut self, w: f64) -> Self {
        self.inertia = w.max(0.0);
        self
    }

    pub fn with_cognitive(mut self, c1: f64) -> Self {
        self.cognitive = c1.max(0.0);
        self
    }

    pub fn with_social(mut self, c2: f64) -> Self {
        self.social = c2.max(0.0);
        self
    }

    pub fn with_max_velocity(mut self, fraction: f64) -> Self {
        self.max_velocity = fraction.clamp(0.0, 1.0);
        self
    }

    pub fn validate(&self) -> Result<(), OptimizeError> {
        for (name, value) in [
            ("inertia", self.inertia),
            ("cognitive", self.cognitive),
            ("social", self.social),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(OptimizeError::config(format!("{name} must be finite and >= 0")));
            }
        }
        if !(self.max_velocity > 0.0 && self.max_velocity <= 1.0) {
            return Err(OptimizeError::config("max_velocity must be in (0, 1]"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Particle {
    velocity: Vec<f64>,
    best_position: Vec<f64>,
    best_utility: f64,
}

/// PSO step with per-run particle memory.
#[derive(Debug, Clone)]
pub struct SwarmStrategy {
    config: SwarmConfig,
    particles: Vec<Particle>,
    global_best: Option<(Vec<f64>, f64)>,
}

impl SwarmStrategy {
    pub fn new(config: SwarmConfig) -> Self {
        Self {
            config,
            particles: Vec::new(),
            global_best: None,
        }
    }

    pub fn next_generation<R: Rng>(&mut self, ctx: &StrategyContext<'_>, rng: &mut R) -> Vec<Solution> {
        let utilities = ctx.utilities();
        let dim = ctx.space.dim();

        if self.particles.len() != ctx.population.len() {
            self.particles = ctx
                .population
                .iter()
                .zip(&utilities)
                .map(|(s, &u)| Particle {
                    velocity: vec![0.0; dim],
                    best_position: s.attributes.clone(),
                    best_utility: u,
                })
                .collect();
        }

        for ((particle, solution), &u) in self.particles.iter_mut().zip(ctx.population).zip(&utilities) {
            if u > particle.best_utility {
                particle.best_utility = u;
                particle.best_position = solution.attributes.clone();
            }
            let improves_global = self.global_best.as_ref().map_or(true, |(_, g)| u > *g);
            if improves_global {
                self.global_best = Some((solution.attributes.clone(), u));
            }
        }

        let Some((global, global_utility)) = self.global_best.clone() else {
            return ctx.population.iter().take(ctx.offspring).cloned().collect();
        };
        tracing::trace!(generation = ctx.generation, global_utility, "swarm update");

        let SwarmConfig {
            inertia,
            cognitive,
            social,
            max_velocity,
        } = self.config;

        let mut next = Vec::with_capacity(ctx.offspring);
        for (particle, solution) in self.particles.iter_mut().zip(ctx.population).take(ctx.offspring) {
            let mut position = solution.attributes.clone();
            for (j, var) in ctx.space.variables.iter().enumerate() {
                let r1: f64 = rng.random();
                let r2: f64 = rng.random();
                let cap = max_velocity * var.span();
                let v = inertia * particle.velocity[j]
                    + cognitive * r1 * (particle.best_position[j] - position[j])
                    + social * r2 * (global[j] - position[j]);
                let v = v.clamp(-cap, cap);
                particle.velocity[j] = v;
                position[j] += v;
            }
            ctx.space.clamp(&mut position);
            next.push(solution.derive(position));
        }

        next
    }
}
