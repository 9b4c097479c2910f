//! The orchestrator.
//!
//! [`Optimizer`] owns the run lifecycle. `step` performs one generation
//! (evaluate → best tracking → convergence → reproduce) and returns an
//! [`IterationOutcome`]; the outer driver in `optimize` turns outcomes into
//! state snapshots, history rows and events.

use super::config::OptimizerConfig;
use super::events::{EventBus, EventKind, OptimizationEvent, Progress};
use super::result::{OptimizationResult, ResultMetadata};
use super::state::{RunState, RunStats, RunStatus, StopReason};
use crate::constraint::{Constraint, ConstraintChecker, ConstraintEvaluator, ConstraintStatus, EvaluatorRegistry};
use crate::convergence::{assess, ConvergenceStatus};
use crate::error::OptimizeError;
use crate::fitness::{Evaluation, FitnessEvaluator};
use crate::history::OptimizationHistory;
use crate::objective::Objective;
use crate::random::{create_rng, gaussian, random_seed};
use crate::solution::{population_diversity, Solution};
use crate::strategy::{GradientFn, Strategy, StrategyContext};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::Rng;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Offspring closer than this (normalized distance) count as duplicates.
const DUPLICATE_DISTANCE: f64 = 1e-9;

/// Local-search step as a fraction of each variable's span.
const LOCAL_SEARCH_SCALE: f64 = 0.05;

/// Cloneable cancellation token.
///
/// Stopping is idempotent and takes effect at the next iteration boundary.
/// The request stays pending until a run ends: a stop issued while no run is
/// active cancels the next run before its first iteration, and a stop that
/// lands after a run's final boundary check is cleared with that run.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// Everything `initialize` resolves once.
struct Prepared {
    checker: ConstraintChecker,
    pool: Option<rayon::ThreadPool>,
    seed: u64,
}

#[derive(Default)]
struct Shared {
    state: RunState,
    history: OptimizationHistory,
    stats: RunStats,
}

/// Best-so-far record.
#[derive(Debug, Clone)]
struct Best {
    solution: Solution,
    fitness: f64,
    constraints: Vec<ConstraintStatus>,
}

/// What one generation produced.
#[derive(Debug, Clone)]
pub struct IterationOutcome {
    pub iteration: usize,
    pub best_fitness: f64,
    pub best_solution: Solution,
    /// Constraint statuses of the best solution.
    pub best_constraints: Vec<ConstraintStatus>,
    /// Best fitness within this generation alone.
    pub generation_best: f64,
    pub mean_fitness: f64,
    pub diversity: f64,
    pub feasible: usize,
    pub stagnation: usize,
    /// Set when the run must stop after this generation.
    pub stop: Option<StopReason>,
}

/// Per-run loop state.
struct Run<'a, O: Objective> {
    evaluator: FitnessEvaluator<'a, O>,
    target: &'a O::Target,
    pool: Option<&'a rayon::ThreadPool>,
    strategy: Strategy,
    rng: StdRng,
    population: Vec<Solution>,
    best: Option<Best>,
    stagnation: usize,
    evaluations: usize,
}

/// Consumes any stop request and clears the running flag however
/// `optimize` exits.
struct RunGuard<'a> {
    running: &'a AtomicBool,
    stop: &'a StopHandle,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.stop.reset();
        self.running.store(false, Ordering::Release);
    }
}

/// Constrained optimizer driving one of the six strategies.
///
/// # Examples
///
/// ```
/// use u_optengine::constraint::Constraint;
/// use u_optengine::objective::{FnObjective, ObjectiveConfig};
/// use u_optengine::optimizer::{OptimizationParameters, Optimizer, OptimizerConfig};
/// use u_optengine::solution::{SearchSpace, Solution};
///
/// let config = OptimizerConfig::new(
///     SearchSpace::new().with_variable("x", 0.0, 10.0),
///     ObjectiveConfig::new("x").maximize(),
/// )
/// .with_constraint(Constraint::inequality("cap", "x <= 5").with_penalty(100.0))
/// .with_parameters(OptimizationParameters::default().with_population_size(10).with_max_iterations(20))
/// .with_seed(42);
///
/// let mut optimizer = Optimizer::new(config, FnObjective::new(|s: &Solution, _: &()| s.attributes[0]));
/// optimizer.initialize().unwrap();
/// let result = optimizer.optimize(&(), None).unwrap();
/// assert!(result.success);
/// assert_eq!(result.history.len(), result.iterations);
/// ```
pub struct Optimizer<O: Objective> {
    config: OptimizerConfig,
    objective: O,
    evaluators: EvaluatorRegistry,
    prepared: Option<Prepared>,
    running: AtomicBool,
    stop: StopHandle,
    shared: Mutex<Shared>,
    events: EventBus,
}

impl<O: Objective> Optimizer<O> {
    pub fn new(config: OptimizerConfig, objective: O) -> Self {
        Self {
            config,
            objective,
            evaluators: EvaluatorRegistry::new(),
            prepared: None,
            running: AtomicBool::new(false),
            stop: StopHandle::default(),
            shared: Mutex::new(Shared::default()),
            events: EventBus::new(),
        }
    }

    /// Registers an evaluator for `custom` constraints. Call before
    /// [`initialize`](Self::initialize).
    pub fn register_evaluator(&mut self, name: impl Into<String>, evaluator: impl ConstraintEvaluator + 'static) {
        self.evaluators.insert(name.into(), Arc::new(evaluator));
        self.prepared = None;
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Validates the configuration, resolves objectives and constraints,
    /// builds the worker pool and samples the initial population.
    pub fn initialize(&mut self) -> Result<(), OptimizeError> {
        let config = &self.config;
        config.validate()?;

        let names = std::iter::once(&config.objective.primary).chain(&config.objective.secondary);
        for name in names {
            if !self.objective.supports(name) {
                return Err(OptimizeError::config(format!("objective '{name}' cannot be resolved")));
            }
        }
        if config.algorithm == crate::strategy::AlgorithmKind::Gradient && !self.objective.has_gradient() {
            return Err(OptimizeError::config(
                "gradient strategy requires an objective that provides gradients",
            ));
        }

        let checker = ConstraintChecker::compile(&config.constraints, &config.space, &self.evaluators)?;

        let pool = if config.worker_count > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.worker_count)
                .thread_name(|i| format!("optimizer-worker-{i}"))
                .build()
                .map_err(|e| OptimizeError::config(format!("failed to build worker pool: {e}")))?;
            Some(pool)
        } else {
            None
        };

        let seed = config.seed.unwrap_or_else(random_seed);
        let population = initial_population(config, seed);

        tracing::info!(
            algorithm = %config.algorithm,
            population_size = config.parameters.population_size,
            constraints = checker.len(),
            workers = config.worker_count,
            seed,
            "optimizer initialized"
        );

        self.prepared = Some(Prepared { checker, pool, seed });
        *self.lock() = Shared {
            state: RunState {
                population,
                ..RunState::default()
            },
            ..Shared::default()
        };
        Ok(())
    }

    /// Runs the optimization loop against `target`.
    ///
    /// `constraints`, when given, replace the configured constraint set for
    /// this run. Fails with [`OptimizeError::AlreadyRunning`] if another
    /// call is in progress on this instance, and with the first evaluation
    /// error if a scorer fails.
    pub fn optimize(
        &self,
        target: &O::Target,
        constraints: Option<&[Constraint]>,
    ) -> Result<OptimizationResult, OptimizeError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(OptimizeError::AlreadyRunning);
        }
        let _guard = RunGuard {
            running: &self.running,
            stop: &self.stop,
        };

        let prepared = self
            .prepared
            .as_ref()
            .ok_or_else(|| OptimizeError::config("optimize called before initialize"))?;
        let run_checker;
        let checker = match constraints {
            Some(constraints) => {
                run_checker = ConstraintChecker::compile(constraints, &self.config.space, &self.evaluators)?;
                &run_checker
            }
            None => &prepared.checker,
        };

        let params = &self.config.parameters;
        // same draws as `initialize`, so every run starts from the same population
        let mut rng = create_rng(prepared.seed);
        let population = initial_population_with(&self.config, &mut rng);

        let mut run = Run {
            evaluator: FitnessEvaluator::new(&self.objective, &self.config.objective, checker),
            target,
            pool: prepared.pool.as_ref(),
            strategy: Strategy::new(self.config.algorithm, &self.config.settings),
            rng,
            population,
            best: None,
            stagnation: 0,
            evaluations: 0,
        };

        *self.lock() = Shared {
            state: RunState {
                status: RunStatus::Running,
                running: true,
                population: run.population.clone(),
                ..RunState::default()
            },
            history: OptimizationHistory::with_capacity(params.max_iterations),
            stats: RunStats::default(),
        };

        tracing::info!(
            algorithm = %self.config.algorithm,
            population_size = params.population_size,
            max_iterations = params.max_iterations,
            workers = self.config.worker_count,
            seed = prepared.seed,
            "optimization started"
        );
        self.events.publish(EventKind::Started {
            algorithm: self.config.algorithm,
            population_size: params.population_size,
        });

        let start = Instant::now();
        let time_limit = self.config.time_limit_ms.map(Duration::from_millis);
        let mut iteration = 0;

        let reason = loop {
            if self.stop.is_stopped() {
                break StopReason::Cancelled;
            }
            if time_limit.is_some_and(|limit| start.elapsed() >= limit) {
                break StopReason::TimeLimit;
            }
            if iteration >= params.max_iterations {
                break StopReason::IterationsExhausted;
            }
            iteration += 1;

            let outcome = match self.step(&mut run, iteration) {
                Ok(outcome) => outcome,
                Err(error) => return Err(self.fail(error, start.elapsed())),
            };
            self.dispatch(&outcome, &run, start.elapsed());
            if let Some(reason) = outcome.stop {
                break reason;
            }
        };

        Ok(self.finish(run, checker, reason, iteration, start.elapsed()))
    }

    /// One generation.
    fn step(&self, run: &mut Run<'_, O>, iteration: usize) -> Result<IterationOutcome, OptimizeError> {
        let config = &self.config;
        let params = &config.parameters;
        let direction = config.objective.direction;

        let mut evaluations = self.evaluate_population(run, iteration)?;
        if params.local_search {
            self.local_search(run, &mut evaluations, iteration)?;
        }

        let fitness: Vec<f64> = evaluations.iter().map(|e| e.fitness).collect();
        let Some(gen_best) = direction.best_index(&fitness) else {
            return Err(OptimizeError::config("population is empty"));
        };
        let generation_best = fitness[gen_best];

        let previous_best = run.best.as_ref().map(|b| b.fitness);
        match previous_best {
            Some(prev) if !direction.is_better(generation_best, prev) => run.stagnation += 1,
            _ => {
                let qualifies = previous_best.map_or(true, |prev| {
                    direction.improvement(generation_best, prev) >= config.convergence.min_improvement
                });
                run.stagnation = if qualifies { 0 } else { run.stagnation + 1 };
                run.best = Some(Best {
                    solution: run.population[gen_best].clone(),
                    fitness: generation_best,
                    constraints: evaluations[gen_best].constraints.clone(),
                });
            }
        }
        let best = match &run.best {
            Some(best) => best.clone(),
            None => return Err(OptimizeError::config("no best solution after evaluation")),
        };

        let progress = iteration as f64 / params.max_iterations as f64;
        let stop = match assess(best.fitness, previous_best, run.stagnation, progress, &config.convergence) {
            ConvergenceStatus::Converged => Some(StopReason::Converged),
            ConvergenceStatus::Stagnated => Some(StopReason::Stagnated),
            ConvergenceStatus::Continue if iteration >= params.max_iterations => {
                Some(StopReason::IterationsExhausted)
            }
            ConvergenceStatus::Continue => None,
        };

        let mean_fitness = fitness.iter().sum::<f64>() / fitness.len() as f64;
        let diversity = population_diversity(&config.space, &run.population);
        let feasible = evaluations.iter().filter(|e| e.feasible()).count();

        if stop.is_none() {
            run.population = self.reproduce(run, &fitness, &best, iteration)?;
        }

        Ok(IterationOutcome {
            iteration,
            best_fitness: best.fitness,
            best_solution: best.solution,
            best_constraints: best.constraints,
            generation_best,
            mean_fitness,
            diversity,
            feasible,
            stagnation: run.stagnation,
            stop,
        })
    }

    /// Scores the population, in parallel when a worker pool exists.
    ///
    /// Scoring stops at the first failure. With a pool, the reported error is
    /// the one with the lowest population index, whatever the scheduling.
    fn evaluate_population(&self, run: &mut Run<'_, O>, iteration: usize) -> Result<Vec<Evaluation>, OptimizeError> {
        let evaluator = &run.evaluator;
        let target = run.target;
        let evaluate = |index: usize, solution: &Solution| {
            evaluator
                .evaluate(solution, target)
                .map_err(|e| OptimizeError::Evaluation {
                    generation: iteration,
                    index,
                    reason: e.message().to_string(),
                })
        };

        let population = &run.population;
        let mut scored = 0usize;
        let result = match run.pool {
            None => population
                .iter()
                .enumerate()
                .map(|(index, solution)| {
                    scored += 1;
                    evaluate(index, solution)
                })
                .collect::<Result<Vec<_>, _>>(),
            Some(pool) => {
                let failed = AtomicUsize::new(usize::MAX);
                let slots: Vec<Option<Result<Evaluation, OptimizeError>>> = pool.install(|| {
                    population
                        .par_iter()
                        .enumerate()
                        .map(|(index, solution)| {
                            if index > failed.load(Ordering::Relaxed) {
                                return None;
                            }
                            let result = evaluate(index, solution);
                            if result.is_err() {
                                failed.fetch_min(index, Ordering::Relaxed);
                            }
                            Some(result)
                        })
                        .collect()
                });
                scored = slots.iter().filter(|slot| slot.is_some()).count();
                // every index below the first failure was scored
                slots.into_iter().map_while(|slot| slot).collect::<Result<Vec<_>, _>>()
            }
        };
        run.evaluations += scored;
        result
    }

    /// Refines the generation best with seeded coordinate perturbations.
    fn local_search(
        &self,
        run: &mut Run<'_, O>,
        evaluations: &mut [Evaluation],
        iteration: usize,
    ) -> Result<(), OptimizeError> {
        let direction = self.config.objective.direction;
        let space = &self.config.space;
        let fitness: Vec<f64> = evaluations.iter().map(|e| e.fitness).collect();
        let Some(index) = direction.best_index(&fitness) else {
            return Ok(());
        };

        let mut current = run.population[index].clone();
        let mut current_eval = evaluations[index].clone();
        let mut improved = 0usize;
        for _ in 0..self.config.parameters.local_search_steps {
            let j = run.rng.random_range(0..space.dim());
            let mut attrs = current.attributes.clone();
            attrs[j] += gaussian(&mut run.rng) * LOCAL_SEARCH_SCALE * space.variables[j].span();
            space.clamp(&mut attrs);
            let candidate = current.derive(attrs);

            let eval = run
                .evaluator
                .evaluate(&candidate, run.target)
                .map_err(|e| OptimizeError::Evaluation {
                    generation: iteration,
                    index,
                    reason: e.message().to_string(),
                })?;
            run.evaluations += 1;
            if direction.is_better(eval.fitness, current_eval.fitness) {
                current = candidate;
                current_eval = eval;
                improved += 1;
            }
        }
        tracing::trace!(iteration, improved, "local search");

        run.population[index] = current;
        evaluations[index] = current_eval;
        Ok(())
    }

    /// Builds the next population: strategy offspring, elite, de-duplication.
    fn reproduce(
        &self,
        run: &mut Run<'_, O>,
        fitness: &[f64],
        best: &Best,
        iteration: usize,
    ) -> Result<Vec<Solution>, OptimizeError> {
        let config = &self.config;
        let params = &config.parameters;
        let size = params.population_size;
        let kind = config.algorithm;
        let reserve = params.elitism && kind.reserves_elite_slot();
        let offspring = if reserve { size.saturating_sub(1) } else { size };

        let evaluator = &run.evaluator;
        let target = run.target;
        let gradient = |s: &Solution| evaluator.gradient(s, target);
        let gradient_ref: &GradientFn<'_> = &gradient;

        let mut ctx = StrategyContext::new(
            &run.population,
            fitness,
            &config.space,
            params,
            config.objective.direction,
            iteration,
            offspring,
        );
        if kind == crate::strategy::AlgorithmKind::Gradient {
            ctx.gradient = Some(gradient_ref);
        }
        let mut next = run.strategy.next_generation(&ctx, &mut run.rng)?;

        if params.elitism {
            if reserve {
                next.insert(0, best.solution.clone());
            } else if let Some(slot) = next.first_mut() {
                *slot = best.solution.clone();
            }
        }

        if params.diversity_preservation {
            let first = usize::from(params.elitism);
            let mut replaced = 0usize;
            for i in first..next.len() {
                let duplicate = next[..i]
                    .iter()
                    .any(|o| config.space.normalized_distance(&o.attributes, &next[i].attributes) < DUPLICATE_DISTANCE);
                if duplicate {
                    next[i] = config.space.sample(&mut run.rng);
                    replaced += 1;
                }
            }
            if replaced > 0 {
                tracing::trace!(iteration, replaced, "duplicates replaced");
            }
        }

        debug_assert_eq!(next.len(), size);
        Ok(next)
    }

    /// Records an outcome and notifies subscribers.
    fn dispatch(&self, outcome: &IterationOutcome, run: &Run<'_, O>, elapsed: Duration) {
        tracing::debug!(
            iteration = outcome.iteration,
            best_fitness = outcome.best_fitness,
            generation_best = outcome.generation_best,
            stagnation = outcome.stagnation,
            "iteration complete"
        );

        {
            let mut shared = self.lock();
            let Shared { state, history, stats } = &mut *shared;
            state.iteration = outcome.iteration;
            state.current_fitness = Some(outcome.generation_best);
            state.best_fitness = Some(outcome.best_fitness);
            state.best_solution = Some(outcome.best_solution.clone());
            state.stagnation = outcome.stagnation;
            state.population = run.population.clone();

            stats.generations = outcome.iteration;
            stats.evaluations = run.evaluations;
            stats.best_fitness = Some(outcome.best_fitness);
            stats.mean_fitness = Some(outcome.mean_fitness);
            stats.diversity = outcome.diversity;
            stats.feasible = outcome.feasible;
            stats.elapsed = elapsed;

            history.record(
                outcome.iteration,
                outcome.best_fitness,
                outcome.best_solution.clone(),
                outcome.best_constraints.clone(),
                Utc::now(),
            );
        }

        self.events.publish(EventKind::Iteration(Progress {
            iteration: outcome.iteration,
            fitness: outcome.best_fitness,
            best_solution: outcome.best_solution.clone(),
            stagnation: outcome.stagnation,
        }));
        let violations: Vec<ConstraintStatus> = outcome
            .best_constraints
            .iter()
            .filter(|s| !s.satisfied)
            .cloned()
            .collect();
        if !violations.is_empty() {
            self.events.publish(EventKind::ConstraintViolated {
                iteration: outcome.iteration,
                violations,
            });
        }
    }

    /// Marks the run failed and hands the error back.
    fn fail(&self, error: OptimizeError, elapsed: Duration) -> OptimizeError {
        tracing::warn!(%error, "optimization failed");
        {
            let mut shared = self.lock();
            shared.state.status = RunStatus::Failed;
            shared.state.running = false;
            shared.state.errors.push(error.clone());
            shared.stats.elapsed = elapsed;
            shared.stats.dropped_events = self.events.dropped();
        }
        self.events.publish(EventKind::Failed { error: error.clone() });
        error
    }

    /// Re-checks the best solution and assembles the result.
    fn finish(
        &self,
        run: Run<'_, O>,
        checker: &ConstraintChecker,
        reason: StopReason,
        iteration: usize,
        duration: Duration,
    ) -> OptimizationResult {
        let params = &self.config.parameters;
        let cancelled = reason == StopReason::Cancelled;
        let iterations = iteration;

        let (solution, fitness) = match run.best {
            Some(best) => (Some(best.solution), Some(best.fitness)),
            None => (None, None),
        };
        let constraint_status = solution.as_ref().map(|s| checker.check(s)).unwrap_or_default();
        let success = solution.is_some() && !cancelled;
        let converged = reason == StopReason::Converged;
        let stagnated = reason == StopReason::Stagnated;

        let history = {
            let mut shared = self.lock();
            shared.state.status = reason.status();
            shared.state.converged = converged;
            shared.state.stagnated = stagnated;
            shared.stats.elapsed = duration;
            shared.stats.evaluations = run.evaluations;
            shared.history.clone()
        };

        match reason {
            StopReason::Cancelled => {
                tracing::info!(iteration = iterations, "optimization cancelled");
                self.events.publish(EventKind::Cancelled { iteration: iterations });
            }
            StopReason::Converged => {
                if let Some(f) = fitness {
                    self.events.publish(EventKind::Converged {
                        iteration: iterations,
                        fitness: f,
                    });
                }
            }
            _ => {}
        }
        if !cancelled {
            tracing::info!(
                iterations,
                fitness = ?fitness,
                reason = %reason,
                elapsed_ms = duration.as_millis() as u64,
                "optimization completed"
            );
            self.events.publish(EventKind::Completed {
                iterations,
                fitness,
                reason,
            });
        }

        let dim = self.config.space.dim();
        let memory_estimate_bytes = history.estimated_bytes()
            + run.population.len() * (std::mem::size_of::<Solution>() + dim * std::mem::size_of::<f64>());

        {
            let mut shared = self.lock();
            if !cancelled {
                shared.state.status = RunStatus::Completed;
            }
            shared.state.running = false;
            shared.stats.dropped_events = self.events.dropped();
        }

        OptimizationResult {
            success,
            solution,
            fitness,
            iterations,
            converged,
            stagnated,
            constraint_status,
            metadata: ResultMetadata {
                algorithm: self.config.algorithm.name().to_string(),
                parameters: params.clone(),
                seed: self.prepared.as_ref().map_or(0, |p| p.seed),
                duration,
                memory_estimate_bytes,
                worker_count: self.config.worker_count,
                stop_reason: reason,
                evaluations: run.evaluations,
            },
            history,
            completed_at: Utc::now(),
        }
    }

    /// Requests cancellation at the next iteration boundary. Idempotent.
    ///
    /// See [`StopHandle`] for requests made while no run is active.
    pub fn stop(&self) {
        if !self.stop.is_stopped() {
            tracing::debug!("stop requested");
        }
        self.stop.stop();
    }

    /// A token that can cancel the run from anywhere.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Snapshot of the run state.
    pub fn get_state(&self) -> RunState {
        self.lock().state.clone()
    }

    /// Snapshot of the history so far.
    pub fn get_history(&self) -> OptimizationHistory {
        self.lock().history.clone()
    }

    /// Snapshot of the run statistics.
    pub fn get_stats(&self) -> RunStats {
        let mut stats = self.lock().stats.clone();
        stats.dropped_events = self.events.dropped();
        stats
    }

    /// Attaches an event subscriber buffering up to `capacity` events.
    pub fn subscribe(&self, capacity: usize) -> Receiver<OptimizationEvent> {
        self.events.subscribe(capacity)
    }

    /// Whether a run is in progress.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn initial_population(config: &OptimizerConfig, seed: u64) -> Vec<Solution> {
    initial_population_with(config, &mut create_rng(seed))
}

fn initial_population_with<R: Rng>(config: &OptimizerConfig, rng: &mut R) -> Vec<Solution> {
    (0..config.parameters.population_size)
        .map(|_| config.space.sample(rng))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::Constraint;
    use crate::error::ScoreError;
    use crate::objective::{FnObjective, ObjectiveConfig, ScoreContext};
    use crate::optimizer::OptimizationParameters;
    use crate::solution::SearchSpace;
    use crate::strategy::AlgorithmKind;
    use proptest::prelude::{proptest, ProptestConfig};

    struct Sphere;

    impl Objective for Sphere {
        type Target = ();

        fn score(&self, s: &Solution, _: &(), _: &ScoreContext<'_>) -> Result<f64, ScoreError> {
            Ok(s.attributes.iter().map(|x| x * x).sum())
        }

        fn has_gradient(&self) -> bool {
            true
        }

        fn gradient(&self, s: &Solution, _: &(), _: &ScoreContext<'_>) -> Result<Vec<f64>, ScoreError> {
            Ok(s.attributes.iter().map(|x| 2.0 * x).collect())
        }
    }

    fn sphere_config(kind: AlgorithmKind) -> OptimizerConfig {
        OptimizerConfig::new(SearchSpace::uniform(3, -5.0, 5.0), ObjectiveConfig::new("sphere"))
            .with_algorithm(kind)
            .with_parameters(
                OptimizationParameters::default()
                    .with_population_size(16)
                    .with_max_iterations(40),
            )
            .with_workers(1)
            .with_seed(42)
    }

    #[test]
    fn test_optimize_before_initialize() {
        let opt = Optimizer::new(sphere_config(AlgorithmKind::Genetic), Sphere);
        assert!(matches!(opt.optimize(&(), None), Err(OptimizeError::Configuration(_))));
        assert!(!opt.is_running());
    }

    #[test]
    fn test_initialize_rejects_bad_configuration() {
        let mut bad_size = sphere_config(AlgorithmKind::Genetic);
        bad_size.parameters.population_size = 0;
        assert!(Optimizer::new(bad_size, Sphere).initialize().is_err());

        let bad_expr = sphere_config(AlgorithmKind::Genetic)
            .with_constraint(Constraint::inequality("c", "x0 <= "));
        assert!(Optimizer::new(bad_expr, Sphere).initialize().is_err());

        let unknown_var = sphere_config(AlgorithmKind::Genetic)
            .with_constraint(Constraint::inequality("c", "z <= 1"));
        assert!(Optimizer::new(unknown_var, Sphere).initialize().is_err());

        let unresolved = sphere_config(AlgorithmKind::Genetic).with_constraint(Constraint::custom("c", "missing"));
        assert!(Optimizer::new(unresolved, Sphere).initialize().is_err());

        let no_gradient = FnObjective::new(|s: &Solution, _: &()| s.attributes[0]);
        let mut opt = Optimizer::new(sphere_config(AlgorithmKind::Gradient), no_gradient);
        assert!(matches!(opt.initialize(), Err(OptimizeError::Configuration(_))));
    }

    #[test]
    fn test_unsupported_objective_name() {
        struct OnlyCost;
        impl Objective for OnlyCost {
            type Target = ();
            fn score(&self, _: &Solution, _: &(), _: &ScoreContext<'_>) -> Result<f64, ScoreError> {
                Ok(0.0)
            }
            fn supports(&self, objective: &str) -> bool {
                objective == "cost"
            }
        }
        let config = OptimizerConfig::new(
            SearchSpace::uniform(1, 0.0, 1.0),
            ObjectiveConfig::new("cost").with_secondary("weight", 1.0),
        );
        let err = Optimizer::new(config, OnlyCost).initialize().unwrap_err();
        assert!(err.to_string().contains("weight"), "{err}");
    }

    #[test]
    fn test_initialize_samples_population() {
        let mut opt = Optimizer::new(sphere_config(AlgorithmKind::Genetic), Sphere);
        opt.initialize().unwrap();
        let state = opt.get_state();
        assert_eq!(state.status, RunStatus::Idle);
        assert_eq!(state.population.len(), 16);
        assert!(state.best_solution.is_none());
    }

    #[test]
    fn test_every_algorithm_improves_sphere() {
        for kind in AlgorithmKind::ALL {
            let mut opt = Optimizer::new(sphere_config(kind), Sphere);
            opt.initialize().unwrap();
            let result = opt.optimize(&(), None).unwrap();
            let history = &result.history;
            assert!(result.success, "{kind}");
            assert_eq!(history.len(), result.iterations, "{kind}");
            let first = history.fitness[0];
            let last = *history.fitness.last().unwrap();
            assert!(last <= first, "{kind}: {first} -> {last}");
            assert_eq!(result.metadata.algorithm, kind.name());
            assert_eq!(opt.get_state().status, RunStatus::Completed);
        }
    }

    #[test]
    fn test_custom_evaluator_and_per_call_constraints() {
        let config = sphere_config(AlgorithmKind::Genetic).with_constraint(Constraint::custom("far", "distance"));
        let mut opt = Optimizer::new(config, Sphere);
        opt.register_evaluator("distance", |s: &Solution| (1.0 - s.attributes[0]).max(0.0));
        opt.initialize().unwrap();

        let result = opt.optimize(&(), None).unwrap();
        assert_eq!(result.constraint_status.len(), 1);
        assert_eq!(result.constraint_status[0].id, "far");

        let replacement = [Constraint::inequality("low", "x1 <= -1")
            .with_tolerance(0.5)
            .with_penalty(50.0)];
        let result = opt.optimize(&(), Some(&replacement)).unwrap();
        assert_eq!(result.constraint_status.len(), 1);
        assert_eq!(result.constraint_status[0].id, "low");
        assert!(result.is_feasible());
    }

    #[test]
    fn test_min_improvement_counts_small_gains_as_stagnation() {
        let mut config = sphere_config(AlgorithmKind::Genetic);
        config.convergence = config
            .convergence
            .with_min_improvement(1e6)
            .with_max_stagnation(3)
            .with_patience(1000);
        let mut opt = Optimizer::new(config, Sphere);
        opt.initialize().unwrap();
        let result = opt.optimize(&(), None).unwrap();
        assert!(result.stagnated);
        assert_eq!(result.iterations, 4);
        assert_eq!(result.metadata.stop_reason, StopReason::Stagnated);
    }

    #[test]
    fn test_stats_and_events() {
        let mut opt = Optimizer::new(
            sphere_config(AlgorithmKind::ParticleSwarm).with_workers(2),
            Sphere,
        );
        opt.initialize().unwrap();
        let rx = opt.subscribe(256);
        let result = opt.optimize(&(), None).unwrap();

        let stats = opt.get_stats();
        assert_eq!(stats.generations, result.iterations);
        assert_eq!(stats.evaluations, result.iterations * 16);
        assert_eq!(stats.best_fitness, result.fitness);
        assert_eq!(stats.dropped_events, 0);

        let events: Vec<_> = rx.try_iter().map(|e| e.kind).collect();
        assert!(matches!(events.first(), Some(EventKind::Started { population_size: 16, .. })));
        assert!(matches!(events.last(), Some(EventKind::Completed { .. })));
        let progress = events.iter().filter(|k| matches!(k, EventKind::Iteration(_))).count();
        assert_eq!(progress, result.iterations);
    }

    #[test]
    fn test_time_limit() {
        struct Slow;
        impl Objective for Slow {
            type Target = ();
            fn score(&self, s: &Solution, _: &(), _: &ScoreContext<'_>) -> Result<f64, ScoreError> {
                std::thread::sleep(Duration::from_millis(2));
                Ok(s.attributes[0])
            }
        }
        let mut config = sphere_config(AlgorithmKind::Genetic).with_time_limit_ms(20);
        config.parameters.max_iterations = 10_000;
        config.convergence = config.convergence.with_max_stagnation(0).with_tolerance(0.0);
        let mut opt = Optimizer::new(config, Slow);
        opt.initialize().unwrap();
        let result = opt.optimize(&(), None).unwrap();
        assert_eq!(result.metadata.stop_reason, StopReason::TimeLimit);
        assert!(result.success);
        assert!(!result.converged);
        assert!(result.iterations >= 1 && result.iterations < 10_000);
    }

    /// Loop state for driving `step` by hand, as `optimize` would set it up.
    fn start_run(opt: &Optimizer<Sphere>) -> Run<'_, Sphere> {
        let prepared = opt.prepared.as_ref().unwrap();
        let mut rng = create_rng(prepared.seed);
        let population = initial_population_with(&opt.config, &mut rng);
        Run {
            evaluator: FitnessEvaluator::new(&opt.objective, &opt.config.objective, &prepared.checker),
            target: &(),
            pool: prepared.pool.as_ref(),
            strategy: Strategy::new(opt.config.algorithm, &opt.config.settings),
            rng,
            population,
            best: None,
            stagnation: 0,
            evaluations: 0,
        }
    }

    fn duplicate_pairs(opt: &Optimizer<Sphere>, population: &[Solution]) -> usize {
        let space = &opt.config.space;
        (0..population.len())
            .flat_map(|i| (0..i).map(move |j| (i, j)))
            .filter(|&(i, j)| {
                space.normalized_distance(&population[i].attributes, &population[j].attributes) < DUPLICATE_DISTANCE
            })
            .count()
    }

    #[test]
    fn test_diversity_preservation_replaces_duplicates() {
        let run_with = |diversity: bool| {
            let mut config = sphere_config(AlgorithmKind::Genetic);
            // no variation: every child is a copy of its parent
            config.parameters = config
                .parameters
                .with_mutation_rate(0.0)
                .with_crossover_rate(0.0)
                .with_diversity_preservation(diversity);
            let mut opt = Optimizer::new(config, Sphere);
            opt.initialize().unwrap();
            let mut run = start_run(&opt);
            opt.step(&mut run, 1).unwrap();
            assert_eq!(run.population.len(), 16);
            duplicate_pairs(&opt, &run.population)
        };

        assert!(run_with(false) > 0);
        assert_eq!(run_with(true), 0);
    }

    #[test]
    fn test_local_search_refines_generation_best() {
        let first_step = |local: bool| {
            let mut config = sphere_config(AlgorithmKind::Genetic);
            config.parameters = config
                .parameters
                .with_local_search(local)
                .with_local_search_steps(50);
            let mut opt = Optimizer::new(config, Sphere);
            opt.initialize().unwrap();
            let mut run = start_run(&opt);
            let outcome = opt.step(&mut run, 1).unwrap();
            (outcome.generation_best, run.evaluations)
        };

        let (plain, plain_evals) = first_step(false);
        let (refined, refined_evals) = first_step(true);
        assert!(refined < plain, "{refined} !< {plain}");
        assert_eq!(plain_evals, 16);
        assert_eq!(refined_evals, 16 + 50);
    }

    #[test]
    fn test_sequential_scoring_stops_at_first_failure() {
        struct FailsAt(usize, std::sync::atomic::AtomicUsize);
        impl Objective for FailsAt {
            type Target = ();
            fn score(&self, s: &Solution, _: &(), _: &ScoreContext<'_>) -> Result<f64, ScoreError> {
                if self.1.fetch_add(1, Ordering::SeqCst) == self.0 {
                    return Err("boom".into());
                }
                Ok(s.attributes[0])
            }
        }

        let mut opt = Optimizer::new(sphere_config(AlgorithmKind::Genetic), FailsAt(3, AtomicUsize::new(0)));
        opt.initialize().unwrap();
        let err = opt.optimize(&(), None).unwrap_err();
        assert!(matches!(err, OptimizeError::Evaluation { generation: 1, index: 3, .. }));
        assert_eq!(opt.objective.1.load(Ordering::SeqCst), 4);
        assert_eq!(opt.get_history().len(), 0);
    }

    fn step_population_sizes(kind: AlgorithmKind, size: usize, elitism: bool, diversity: bool, local: bool) {
        let mut config = sphere_config(kind);
        config.parameters = OptimizationParameters::default()
            .with_population_size(size)
            .with_max_iterations(10)
            .with_elitism(elitism)
            .with_diversity_preservation(diversity)
            .with_local_search(local)
            .with_local_search_steps(3);
        let mut opt = Optimizer::new(config, Sphere);
        opt.initialize().unwrap();
        let mut run = start_run(&opt);

        let mut previous_best = f64::INFINITY;
        for iteration in 1..=5 {
            let outcome = opt.step(&mut run, iteration).unwrap();
            assert_eq!(run.population.len(), size, "{kind} iteration {iteration}");
            assert!(outcome.best_fitness <= previous_best, "{kind}: best regressed");
            previous_best = outcome.best_fitness;
            if elitism && outcome.stop.is_none() {
                assert_eq!(run.population[0], outcome.best_solution, "{kind}: elite missing");
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn prop_population_size_is_invariant(
            kind in 0usize..6,
            size in 1usize..12,
            elitism: bool,
            diversity: bool,
            local: bool,
        ) {
            step_population_sizes(AlgorithmKind::ALL[kind], size, elitism, diversity, local);
        }
    }
}
