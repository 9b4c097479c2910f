use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use u_optengine::constraint::Constraint;
use u_optengine::convergence::ConvergenceConfig;
use u_optengine::objective::{FnObjective, ObjectiveConfig};
use u_optengine::optimizer::{
    EventKind, OptimizationParameters, Optimizer, OptimizerConfig, RunStatus, StopReason,
};
use u_optengine::solution::{SearchSpace, Solution};
use u_optengine::strategy::AlgorithmKind;
use u_optengine::OptimizeError;

const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

fn line_config(population: usize, iterations: usize) -> OptimizerConfig {
    OptimizerConfig::new(
        SearchSpace::new().with_variable("x", 0.0, 10.0),
        ObjectiveConfig::new("x").maximize(),
    )
    .with_parameters(
        OptimizationParameters::default()
            .with_population_size(population)
            .with_max_iterations(iterations),
    )
    .with_seed(42)
}

/// Convergence that can only end a run through the iteration budget.
fn unreachable_convergence() -> ConvergenceConfig {
    ConvergenceConfig::default()
        .with_tolerance(0.0)
        .with_patience(1000)
        .with_max_stagnation(0)
}

fn constrained_sphere(kind: AlgorithmKind, direction_max: bool) -> OptimizerConfig {
    let objective = if direction_max {
        ObjectiveConfig::new("sphere").maximize()
    } else {
        ObjectiveConfig::new("sphere")
    };
    OptimizerConfig::new(SearchSpace::uniform(3, -5.0, 5.0), objective)
        .with_constraint(Constraint::inequality("budget", "x0 + x1 + x2 >= 1").with_penalty(10.0))
        .with_algorithm(kind)
        .with_parameters(
            OptimizationParameters::default()
                .with_population_size(12)
                .with_max_iterations(30),
        )
        .with_workers(2)
        .with_seed(7)
}

fn sphere(s: &Solution, _: &()) -> f64 {
    s.attributes.iter().map(|x| x * x).sum()
}

#[test]
fn scenario_a_penalty_drives_search_into_feasible_region() {
    let config = line_config(10, 20)
        .with_constraint(Constraint::inequality("cap", "x <= 5").with_tolerance(0.0).with_penalty(100.0))
        .with_convergence(unreachable_convergence());
    let mut optimizer = Optimizer::new(config, FnObjective::new(|s: &Solution, _: &()| s.attributes[0]));
    optimizer.initialize().unwrap();

    let result = optimizer.optimize(&(), None).unwrap();

    assert!(result.success);
    assert_eq!(result.iterations, 20);
    let x = result.solution.as_ref().unwrap().attributes[0];
    assert!(x <= 5.0, "best x = {x}");
    assert!(result.constraint_status[0].satisfied);
    assert_eq!(result.constraint_status[0].penalty, 0.0);
}

#[test]
fn scenario_b_iteration_budget_without_convergence() {
    let config = line_config(8, 5).with_convergence(
        ConvergenceConfig::default()
            .with_tolerance(0.0)
            .with_patience(1000),
    );
    let mut optimizer = Optimizer::new(config, FnObjective::new(|s: &Solution, _: &()| s.attributes[0]));
    optimizer.initialize().unwrap();

    let result = optimizer.optimize(&(), None).unwrap();

    assert_eq!(result.iterations, 5);
    assert!(!result.converged);
    assert!(result.success);
    assert_eq!(result.metadata.stop_reason, StopReason::IterationsExhausted);
    assert_eq!(result.history.len(), 5);
    assert_eq!(optimizer.get_state().status, RunStatus::Completed);
}

#[test]
fn scenario_c_scorer_failure_fails_the_run() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    struct Flaky(Arc<AtomicUsize>);
    impl u_optengine::Objective for Flaky {
        type Target = ();
        fn score(
            &self,
            s: &Solution,
            _: &(),
            _: &u_optengine::ScoreContext<'_>,
        ) -> Result<f64, u_optengine::ScoreError> {
            // population 10: call 13 is the 3rd individual of generation 2
            if self.0.fetch_add(1, Ordering::SeqCst) + 1 == 13 {
                return Err("scorer crashed".into());
            }
            Ok(s.attributes[0])
        }
    }

    let config = line_config(10, 20).with_workers(1);
    let mut optimizer = Optimizer::new(config, Flaky(counter));
    optimizer.initialize().unwrap();
    let events = optimizer.subscribe(64);

    let err = optimizer.optimize(&(), None).unwrap_err();

    assert_eq!(
        err,
        OptimizeError::Evaluation {
            generation: 2,
            index: 2,
            reason: "scorer crashed".to_string(),
        }
    );
    let state = optimizer.get_state();
    assert_eq!(state.status, RunStatus::Failed);
    assert_eq!(state.errors, vec![err.clone()]);
    assert!(!state.running);
    assert_eq!(optimizer.get_history().len(), 1);
    assert_eq!(optimizer.get_history().iterations, vec![1]);
    assert_eq!(calls.load(Ordering::SeqCst), 13);

    let failed = events
        .try_iter()
        .any(|e| matches!(e.kind, EventKind::Failed { error } if error == err));
    assert!(failed);
}

#[test]
fn scenario_d_concurrent_optimize_is_rejected() {
    let release = Arc::new(AtomicBool::new(false));
    let gate = Arc::clone(&release);
    let objective = FnObjective::new(move |s: &Solution, _: &()| {
        while !gate.load(Ordering::Acquire) {
            thread::sleep(Duration::from_millis(1));
        }
        s.attributes[0]
    });

    let mut optimizer = Optimizer::new(line_config(6, 10).with_workers(2), objective);
    optimizer.initialize().unwrap();
    let optimizer = Arc::new(optimizer);
    let events = optimizer.subscribe(64);

    let first = {
        let optimizer = Arc::clone(&optimizer);
        thread::spawn(move || optimizer.optimize(&(), None))
    };

    loop {
        let event = events.recv_timeout(EVENT_TIMEOUT).expect("run never started");
        if matches!(event.kind, EventKind::Started { .. }) {
            break;
        }
    }

    assert_eq!(optimizer.optimize(&(), None).unwrap_err(), OptimizeError::AlreadyRunning);
    assert_eq!(optimizer.get_state().status, RunStatus::Running);

    release.store(true, Ordering::Release);
    let result = first.join().unwrap().unwrap();
    assert!(result.success);
    assert!(!optimizer.is_running());

    // the instance is reusable once the first run is over
    assert!(optimizer.optimize(&(), None).is_ok());
}

#[test]
fn genetic_runs_are_deterministic_under_seed() {
    let run = || {
        let mut optimizer = Optimizer::new(constrained_sphere(AlgorithmKind::Genetic, false), FnObjective::new(sphere));
        optimizer.initialize().unwrap();
        optimizer.optimize(&(), None).unwrap()
    };

    let a = run();
    let b = run();
    assert_eq!(a.history.solutions, b.history.solutions);
    assert_eq!(a.history.fitness, b.history.fitness);
    assert_eq!(a.solution, b.solution);
}

#[test]
fn repeated_runs_on_one_instance_are_identical() {
    let mut optimizer = Optimizer::new(
        constrained_sphere(AlgorithmKind::Evolutionary, false),
        FnObjective::new(sphere),
    );
    optimizer.initialize().unwrap();
    let a = optimizer.optimize(&(), None).unwrap();
    let b = optimizer.optimize(&(), None).unwrap();
    assert_eq!(a.history.solutions, b.history.solutions);
}

#[test]
fn best_fitness_never_regresses() {
    let gradient_free = [
        AlgorithmKind::Genetic,
        AlgorithmKind::ParticleSwarm,
        AlgorithmKind::SimulatedAnnealing,
        AlgorithmKind::Bayesian,
        AlgorithmKind::Evolutionary,
    ];
    for kind in gradient_free {
        for maximize in [false, true] {
            let mut optimizer = Optimizer::new(constrained_sphere(kind, maximize), FnObjective::new(sphere));
            optimizer.initialize().unwrap();
            let result = optimizer.optimize(&(), None).unwrap();
            for w in result.history.fitness.windows(2) {
                if maximize {
                    assert!(w[1] >= w[0], "{kind} (max): {} -> {}", w[0], w[1]);
                } else {
                    assert!(w[1] <= w[0], "{kind} (min): {} -> {}", w[0], w[1]);
                }
            }
        }
    }
}

#[test]
fn stop_is_idempotent_and_preserves_best() {
    let objective = FnObjective::new(|s: &Solution, _: &()| {
        thread::sleep(Duration::from_micros(200));
        s.attributes[0]
    });
    let config = line_config(10, 10_000)
        .with_convergence(unreachable_convergence())
        .with_workers(2);
    let mut optimizer = Optimizer::new(config, objective);
    optimizer.initialize().unwrap();
    let optimizer = Arc::new(optimizer);
    let events = optimizer.subscribe(16);
    let handle = optimizer.stop_handle();

    let run = {
        let optimizer = Arc::clone(&optimizer);
        thread::spawn(move || optimizer.optimize(&(), None))
    };

    loop {
        let event = events.recv_timeout(EVENT_TIMEOUT).expect("no progress");
        if matches!(event.kind, EventKind::Iteration(_)) {
            break;
        }
    }
    optimizer.stop();
    optimizer.stop();
    handle.stop();

    let result = run.join().unwrap().unwrap();
    assert!(!result.success);
    assert!(!result.converged);
    assert!(result.solution.is_some());
    assert_eq!(result.metadata.stop_reason, StopReason::Cancelled);
    assert!(result.iterations < 10_000);
    assert_eq!(result.history.len(), result.iterations);
    assert_eq!(optimizer.get_state().status, RunStatus::Cancelled);

    // a late stop stays pending for the next run only
    optimizer.stop();
    assert!(!optimizer.is_running());
}

#[test]
fn stop_between_runs_cancels_only_the_next_run() {
    let mut optimizer = Optimizer::new(line_config(6, 5), FnObjective::new(|s: &Solution, _: &()| s.attributes[0]));
    optimizer.initialize().unwrap();
    optimizer.stop();

    let cancelled = optimizer.optimize(&(), None).unwrap();
    assert!(!cancelled.success);
    assert_eq!(cancelled.iterations, 0);
    assert!(cancelled.solution.is_none());
    assert_eq!(cancelled.metadata.stop_reason, StopReason::Cancelled);

    // the pending request was consumed by the cancelled run
    let result = optimizer.optimize(&(), None).unwrap();
    assert!(result.success);
    assert_eq!(result.iterations, 5);
}

#[test]
fn scenario_c_parallel_failure_reports_lowest_index() {
    // fails for every individual of generation 2 onwards with x > 2,
    // independent of the order in which workers score them
    let failing_run = |workers: usize| {
        let calls = AtomicUsize::new(0);
        let objective = FnObjective::new(move |s: &Solution, _: &()| {
            let seen = calls.fetch_add(1, Ordering::SeqCst);
            if seen >= 10 && s.attributes[0] > 2.0 {
                f64::NAN
            } else {
                s.attributes[0]
            }
        });
        let mut optimizer = Optimizer::new(line_config(10, 20).with_workers(workers), objective);
        optimizer.initialize().unwrap();
        let err = optimizer.optimize(&(), None).unwrap_err();
        assert_eq!(optimizer.get_state().status, RunStatus::Failed);
        assert_eq!(optimizer.get_history().len(), 1);
        err
    };

    let sequential = failing_run(1);
    assert!(matches!(sequential, OptimizeError::Evaluation { generation: 2, .. }));
    for workers in [2, 4] {
        assert_eq!(failing_run(workers), sequential, "{workers} workers");
    }
}

#[test]
fn constraint_violations_are_reported_not_fatal() {
    let config = line_config(6, 3).with_constraint(Constraint::equality("impossible", "x == 20").with_penalty(1.0));
    let mut optimizer = Optimizer::new(config, FnObjective::new(|s: &Solution, _: &()| s.attributes[0]));
    optimizer.initialize().unwrap();
    let events = optimizer.subscribe(64);

    let result = optimizer.optimize(&(), None).unwrap();

    assert!(result.success);
    assert!(!result.is_feasible());
    assert!(!result.constraint_status[0].satisfied);
    assert!(result.constraint_status[0].penalty > 0.0);
    let violations = events
        .try_iter()
        .filter(|e| matches!(e.kind, EventKind::ConstraintViolated { .. }))
        .count();
    assert_eq!(violations, 3);
}

#[test]
fn algorithm_selected_by_tag() {
    let kind: AlgorithmKind = "pso".parse().unwrap();
    let mut optimizer = Optimizer::new(
        line_config(8, 10).with_algorithm(kind),
        FnObjective::new(|s: &Solution, _: &()| s.attributes[0]),
    );
    optimizer.initialize().unwrap();
    let result = optimizer.optimize(&(), None).unwrap();
    assert_eq!(result.metadata.algorithm, "particle_swarm");

    assert!(matches!(
        "simplex".parse::<AlgorithmKind>(),
        Err(OptimizeError::Configuration(_))
    ));
}
