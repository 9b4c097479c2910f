//! Progress and lifecycle notifications.
//!
//! Subscribers receive events over bounded channels. Publishing never
//! blocks the iteration loop: a full buffer drops the event for that
//! subscriber (and counts the drop), and a disconnected receiver is
//! detached on the next publish.

use crate::constraint::ConstraintStatus;
use crate::error::OptimizeError;
use crate::solution::Solution;
use crate::strategy::AlgorithmKind;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Mutex, PoisonError};

use super::state::StopReason;

/// Per-iteration progress payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub iteration: usize,
    /// Best-so-far fitness.
    pub fitness: f64,
    pub best_solution: Solution,
    pub stagnation: usize,
}

/// What happened.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Started {
        algorithm: AlgorithmKind,
        population_size: usize,
    },
    Iteration(Progress),
    /// The best solution of an iteration violates at least one constraint.
    ConstraintViolated {
        iteration: usize,
        violations: Vec<ConstraintStatus>,
    },
    Converged {
        iteration: usize,
        fitness: f64,
    },
    Completed {
        iterations: usize,
        fitness: Option<f64>,
        reason: StopReason,
    },
    Failed {
        error: OptimizeError,
    },
    Cancelled {
        iteration: usize,
    },
}

/// A timestamped notification.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

impl OptimizationEvent {
    pub fn now(kind: EventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
        }
    }
}

/// Fan-out to any number of bounded subscribers.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<SyncSender<OptimizationEvent>>>,
    dropped: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a subscriber buffering up to `capacity` events (at least 1).
    ///
    /// Dropping the receiver detaches it.
    pub fn subscribe(&self, capacity: usize) -> Receiver<OptimizationEvent> {
        let (tx, rx) = mpsc::sync_channel(capacity.max(1));
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Delivers `kind` to every subscriber without blocking.
    pub fn publish(&self, kind: EventKind) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        if subscribers.is_empty() {
            return;
        }
        let event = OptimizationEvent::now(kind);
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(dropped_total = total, "event subscriber buffer full; event dropped");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    /// Total deliveries dropped on full buffers.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
