// src/engine/barrier.rs
//
// Per-pass completion latch.
//
// The scheduler arms one PassBarrier per submitted pass with the number of
// tasks it enqueued. Each task arrives exactly once (executed, failed or
// discarded) after its reduction merge, so a producer woken by the barrier
// always observes the fully merged statistics of that pass.

use crate::engine::reduction::{Extrema, ReductionState};
use crate::engine::tasks::TaskFailure;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How a task left the worker.
#[derive(Debug)]
pub enum TaskOutcome {
    Executed,
    Failed(TaskFailure),
    /// Stale epoch: never executed, or executed but not committed.
    Discarded,
}

#[derive(Debug, Default)]
struct Arrivals {
    executed: usize,
    discarded: usize,
    failed: Vec<TaskFailure>,
}

impl Arrivals {
    fn total(&self) -> usize {
        self.executed + self.discarded + self.failed.len()
    }
}

/// Summary of a completed pass.
#[derive(Debug, Clone)]
pub struct PassReport {
    pub epoch: u64,
    pub pass: u32,
    pub tasks: usize,
    pub executed: usize,
    pub discarded: usize,
    pub failed: Vec<TaskFailure>,
    /// Merged min/max over all committed tiles; None when nothing was committed.
    pub extrema: Option<Extrema>,
}

impl PassReport {
    /// At least one tile was dropped because its epoch went stale.
    pub fn superseded(&self) -> bool {
        self.discarded > 0
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.discarded == 0
    }
}

#[derive(Debug)]
pub struct PassBarrier {
    epoch: u64,
    pass: u32,
    expected: usize,
    reduction: Arc<ReductionState>,
    arrivals: Mutex<Arrivals>,
    cvar: Condvar,
}

impl PassBarrier {
    pub fn new(epoch: u64, pass: u32, expected: usize, reduction: Arc<ReductionState>) -> Self {
        Self {
            epoch,
            pass,
            expected,
            reduction,
            arrivals: Mutex::new(Arrivals::default()),
            cvar: Condvar::new(),
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn pass(&self) -> u32 {
        self.pass
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn reduction(&self) -> &Arc<ReductionState> {
        &self.reduction
    }

    /// Record one task. Must be called after the task's reduction merge.
    pub fn arrive(&self, outcome: TaskOutcome) {
        let mut arrivals = self.arrivals.lock();
        match outcome {
            TaskOutcome::Executed => arrivals.executed += 1,
            TaskOutcome::Discarded => arrivals.discarded += 1,
            TaskOutcome::Failed(failure) => arrivals.failed.push(failure),
        }
        debug_assert!(arrivals.total() <= self.expected);
        if arrivals.total() >= self.expected {
            self.cvar.notify_all();
        }
    }

    pub fn is_complete(&self) -> bool {
        self.arrivals.lock().total() >= self.expected
    }

    /// Block until every task of the pass has arrived.
    pub fn wait(&self) -> PassReport {
        let mut arrivals = self.arrivals.lock();
        while arrivals.total() < self.expected {
            self.cvar.wait(&mut arrivals);
        }
        self.report(&arrivals)
    }

    /// Like `wait`, giving up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<PassReport> {
        let deadline = Instant::now() + timeout;
        let mut arrivals = self.arrivals.lock();
        while arrivals.total() < self.expected {
            if self.cvar.wait_until(&mut arrivals, deadline).timed_out()
                && arrivals.total() < self.expected
            {
                return None;
            }
        }
        Some(self.report(&arrivals))
    }

    fn report(&self, arrivals: &Arrivals) -> PassReport {
        PassReport {
            epoch: self.epoch,
            pass: self.pass,
            tasks: self.expected,
            executed: arrivals.executed,
            discarded: arrivals.discarded,
            failed: arrivals.failed.clone(),
            extrema: self.reduction.snapshot(),
        }
    }
}
