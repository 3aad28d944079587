// src/engine/tasks.rs
//
// Tile tasks and their execution on a worker thread.
//
// A task is created by the scheduler for one row range of one pass and moved
// by value through the queue, so it is executed at most once. Execution never
// writes destination rows directly: the transform fills a private scratch
// buffer that is committed only when the transform succeeded and the task's
// epoch is still current.

use crate::engine::barrier::{PassBarrier, TaskOutcome};
use crate::engine::common::run_with_panic_policy;
use crate::engine::raster::{RawImage, RowRange, SharedImage};
use crate::engine::reduction::{Extrema, LocalExtrema};
use crate::engine::scheduler::EpochClock;
use crate::engine::transform::{InputWindow, TileJob, Transform};
use crate::error::IpsError;
use crossbeam::channel::Sender;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{trace, warn};

/// One row range of one pass.
pub struct Task {
    pub id: u64,
    pub epoch: u64,
    pub pass: u32,
    pub rows: RowRange,
    pub input: Arc<RawImage>,
    pub output: Arc<SharedImage>,
    pub transform: Arc<dyn Transform>,
    /// Frozen extrema of the previous pass, when the transform reads them.
    pub upstream: Option<Extrema>,
    /// Completion latch of the pass; also owns the pass reduction.
    pub barrier: Arc<PassBarrier>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("epoch", &self.epoch)
            .field("pass", &self.pass)
            .field("rows", &self.rows)
            .field("transform", &self.transform.name())
            .finish()
    }
}

/// A tile whose transform failed. Its destination rows were left untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskFailure {
    pub task_id: u64,
    pub epoch: u64,
    pub pass: u32,
    pub rows: RowRange,
    pub transform: &'static str,
    pub message: String,
}

impl TaskFailure {
    pub fn to_error(&self) -> IpsError {
        IpsError::transform_failure(
            self.transform,
            self.rows.start,
            self.rows.end,
            self.message.clone(),
        )
    }
}

/// Execute `task` and report it to its pass barrier.
pub(crate) fn run_task(task: Task, clock: &EpochClock, failures: &Sender<TaskFailure>) {
    let barrier = Arc::clone(&task.barrier);
    let outcome = execute_task(task, clock, failures);
    // The task (and its reference to the destination) is gone by now.
    barrier.arrive(outcome);
}

/// Run the transform over the task rows and commit the result.
///
/// The local min/max is merged into the pass reduction before returning, so
/// the caller may arrive at the barrier right away.
pub(crate) fn execute_task(
    task: Task,
    clock: &EpochClock,
    failures: &Sender<TaskFailure>,
) -> TaskOutcome {
    let transform = Arc::clone(&task.transform);
    let name = transform.name();
    if let Err(stale) = clock.check(task.epoch) {
        return fail(&task, name, stale, failures);
    }

    let started = Instant::now();
    let mut scratch = task.input.rows(task.rows).to_vec();
    let mut local = LocalExtrema::default();

    let result = run_with_panic_policy(name, || {
        let mut job = TileJob {
            task_id: task.id,
            rows: task.rows,
            input: InputWindow::new(&task.input, task.rows, transform.contract().halo),
            output: &mut scratch,
            channels: task.input.channels() as usize,
            upstream: task.upstream,
            local: &mut local,
        };
        transform.apply(&mut job)
    });

    if let Err(err) = result {
        return fail(&task, name, err, failures);
    }

    if let Err(stale) = clock.check(task.epoch) {
        return fail(&task, name, stale, failures);
    }

    if let Err(err) = task.output.write_rows(task.rows, &scratch) {
        return fail(&task, name, err, failures);
    }

    if transform.contract().contributes() {
        task.barrier.reduction().merge(&local);
    }
    trace!(
        task = task.id,
        pass = task.pass,
        rows = ?task.rows,
        elapsed_us = started.elapsed().as_micros() as u64,
        "tile committed"
    );
    TaskOutcome::Executed
}

/// Silent errors discard the tile; anything else is a reported failure.
fn fail(
    task: &Task,
    transform: &'static str,
    err: IpsError,
    failures: &Sender<TaskFailure>,
) -> TaskOutcome {
    if err.is_silent() {
        trace!(task = task.id, pass = task.pass, transform, "discarding tile: {err}");
        return TaskOutcome::Discarded;
    }
    let message = match err {
        IpsError::TransformFailure { message, .. } => message.into_owned(),
        other => other.to_string(),
    };
    warn!(
        task = task.id,
        pass = task.pass,
        epoch = task.epoch,
        start_row = task.rows.start,
        end_row = task.rows.end,
        transform,
        "tile failed: {message}"
    );
    let failure = TaskFailure {
        task_id: task.id,
        epoch: task.epoch,
        pass: task.pass,
        rows: task.rows,
        transform,
        message,
    };
    // Nobody listening is fine; the barrier report still carries the failure.
    let _ = failures.try_send(failure.clone());
    TaskOutcome::Failed(failure)
}
