// src/engine/scheduler.rs
//
// Pass submission, pass ordering and epoch management.
//
// The scheduler turns "run this transform over this image" into row-range
// tasks on the shared queue. It never executes anything itself: the worker
// pool drains the queue and every task reports to the barrier of its pass.
// Ordering between passes is enforced here. A pass is only enqueued once the
// previous pass of the same epoch has completed, merges included.

use crate::engine::barrier::{PassBarrier, PassReport, TaskOutcome};
use crate::engine::common::EngineResult;
use crate::engine::config::EngineConfig;
use crate::engine::pool::WorkContext;
use crate::engine::queue::TaskQueue;
use crate::engine::raster::{RawImage, RowRange, SharedImage};
use crate::engine::reduction::{Extrema, ReductionState};
use crate::engine::tasks::{Task, TaskFailure};
use crate::engine::transform::Transform;
use crate::error::IpsError;
use crossbeam::channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

// =============================================================================
// Epochs
// =============================================================================

/// Generation counter. Replacing the source image advances it, which makes
/// every task stamped with an older value stale.
#[derive(Debug, Default)]
pub struct EpochClock {
    epoch: AtomicU64,
}

impl EpochClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Bump the epoch and return the new value.
    pub fn advance(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// `StaleEpoch` unless `epoch` is the current one.
    pub fn check(&self, epoch: u64) -> EngineResult<()> {
        let current = self.current();
        if epoch == current {
            Ok(())
        } else {
            Err(IpsError::stale_epoch(epoch, current))
        }
    }
}

// =============================================================================
// Partitioning
// =============================================================================

/// Split `[0, height)` into contiguous blocks of `rows_per_task` rows, top to
/// bottom. Block `b` belongs to lane `b % worker_count`, so each sweep of
/// `worker_count` blocks hands one block to every worker. Images shorter than
/// one sweep just produce fewer blocks than workers.
pub fn partition_rows(
    height: u32,
    worker_count: usize,
    rows_per_task: u32,
) -> EngineResult<Vec<RowRange>> {
    if worker_count == 0 {
        return Err(IpsError::invalid_argument(
            "worker_count",
            "0",
            "at least one worker is required",
        ));
    }
    if rows_per_task == 0 {
        return Err(IpsError::invalid_argument(
            "rows_per_task",
            "0",
            "tasks must cover at least one row",
        ));
    }

    let mut ranges = Vec::with_capacity(height.div_ceil(rows_per_task) as usize);
    let mut start = 0u32;
    while start < height {
        let end = start.saturating_add(rows_per_task).min(height);
        ranges.push(RowRange::checked(start, end, height)?);
        start = end;
    }
    Ok(ranges)
}

/// Worker lane that picks up block `block` in an ideal round-robin sweep.
pub fn lane_of(block: usize, worker_count: usize) -> usize {
    block % worker_count.max(1)
}

// =============================================================================
// Passes
// =============================================================================

/// Everything needed to enqueue one pass.
#[derive(Debug)]
pub struct PassRequest {
    pub source: Arc<RawImage>,
    pub dest: Arc<SharedImage>,
    pub transform: Arc<dyn Transform>,
    pub pass: u32,
    pub worker_count: usize,
    /// Frozen extrema of the previous pass.
    pub upstream: Option<Extrema>,
}

/// Handle to a submitted pass.
#[derive(Debug, Clone)]
pub struct PassTicket {
    barrier: Arc<PassBarrier>,
}

impl PassTicket {
    pub fn epoch(&self) -> u64 {
        self.barrier.epoch()
    }

    pub fn pass(&self) -> u32 {
        self.barrier.pass()
    }

    pub fn tasks(&self) -> usize {
        self.barrier.expected()
    }

    pub fn is_complete(&self) -> bool {
        self.barrier.is_complete()
    }

    /// Block until every task of the pass has arrived.
    pub fn wait(&self) -> PassReport {
        self.barrier.wait()
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<PassReport> {
        self.barrier.wait_timeout(timeout)
    }
}

/// Final image of a pipeline run with one report per pass.
#[derive(Debug, Clone)]
pub struct FrameOutput {
    pub image: RawImage,
    pub reports: Vec<PassReport>,
}

impl FrameOutput {
    pub fn failures(&self) -> impl Iterator<Item = &TaskFailure> {
        self.reports.iter().flat_map(|r| r.failed.iter())
    }
}

#[derive(Debug, Clone)]
pub enum PipelineRun {
    Completed(FrameOutput),
    /// The source was replaced while the pipeline ran; nothing to show.
    Superseded { epoch: u64 },
}

// =============================================================================
// Scheduler
// =============================================================================

/// Failures kept for `drain_failures`. Once full, further failures are only
/// reported through their pass barrier.
pub const FAILURE_BACKLOG: usize = 1024;

/// Splits passes into tasks on the shared queue and orders passes per epoch.
///
/// Tile failures are also copied onto a bounded channel; callers that care
/// about failures outside the pass reports should call `drain_failures`
/// regularly, the frame driver does so every frame.
#[derive(Debug)]
pub struct Scheduler {
    queue: Arc<TaskQueue<Task>>,
    clock: Arc<EpochClock>,
    rows_per_task: u32,
    next_task_id: AtomicU64,
    /// Barrier of the most recently submitted pass.
    outstanding: Mutex<Option<Arc<PassBarrier>>>,
    failures_tx: Sender<TaskFailure>,
    failures_rx: Receiver<TaskFailure>,
}

impl Scheduler {
    pub fn new(rows_per_task: u32) -> EngineResult<Self> {
        if rows_per_task == 0 {
            return Err(IpsError::invalid_argument(
                "rows_per_task",
                "0",
                "tasks must cover at least one row",
            ));
        }
        let (failures_tx, failures_rx) = bounded(FAILURE_BACKLOG);
        Ok(Self {
            queue: Arc::new(TaskQueue::new()),
            clock: Arc::new(EpochClock::new()),
            rows_per_task,
            next_task_id: AtomicU64::new(0),
            outstanding: Mutex::new(None),
            failures_tx,
            failures_rx,
        })
    }

    pub fn from_config(config: &EngineConfig) -> EngineResult<Self> {
        Self::new(config.rows_per_task)
    }

    /// Handles the worker pool needs to drain this scheduler's queue.
    pub fn work_context(&self) -> WorkContext {
        WorkContext {
            queue: Arc::clone(&self.queue),
            clock: Arc::clone(&self.clock),
            failures: self.failures_tx.clone(),
        }
    }

    pub fn rows_per_task(&self) -> u32 {
        self.rows_per_task
    }

    pub fn current_epoch(&self) -> u64 {
        self.clock.current()
    }

    /// Tasks waiting for a worker.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Enqueue one task per row range of `request.dest`, tagged with the
    /// current epoch and `request.pass`.
    ///
    /// Blocks first while the previously submitted pass of the same epoch is
    /// still running.
    pub fn submit_pass(&self, request: PassRequest) -> EngineResult<PassTicket> {
        let PassRequest {
            source,
            dest,
            transform,
            pass,
            worker_count,
            upstream,
        } = request;

        if self.queue.is_closed() {
            return Err(IpsError::invalid_pool_state("running", "stopped"));
        }
        if source.layout() != dest.layout() {
            return Err(IpsError::dimension_mismatch(source.layout(), dest.layout()));
        }
        let contract = transform.contract();
        if contract.reads_upstream() && upstream.is_none() {
            return Err(IpsError::missing_reduction(pass, transform.name()));
        }
        let ranges = partition_rows(dest.height(), worker_count, self.rows_per_task)?;
        for r in &ranges {
            RowRange::checked(r.start, r.end, dest.height())?;
        }

        self.wait_outstanding();

        let epoch = self.clock.current();
        let barrier = Arc::new(PassBarrier::new(
            epoch,
            pass,
            ranges.len(),
            Arc::new(ReductionState::new()),
        ));
        let first_id = self
            .next_task_id
            .fetch_add(ranges.len() as u64, Ordering::Relaxed);
        let tasks = ranges.into_iter().enumerate().map(|(i, rows)| Task {
            id: first_id + i as u64,
            epoch,
            pass,
            rows,
            input: Arc::clone(&source),
            output: Arc::clone(&dest),
            transform: Arc::clone(&transform),
            upstream,
            barrier: Arc::clone(&barrier),
        });

        // Holding `outstanding` across the enqueue keeps a rejected batch from
        // ever becoming the pass the next submission waits on.
        let mut outstanding = self.outstanding.lock();
        let enqueued = match self.queue.enqueue_batch(tasks) {
            Ok(enqueued) => enqueued,
            Err(rejected) => {
                debug!(
                    epoch,
                    pass,
                    tasks = rejected.len(),
                    "pass rejected: pool is shutting down"
                );
                return Err(IpsError::invalid_pool_state("running", "stopped"));
            }
        };
        *outstanding = Some(Arc::clone(&barrier));
        drop(outstanding);
        debug!(
            epoch,
            pass,
            tasks = enqueued,
            worker_count,
            transform = contract.name,
            "pass submitted"
        );
        Ok(PassTicket { barrier })
    }

    fn wait_outstanding(&self) {
        let previous = self.outstanding.lock().clone();
        if let Some(previous) = previous {
            if previous.epoch() == self.clock.current() && !previous.is_complete() {
                trace!(
                    epoch = previous.epoch(),
                    pass = previous.pass(),
                    "waiting for previous pass"
                );
                previous.wait();
            }
        }
    }

    /// Run `passes` in order over `source`. Pass `k + 1` reads the output and
    /// the frozen extrema of pass `k`.
    pub fn run_pipeline(
        &self,
        source: Arc<RawImage>,
        passes: &[Arc<dyn Transform>],
        worker_count: usize,
    ) -> EngineResult<PipelineRun> {
        let epoch = self.clock.current();
        let mut input = source;
        let mut upstream = None;
        let mut reports = Vec::with_capacity(passes.len());

        for (index, transform) in passes.iter().enumerate() {
            let dest = Arc::new(SharedImage::from_image(&input));
            let ticket = self.submit_pass(PassRequest {
                source: Arc::clone(&input),
                dest: Arc::clone(&dest),
                transform: Arc::clone(transform),
                pass: index as u32,
                worker_count,
                upstream,
            })?;
            let report = ticket.wait();
            if report.epoch != epoch || report.superseded() {
                debug!(epoch, pass = index, "pipeline superseded");
                return Ok(PipelineRun::Superseded {
                    epoch: self.clock.current(),
                });
            }
            debug!(
                epoch,
                pass = index,
                executed = report.executed,
                failed = report.failed.len(),
                extrema = ?report.extrema,
                "pass complete"
            );
            upstream = report.extrema;
            reports.push(report);
            input = Arc::new(SharedImage::into_image(dest));
        }

        Ok(self.finish(epoch, input, reports))
    }

    // The source may have been replaced after the last tile committed.
    fn finish(&self, epoch: u64, output: Arc<RawImage>, reports: Vec<PassReport>) -> PipelineRun {
        let current = self.clock.current();
        if current != epoch {
            debug!(epoch, current, "pipeline superseded after last pass");
            return PipelineRun::Superseded { epoch: current };
        }
        let image = Arc::try_unwrap(output).unwrap_or_else(|shared| (*shared).clone());
        PipelineRun::Completed(FrameOutput { image, reports })
    }

    /// Invalidate all in-flight work. Queued tasks of older epochs are removed
    /// and reported to their barriers as discarded; running tasks notice at
    /// commit time.
    pub fn advance_epoch(&self) -> u64 {
        let epoch = self.clock.advance();
        let purged = self.queue.drain_where(|task| task.epoch < epoch);
        let count = purged.len();
        for task in purged {
            let barrier = Arc::clone(&task.barrier);
            drop(task);
            barrier.arrive(TaskOutcome::Discarded);
        }
        debug!(epoch, purged = count, "epoch advanced");
        epoch
    }

    /// Failures reported since the last call.
    pub fn drain_failures(&self) -> Vec<TaskFailure> {
        self.failures_rx.try_iter().collect()
    }
}
