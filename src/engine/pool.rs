// src/engine/pool.rs
//
// Fixed-size worker pool draining the scheduler queue.
//
// **Lifecycle**: Created -> Running -> Draining -> Stopped. Workers are plain
// named OS threads, spawned once in `start` and joined in `stop`. Closing the
// queue is the only shutdown signal: workers finish whatever is still queued,
// then see `Closed` and exit.
//
// **Thread Count Calculation**:
// - Uses std::thread::available_parallelism() to respect cgroup/CPU quota
// - Fallback is MIN_WORKERS when detection fails
// - IPS_WORKER_COUNT overrides detection (see config.rs)
//
// A worker only ever blocks inside `dequeue_or_wait`; tile failures and
// panics are handled inside the task and never reach the worker loop.

use crate::engine::common::{panic_message, EngineResult};
use crate::engine::queue::{Dequeue, TaskQueue};
use crate::engine::scheduler::EpochClock;
use crate::engine::tasks::{run_task, Task, TaskFailure};
use crate::error::IpsError;
use crossbeam::channel::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{info, trace, warn};

/// Maximum allowed worker count
pub const MAX_WORKERS: usize = 1024;

/// Minimum number of workers to ensure at least some progress
pub const MIN_WORKERS: usize = 1;

/// Logical cores available to this process, at least MIN_WORKERS.
pub fn detect_worker_count() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(MIN_WORKERS)
        .max(MIN_WORKERS)
}

/// Shared handles a worker needs: the queue, the epoch clock and the failure channel.
#[derive(Clone, Debug)]
pub struct WorkContext {
    pub(crate) queue: Arc<TaskQueue<Task>>,
    pub(crate) clock: Arc<EpochClock>,
    pub(crate) failures: Sender<TaskFailure>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolState {
    Created,
    Running,
    Draining,
    Stopped,
}

impl PoolState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

/// Per-worker counters, returned when the worker exits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub tasks: u64,
    pub idle_wakeups: u64,
}

#[derive(Debug)]
pub struct WorkerPool {
    context: WorkContext,
    idle_timeout: Duration,
    state: PoolState,
    handles: Vec<JoinHandle<WorkerStats>>,
}

impl WorkerPool {
    pub fn new(context: WorkContext, idle_timeout: Duration) -> Self {
        Self {
            context,
            idle_timeout,
            state: PoolState::Created,
            handles: Vec::new(),
        }
    }

    pub fn state(&self) -> PoolState {
        self.state
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Spawn `worker_count` threads named `ips-worker-{i}`.
    ///
    /// If the OS refuses a thread, the workers spawned so far are shut down and
    /// the pool ends up Stopped.
    pub fn start(&mut self, worker_count: usize) -> EngineResult<()> {
        if self.state != PoolState::Created {
            return Err(IpsError::invalid_pool_state(
                PoolState::Created.as_str(),
                self.state.as_str(),
            ));
        }
        if worker_count < MIN_WORKERS || worker_count > MAX_WORKERS {
            return Err(IpsError::invalid_argument(
                "worker_count",
                worker_count.to_string(),
                format!("must be between {MIN_WORKERS} and {MAX_WORKERS}"),
            ));
        }

        self.handles.reserve(worker_count);
        for index in 0..worker_count {
            let context = self.context.clone();
            let idle_timeout = self.idle_timeout;
            let spawned = thread::Builder::new()
                .name(format!("ips-worker-{index}"))
                .spawn(move || worker_loop(index, context, idle_timeout));
            match spawned {
                Ok(handle) => self.handles.push(handle),
                Err(source) => {
                    warn!(index, "failed to spawn worker: {source}");
                    self.state = PoolState::Running;
                    self.stop();
                    return Err(IpsError::worker_spawn_failed(index, source));
                }
            }
        }

        self.state = PoolState::Running;
        info!(
            workers = worker_count,
            idle_timeout_ms = self.idle_timeout.as_millis() as u64,
            "worker pool started"
        );
        Ok(())
    }

    /// Close the queue, let the workers drain it and join them. Idempotent.
    pub fn stop(&mut self) {
        match self.state {
            PoolState::Stopped | PoolState::Draining => return,
            PoolState::Created => {
                self.context.queue.close();
                self.state = PoolState::Stopped;
                return;
            }
            PoolState::Running => {}
        }

        self.state = PoolState::Draining;
        self.context.queue.close();

        let mut total = WorkerStats::default();
        for (index, handle) in self.handles.drain(..).enumerate() {
            match handle.join() {
                Ok(stats) => {
                    total.tasks += stats.tasks;
                    total.idle_wakeups += stats.idle_wakeups;
                }
                Err(payload) => {
                    warn!(index, "worker panicked: {}", panic_message(payload.as_ref()));
                }
            }
        }

        self.state = PoolState::Stopped;
        info!(
            tasks = total.tasks,
            idle_wakeups = total.idle_wakeups,
            "worker pool stopped"
        );
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(index: usize, context: WorkContext, idle_timeout: Duration) -> WorkerStats {
    let mut stats = WorkerStats::default();
    loop {
        match context.queue.dequeue_or_wait(idle_timeout) {
            Dequeue::Item(task) => {
                run_task(task, &context.clock, &context.failures);
                stats.tasks += 1;
            }
            Dequeue::TimedOut => {
                stats.idle_wakeups += 1;
                trace!(worker = index, "idle");
            }
            Dequeue::Closed => break,
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::raster::RawImage;
    use crate::engine::scheduler::{PipelineRun, Scheduler};
    use crate::engine::transform::{BrightnessContrast, Transform};
    use std::sync::Arc;

    fn pool(scheduler: &Scheduler) -> WorkerPool {
        WorkerPool::new(scheduler.work_context(), Duration::from_millis(5))
    }

    #[test]
    fn detect_worker_count_is_positive() {
        assert!(detect_worker_count() >= MIN_WORKERS);
    }

    #[test]
    fn lifecycle_transitions() {
        let scheduler = Scheduler::new(1).unwrap();
        let mut pool = pool(&scheduler);
        assert_eq!(pool.state(), PoolState::Created);
        pool.start(3).unwrap();
        assert_eq!(pool.state(), PoolState::Running);
        assert_eq!(pool.worker_count(), 3);

        assert!(matches!(
            pool.start(1),
            Err(IpsError::InvalidPoolState { .. })
        ));

        pool.stop();
        assert_eq!(pool.state(), PoolState::Stopped);
        pool.stop();
        assert_eq!(pool.state(), PoolState::Stopped);
    }

    #[test]
    fn start_rejects_bad_worker_counts() {
        let scheduler = Scheduler::new(1).unwrap();
        let mut pool = pool(&scheduler);
        assert!(matches!(
            pool.start(0),
            Err(IpsError::InvalidArgument { .. })
        ));
        assert!(pool.start(MAX_WORKERS + 1).is_err());
        assert_eq!(pool.state(), PoolState::Created);
    }

    #[test]
    fn stopped_pool_rejects_submissions() {
        let scheduler = Scheduler::new(1).unwrap();
        let mut pool = pool(&scheduler);
        pool.stop();
        let img = Arc::new(RawImage::new(2, 2, 3).unwrap());
        let passes: Vec<Arc<dyn Transform>> =
            vec![Arc::new(BrightnessContrast::default())];
        assert!(matches!(
            scheduler.run_pipeline(img, &passes, 1),
            Err(IpsError::InvalidPoolState { .. })
        ));
    }

    #[test]
    fn workers_drain_a_pipeline() {
        let scheduler = Scheduler::new(1).unwrap();
        let mut pool = pool(&scheduler);
        pool.start(4).unwrap();

        let img = Arc::new(RawImage::from_fn(8, 32, 3, |x, _, _| x as u8).unwrap());
        let passes: Vec<Arc<dyn Transform>> =
            vec![Arc::new(BrightnessContrast::new(10.0, 1.0))];
        let run = scheduler.run_pipeline(img, &passes, 4).unwrap();
        match run {
            PipelineRun::Completed(out) => {
                assert_eq!(out.reports[0].executed, 32);
                assert_eq!(out.image.pixel(7, 31), &[17, 17, 17]);
            }
            other => panic!("unexpected run: {other:?}"),
        }
        pool.stop();
    }
}
