// lib.rs
//
// ips: parallel tile-processing engine for an interactive image viewer
//
// Design goals:
// - Every row of every pass is processed exactly once
// - Passes can read statistics merged from the previous pass
// - A failing tile never takes the frame or the process down
// - Replacing the image cancels stale work instead of racing it

// Memory allocator optimization - jemalloc for better multi-threaded allocation
// Note: jemalloc is not supported on Windows/MSVC, so we exclude it on that platform
#[cfg(all(feature = "jemalloc", not(target_env = "msvc")))]
#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

pub mod engine;
pub mod error;
pub mod ops;

pub use engine::{
    decode, EngineConfig, FrameDriver, FrameSink, RawImage, Scheduler, Transform, WorkerPool,
};
pub use error::{ErrorCategory, IpsError};
pub use ops::{Adjustment, AdjustmentAnimator, TransformKind};

/// Fuzzing entrypoint: decode arbitrary bytes and, when they form a small
/// image, push it through a two-pass pipeline on a single worker.
#[cfg(feature = "fuzzing")]
pub fn fuzz_decode_and_process(data: &[u8]) -> Result<(), IpsError> {
    use std::sync::Arc;
    use std::time::Duration;

    let image = engine::decode_bytes(data)?;
    if image.width() as u64 * image.height() as u64 > 1 << 16 {
        return Ok(());
    }
    let scheduler = Scheduler::new(4)?;
    let mut pool = WorkerPool::new(scheduler.work_context(), Duration::from_millis(5));
    pool.start(1)?;
    let passes: Vec<Arc<dyn Transform>> =
        [TransformKind::BrightnessContrast, TransformKind::Normalize]
            .into_iter()
            .map(|kind| kind.into_transform(Adjustment::default()))
            .collect();
    scheduler.run_pipeline(Arc::new(image), &passes, 1)?;
    pool.stop();
    Ok(())
}
