// src/engine.rs
//
// The core of ips. A tiled, multi-pass pixel pipeline that:
// 1. Splits each pass into row-range tasks on a shared queue
// 2. Runs them on a fixed pool of worker threads
// 3. Merges per-task min/max into statistics the next pass can read
//
// This file is a facade over the modules in engine/

// =============================================================================
// SECURITY LIMITS
// =============================================================================

/// Maximum allowed image dimension (width or height).
/// Images larger than 32768x32768 are rejected to prevent decompression bombs.
pub const MAX_DIMENSION: u32 = 32768;

/// Maximum allowed total pixels (width * height).
/// 100 megapixels = 400MB uncompressed RGBA. Beyond this is likely malicious.
pub const MAX_PIXELS: u64 = 100_000_000;

// =============================================================================
// MODULE DECOMPOSITION
// =============================================================================

pub mod barrier;
pub mod common;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod frame;
pub mod pool;
pub mod queue;
pub mod raster;
pub mod reduction;
pub mod scheduler;
#[cfg(feature = "stress")]
mod stress;
pub mod tasks;
pub mod transform;

// Re-export commonly used types and functions
pub use barrier::{PassBarrier, PassReport, TaskOutcome};
pub use common::{run_with_panic_policy, EngineResult};
pub use config::EngineConfig;
pub use decoder::{check_dimensions, decode, decode_bytes};
pub use encoder::{encode_png, write_png};
pub use frame::{
    CaptureSink, FrameDriver, FrameReport, FrameSink, FrameStats, NullSink, PngFileSink,
    FPS_REPORT_INTERVAL,
};
pub use pool::{detect_worker_count, PoolState, WorkContext, WorkerPool, MAX_WORKERS};
pub use queue::{Dequeue, TaskQueue};
pub use raster::{RawImage, RowRange, SharedImage};
pub use reduction::{Extrema, LocalExtrema, ReductionState};
pub use scheduler::{
    partition_rows, EpochClock, FrameOutput, PassRequest, PassTicket, PipelineRun, Scheduler,
    FAILURE_BACKLOG,
};
pub use tasks::{Task, TaskFailure};
pub use transform::{
    apply_sequential, BrightnessContrast, EdgeFilter, InputWindow, Normalize, TileJob, Transform,
    TransformContract,
};

// Re-export stress test function
#[cfg(feature = "stress")]
pub use stress::run_stress_iteration;
