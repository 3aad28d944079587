// src/engine/frame.rs
//
// The per-frame producer loop of the viewer.
//
// FrameDriver owns the scheduler, the worker pool and the current source
// image. Each `render_frame` runs the configured passes over the source and
// hands the result to a FrameSink, the stand-in for texture upload.
// Loading a new image advances the epoch, so work still in flight for the
// previous image is dropped instead of being shown.

use crate::engine::barrier::PassReport;
use crate::engine::common::EngineResult;
use crate::engine::config::EngineConfig;
use crate::engine::decoder;
use crate::engine::encoder;
use crate::engine::pool::{PoolState, WorkerPool};
use crate::engine::raster::RawImage;
use crate::engine::scheduler::{PipelineRun, Scheduler};
use crate::engine::transform::Transform;
use crate::ops::{Adjustment, AdjustmentAnimator, TransformKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Frames between two frame-rate reports.
pub const FPS_REPORT_INTERVAL: u64 = 240;

/// Receives every finished frame.
pub trait FrameSink {
    fn upload_or_update(&mut self, image: &RawImage) -> EngineResult<()>;
}

/// Discards frames, counting them.
#[derive(Debug, Default)]
pub struct NullSink {
    pub frames: u64,
}

impl FrameSink for NullSink {
    fn upload_or_update(&mut self, _image: &RawImage) -> EngineResult<()> {
        self.frames += 1;
        Ok(())
    }
}

/// Keeps a copy of the latest frame.
#[derive(Debug, Default)]
pub struct CaptureSink {
    latest: Option<RawImage>,
}

impl CaptureSink {
    pub fn latest(&self) -> Option<&RawImage> {
        self.latest.as_ref()
    }

    pub fn take(&mut self) -> Option<RawImage> {
        self.latest.take()
    }
}

impl FrameSink for CaptureSink {
    fn upload_or_update(&mut self, image: &RawImage) -> EngineResult<()> {
        self.latest = Some(image.clone());
        Ok(())
    }
}

/// Writes the latest frame to a PNG file, replacing it every frame.
#[derive(Debug)]
pub struct PngFileSink {
    path: PathBuf,
    written: u64,
}

impl PngFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl FrameSink for PngFileSink {
    fn upload_or_update(&mut self, image: &RawImage) -> EngineResult<()> {
        encoder::write_png(&self.path, image)?;
        self.written += 1;
        Ok(())
    }
}

/// Frame counter with a periodic frame-rate report.
#[derive(Debug)]
pub struct FrameStats {
    frames: u64,
    interval: u64,
    window_start: Instant,
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new(FPS_REPORT_INTERVAL)
    }
}

impl FrameStats {
    pub fn new(interval: u64) -> Self {
        Self {
            frames: 0,
            interval: interval.max(1),
            window_start: Instant::now(),
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Count one frame; every `interval` frames returns the rate of the last window.
    pub fn record(&mut self, width: u32, height: u32) -> Option<f32> {
        self.frames += 1;
        if self.frames % self.interval != 0 {
            return None;
        }
        let now = Instant::now();
        let elapsed = now.duration_since(self.window_start).as_secs_f32();
        self.window_start = now;
        let fps = if elapsed > 0.0 {
            self.interval as f32 / elapsed
        } else {
            f32::INFINITY
        };
        info!("{width} X {height} at {fps:.2} FPS");
        Some(fps)
    }
}

/// What happened in one rendered frame.
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub frame: u64,
    pub epoch: u64,
    pub adjustment: Adjustment,
    pub passes: Vec<PassReport>,
    pub elapsed: Duration,
    /// Set on frames that close a frame-rate window.
    pub fps: Option<f32>,
}

impl FrameReport {
    pub fn failed_tiles(&self) -> usize {
        self.passes.iter().map(|p| p.failed.len()).sum()
    }
}

pub struct FrameDriver {
    config: EngineConfig,
    scheduler: Arc<Scheduler>,
    pool: WorkerPool,
    source: Option<Arc<RawImage>>,
    passes: Vec<TransformKind>,
    adjustment: Adjustment,
    animator: Option<AdjustmentAnimator>,
    stats: FrameStats,
    last_frame: Option<Instant>,
}

impl FrameDriver {
    /// Validate `config` and start the worker pool.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let scheduler = Arc::new(Scheduler::from_config(&config)?);
        let mut pool = WorkerPool::new(scheduler.work_context(), config.idle_timeout);
        pool.start(config.worker_count)?;
        Ok(Self {
            config,
            scheduler,
            pool,
            source: None,
            passes: vec![TransformKind::BrightnessContrast],
            adjustment: Adjustment::default(),
            animator: None,
            stats: FrameStats::default(),
            last_frame: None,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shared scheduler, e.g. for an event thread that needs to cancel work.
    pub fn scheduler(&self) -> Arc<Scheduler> {
        Arc::clone(&self.scheduler)
    }

    pub fn source(&self) -> Option<&RawImage> {
        self.source.as_deref()
    }

    pub fn frames(&self) -> u64 {
        self.stats.frames()
    }

    /// Replace the source image. Returns the new epoch.
    pub fn load_image(&mut self, image: RawImage) -> u64 {
        let epoch = self.scheduler.advance_epoch();
        debug!(
            epoch,
            width = image.width(),
            height = image.height(),
            "source replaced"
        );
        self.source = Some(Arc::new(image));
        epoch
    }

    /// Decode `path` and make it the source.
    pub fn load_path(&mut self, path: impl AsRef<Path>) -> EngineResult<u64> {
        let image = decoder::decode(path)?;
        Ok(self.load_image(image))
    }

    pub fn set_passes(&mut self, passes: Vec<TransformKind>) {
        self.passes = passes;
    }

    pub fn set_adjustment(&mut self, adjustment: Adjustment) -> EngineResult<()> {
        adjustment.validate()?;
        self.adjustment = adjustment;
        if let Some(animator) = &mut self.animator {
            *animator = AdjustmentAnimator::new(adjustment);
        }
        Ok(())
    }

    pub fn adjustment(&self) -> Adjustment {
        self.adjustment
    }

    /// Animate the adjustment from its current value on every frame.
    pub fn set_animated(&mut self, animated: bool) {
        self.animator = animated.then(|| AdjustmentAnimator::new(self.adjustment));
    }

    /// Run the pass pipeline once and hand the result to `sink`.
    ///
    /// Returns `Ok(None)` when no image is loaded or the frame was superseded
    /// by a newer image. Tile failures do not fail the frame; they are listed
    /// in the report.
    pub fn render_frame(&mut self, sink: &mut dyn FrameSink) -> EngineResult<Option<FrameReport>> {
        let Some(source) = self.source.clone() else {
            return Ok(None);
        };

        let started = Instant::now();
        let dt = self
            .last_frame
            .map(|t| started.duration_since(t).as_secs_f32())
            .unwrap_or(0.0);
        self.last_frame = Some(started);
        if let Some(animator) = &mut self.animator {
            self.adjustment = animator.advance(dt);
        }

        let transforms: Vec<Arc<dyn Transform>> = self
            .passes
            .iter()
            .map(|kind| kind.into_transform(self.adjustment))
            .collect();
        let epoch = self.scheduler.current_epoch();
        let run = self
            .scheduler
            .run_pipeline(source, &transforms, self.config.worker_count)?;

        // Channel copies of failures already reported through the pass barriers.
        let drained = self.scheduler.drain_failures();

        let output = match run {
            PipelineRun::Completed(output) => output,
            PipelineRun::Superseded { epoch } => {
                debug!(epoch, "frame superseded");
                return Ok(None);
            }
        };

        let failed: usize = output.failures().count();
        if failed > 0 {
            warn!(
                epoch,
                failed,
                drained = drained.len(),
                "frame rendered with failed tiles"
            );
        }

        sink.upload_or_update(&output.image)?;
        let fps = self
            .stats
            .record(output.image.width(), output.image.height());

        Ok(Some(FrameReport {
            frame: self.stats.frames(),
            epoch,
            adjustment: self.adjustment,
            passes: output.reports,
            elapsed: started.elapsed(),
            fps,
        }))
    }

    /// Stop the workers. Further frames fail with `InvalidPoolState`.
    pub fn shutdown(&mut self) {
        if self.pool.state() == PoolState::Running {
            info!(frames = self.stats.frames(), "shutting down");
        }
        self.pool.stop();
    }
}
