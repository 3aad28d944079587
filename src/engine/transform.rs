// src/engine/transform.rs
//
// Per-pixel transforms executed by worker tasks.
//
// A transform sees one tile at a time through a TileJob: a read-only window
// over the pass input, a private scratch buffer for its own rows and a local
// min/max accumulator. What a transform may read is declared up front in its
// TransformContract so the scheduler can validate a pass before enqueuing it.

use crate::engine::common::EngineResult;
use crate::engine::raster::{RawImage, RowRange};
use crate::engine::reduction::{Extrema, LocalExtrema};
use crate::error::IpsError;
use bitflags::bitflags;
use std::fmt;

/// Valid brightness offsets, as exposed by the viewer controls.
pub const BRIGHTNESS_RANGE: (f32, f32) = (-100.0, 100.0);
/// Valid contrast gains.
pub const CONTRAST_RANGE: (f32, f32) = (0.1, 5.0);
/// Below this span a normalize pass leaves pixels untouched.
pub const MIN_NORMALIZE_SPAN: f32 = 1e-6;

bitflags! {
    /// How a transform takes part in the pass reduction.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ReductionUse: u8 {
        /// Needs the frozen extrema of the previous pass.
        const READS_UPSTREAM = 1 << 0;
        /// Folds the values it writes into the pass reduction.
        const CONTRIBUTES = 1 << 1;
    }
}

/// Static description of what a transform reads and produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransformContract {
    pub name: &'static str,
    pub reduction: ReductionUse,
    /// Neighbor rows readable above and below the task range.
    pub halo: u32,
}

impl TransformContract {
    /// Point transform: reads only its own rows, contributes to the reduction.
    pub const fn point(name: &'static str) -> Self {
        Self {
            name,
            reduction: ReductionUse::CONTRIBUTES,
            halo: 0,
        }
    }

    pub const fn with_halo(mut self, halo: u32) -> Self {
        self.halo = halo;
        self
    }

    pub const fn reading_upstream(mut self) -> Self {
        self.reduction = self.reduction.union(ReductionUse::READS_UPSTREAM);
        self
    }

    pub fn reads_upstream(&self) -> bool {
        self.reduction.contains(ReductionUse::READS_UPSTREAM)
    }

    pub fn contributes(&self) -> bool {
        self.reduction.contains(ReductionUse::CONTRIBUTES)
    }
}

/// Read-only view over the rows of the pass input a task may touch.
#[derive(Clone, Copy, Debug)]
pub struct InputWindow<'a> {
    image: &'a RawImage,
    readable: RowRange,
}

impl<'a> InputWindow<'a> {
    /// Window of `rows` widened by `halo`, clamped to the image.
    pub fn new(image: &'a RawImage, rows: RowRange, halo: u32) -> Self {
        let readable = RowRange {
            start: rows.start.saturating_sub(halo),
            end: rows.end.saturating_add(halo).min(image.height()),
        };
        Self { image, readable }
    }

    pub fn readable(&self) -> RowRange {
        self.readable
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Row `y`, or None when it lies outside the window.
    pub fn row(&self, y: u32) -> Option<&'a [u8]> {
        self.readable.contains(y).then(|| self.image.row(y))
    }

    /// Row `y` clamped into the window. Used for border handling.
    pub fn row_clamped(&self, y: i64) -> &'a [u8] {
        let clamped = y.clamp(self.readable.start as i64, self.readable.end as i64 - 1);
        self.image.row(clamped as u32)
    }
}

/// Everything a transform gets to work on one tile.
pub struct TileJob<'a> {
    pub task_id: u64,
    pub rows: RowRange,
    pub input: InputWindow<'a>,
    /// Scratch rows `[rows.start, rows.end)`, pre-filled with the input rows.
    pub output: &'a mut [u8],
    pub channels: usize,
    pub upstream: Option<Extrema>,
    pub local: &'a mut LocalExtrema,
}

impl<'a> TileJob<'a> {
    pub fn width(&self) -> usize {
        self.input.width() as usize
    }

    pub fn row_stride(&self) -> usize {
        self.width() * self.channels
    }

    /// Channels that carry color; alpha is never transformed.
    pub fn color_channels(&self) -> usize {
        self.channels.min(3)
    }

    /// Input row and scratch row for absolute row `y` of this tile.
    pub fn rows_mut(&mut self, y: u32) -> (&'a [u8], &mut [u8]) {
        let stride = self.row_stride();
        let offset = (y - self.rows.start) as usize * stride;
        let input = self.input.image.row(y);
        (input, &mut self.output[offset..offset + stride])
    }

    /// Build a TransformFailure for this tile.
    pub fn failure(&self, transform: &'static str, message: impl Into<String>) -> IpsError {
        IpsError::transform_failure(transform, self.rows.start, self.rows.end, message.into())
    }
}

/// A per-pixel strategy run by worker tasks. Implementations must be pure with
/// respect to the tile: same input window and upstream, same output.
pub trait Transform: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn contract(&self) -> TransformContract;

    fn apply(&self, job: &mut TileJob<'_>) -> EngineResult<()>;
}

// =============================================================================
// Brightness / contrast
// =============================================================================

/// `out = clamp(contrast * in + brightness, 0, 255)` on the color channels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BrightnessContrast {
    pub brightness: f32,
    pub contrast: f32,
}

impl Default for BrightnessContrast {
    fn default() -> Self {
        Self {
            brightness: 50.0,
            contrast: 2.0,
        }
    }
}

impl BrightnessContrast {
    pub const NAME: &'static str = "brightness_contrast";

    pub fn new(brightness: f32, contrast: f32) -> Self {
        Self {
            brightness,
            contrast,
        }
    }

    fn check_params(&self) -> Result<(), String> {
        let in_range = |v: f32, (lo, hi): (f32, f32)| v.is_finite() && v >= lo && v <= hi;
        if !in_range(self.brightness, BRIGHTNESS_RANGE) {
            return Err(format!(
                "brightness {} outside [{}, {}]",
                self.brightness, BRIGHTNESS_RANGE.0, BRIGHTNESS_RANGE.1
            ));
        }
        if !in_range(self.contrast, CONTRAST_RANGE) {
            return Err(format!(
                "contrast {} outside [{}, {}]",
                self.contrast, CONTRAST_RANGE.0, CONTRAST_RANGE.1
            ));
        }
        Ok(())
    }

    #[inline]
    fn map(&self, v: u8) -> u8 {
        (self.contrast * v as f32 + self.brightness).clamp(0.0, 255.0) as u8
    }
}

impl Transform for BrightnessContrast {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn contract(&self) -> TransformContract {
        TransformContract::point(Self::NAME)
    }

    fn apply(&self, job: &mut TileJob<'_>) -> EngineResult<()> {
        self.check_params()
            .map_err(|msg| job.failure(Self::NAME, msg))?;

        let ch = job.channels;
        let color = job.color_channels();
        for y in job.rows.iter() {
            let mut local = *job.local;
            let (src, dst) = job.rows_mut(y);
            for (s, d) in src.chunks_exact(ch).zip(dst.chunks_exact_mut(ch)) {
                for c in 0..color {
                    let v = self.map(s[c]);
                    d[c] = v;
                    local.fold(v as f32);
                }
                if ch > color {
                    d[color..].copy_from_slice(&s[color..]);
                }
            }
            *job.local = local;
        }
        Ok(())
    }
}

// =============================================================================
// Normalize
// =============================================================================

/// Contrast stretch over the previous pass extrema:
/// `out = (in - min) * 255 / (max - min)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Normalize;

impl Normalize {
    pub const NAME: &'static str = "normalize";
}

impl Transform for Normalize {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn contract(&self) -> TransformContract {
        TransformContract::point(Self::NAME).reading_upstream()
    }

    fn apply(&self, job: &mut TileJob<'_>) -> EngineResult<()> {
        let Some(extrema) = job.upstream else {
            return Err(job.failure(Self::NAME, "no upstream extrema"));
        };
        let span = extrema.span();
        let ch = job.channels;
        let color = job.color_channels();

        for y in job.rows.iter() {
            let mut local = *job.local;
            let (src, dst) = job.rows_mut(y);
            for (s, d) in src.chunks_exact(ch).zip(dst.chunks_exact_mut(ch)) {
                for c in 0..color {
                    let v = if span < MIN_NORMALIZE_SPAN {
                        s[c]
                    } else {
                        ((s[c] as f32 - extrema.min) * 255.0 / span).clamp(0.0, 255.0) as u8
                    };
                    d[c] = v;
                    local.fold(v as f32);
                }
                if ch > color {
                    d[color..].copy_from_slice(&s[color..]);
                }
            }
            *job.local = local;
        }
        Ok(())
    }
}

// =============================================================================
// Edge filter
// =============================================================================

/// Sobel gradient magnitude per color channel, borders clamped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EdgeFilter;

impl EdgeFilter {
    pub const NAME: &'static str = "edge";
}

impl Transform for EdgeFilter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn contract(&self) -> TransformContract {
        TransformContract::point(Self::NAME).with_halo(1)
    }

    fn apply(&self, job: &mut TileJob<'_>) -> EngineResult<()> {
        let ch = job.channels;
        let color = job.color_channels();
        let width = job.width();
        let window = job.input;
        let last = width as i64 - 1;

        for y in job.rows.iter() {
            let above = window.row_clamped(y as i64 - 1);
            let below = window.row_clamped(y as i64 + 1);
            let mut local = *job.local;
            let (here, dst) = job.rows_mut(y);

            for x in 0..width {
                let xl = (x as i64 - 1).clamp(0, last) as usize * ch;
                let xm = x * ch;
                let xr = (x as i64 + 1).clamp(0, last) as usize * ch;
                for c in 0..color {
                    let p = |row: &[u8], off: usize| row[off + c] as f32;
                    let gx = (p(above, xr) + 2.0 * p(here, xr) + p(below, xr))
                        - (p(above, xl) + 2.0 * p(here, xl) + p(below, xl));
                    let gy = (p(below, xl) + 2.0 * p(below, xm) + p(below, xr))
                        - (p(above, xl) + 2.0 * p(above, xm) + p(above, xr));
                    let v = (gx * gx + gy * gy).sqrt().clamp(0.0, 255.0) as u8;
                    dst[xm + c] = v;
                    local.fold(v as f32);
                }
                if ch > color {
                    dst[xm + color..xm + ch].copy_from_slice(&here[xm + color..xm + ch]);
                }
            }
            *job.local = local;
        }
        Ok(())
    }
}

/// Apply `transform` to the whole image on the calling thread.
///
/// Reference path for the tiled scheduler: one job covering every row.
pub fn apply_sequential(
    transform: &dyn Transform,
    input: &RawImage,
    upstream: Option<Extrema>,
) -> EngineResult<(RawImage, Option<Extrema>)> {
    let rows = RowRange::checked(0, input.height(), input.height())?;
    let mut output = input.as_bytes().to_vec();
    let mut local = LocalExtrema::default();
    let mut job = TileJob {
        task_id: 0,
        rows,
        input: InputWindow::new(input, rows, transform.contract().halo),
        output: &mut output,
        channels: input.channels() as usize,
        upstream,
        local: &mut local,
    };
    transform.apply(&mut job)?;
    let image = RawImage::from_raw(input.width(), input.height(), input.channels(), output)?;
    Ok((image, local.finish()))
}
