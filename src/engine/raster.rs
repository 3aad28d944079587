// src/engine/raster.rs
//
// Raw pixel containers handed between the decode collaborator, the scheduler
// and the render collaborator.
//
// RawImage is a plain owned buffer. SharedImage is the destination of a pass:
// every row sits behind its own lock so that tasks owning disjoint row ranges
// can write concurrently without unsafe code.

use crate::engine::common::EngineResult;
use crate::error::IpsError;
use image::{DynamicImage, RgbImage, RgbaImage};
use parking_lot::Mutex;
use std::sync::Arc;

/// Half-open row interval `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RowRange {
    pub start: u32,
    pub end: u32,
}

impl RowRange {
    /// Build a range that is guaranteed to satisfy `start < end <= height`.
    pub fn checked(start: u32, end: u32, height: u32) -> EngineResult<Self> {
        if start >= end || end > height {
            return Err(IpsError::invalid_task_range(start, end, height));
        }
        Ok(Self { start, end })
    }

    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn contains(&self, y: u32) -> bool {
        y >= self.start && y < self.end
    }

    pub fn iter(&self) -> std::ops::Range<u32> {
        self.start..self.end
    }
}

/// Decoded image: `channels` interleaved 8-bit samples per pixel, row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawImage {
    width: u32,
    height: u32,
    channels: u8,
    buffer: Vec<u8>,
}

fn check_layout(width: u32, height: u32, channels: u8) -> EngineResult<usize> {
    if channels != 3 && channels != 4 {
        return Err(IpsError::unsupported_channel_count(channels));
    }
    if width == 0 || height == 0 {
        return Err(IpsError::invalid_image_layout(width, height, channels, 0));
    }
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|px| px.checked_mul(channels as usize))
        .ok_or_else(|| IpsError::invalid_image_layout(width, height, channels, usize::MAX))
}

impl RawImage {
    /// Zero-filled image.
    pub fn new(width: u32, height: u32, channels: u8) -> EngineResult<Self> {
        let len = check_layout(width, height, channels)?;
        Ok(Self {
            width,
            height,
            channels,
            buffer: vec![0; len],
        })
    }

    /// Wrap an existing buffer. Fails unless `buffer.len() == height * width * channels`.
    pub fn from_raw(width: u32, height: u32, channels: u8, buffer: Vec<u8>) -> EngineResult<Self> {
        let expected = check_layout(width, height, channels)?;
        if buffer.len() != expected {
            return Err(IpsError::invalid_image_layout(
                width,
                height,
                channels,
                buffer.len(),
            ));
        }
        Ok(Self {
            width,
            height,
            channels,
            buffer,
        })
    }

    /// Build from a pixel function, handy for tests and synthetic frames.
    pub fn from_fn<F>(width: u32, height: u32, channels: u8, mut f: F) -> EngineResult<Self>
    where
        F: FnMut(u32, u32, usize) -> u8,
    {
        let mut img = Self::new(width, height, channels)?;
        let ch = channels as usize;
        for y in 0..height {
            let row = img.row_mut(y);
            for x in 0..width {
                for c in 0..ch {
                    row[x as usize * ch + c] = f(x, y, c);
                }
            }
        }
        Ok(img)
    }

    /// Convert a decoded `image` crate buffer, keeping alpha only when present.
    pub fn from_dynamic(img: DynamicImage) -> EngineResult<Self> {
        if img.color().has_alpha() {
            let rgba = img.into_rgba8();
            let (w, h) = rgba.dimensions();
            Self::from_raw(w, h, 4, rgba.into_raw())
        } else {
            let rgb = img.into_rgb8();
            let (w, h) = rgb.dimensions();
            Self::from_raw(w, h, 3, rgb.into_raw())
        }
    }

    /// Convert back for encoding.
    pub fn to_dynamic(&self) -> EngineResult<DynamicImage> {
        let buf = self.buffer.clone();
        let img = match self.channels {
            3 => RgbImage::from_raw(self.width, self.height, buf).map(DynamicImage::ImageRgb8),
            _ => RgbaImage::from_raw(self.width, self.height, buf).map(DynamicImage::ImageRgba8),
        };
        img.ok_or_else(|| {
            IpsError::invalid_image_layout(
                self.width,
                self.height,
                self.channels,
                self.buffer.len(),
            )
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// `(width, height, channels)`
    pub fn layout(&self) -> (u32, u32, u8) {
        (self.width, self.height, self.channels)
    }

    pub fn row_stride(&self) -> usize {
        self.width as usize * self.channels as usize
    }

    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.row_stride();
        let start = y as usize * stride;
        &self.buffer[start..start + stride]
    }

    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let stride = self.row_stride();
        let start = y as usize * stride;
        &mut self.buffer[start..start + stride]
    }

    /// Contiguous bytes of rows `range`.
    pub fn rows(&self, range: RowRange) -> &[u8] {
        let stride = self.row_stride();
        &self.buffer[range.start as usize * stride..range.end as usize * stride]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.buffer
    }

    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let ch = self.channels as usize;
        let start = x as usize * ch;
        &self.row(y)[start..start + ch]
    }
}

/// Destination image of a pass with one lock per row.
#[derive(Debug)]
pub struct SharedImage {
    width: u32,
    height: u32,
    channels: u8,
    rows: Vec<Mutex<Box<[u8]>>>,
}

impl SharedImage {
    /// Deep copy of `image`; untouched or failed rows keep these contents.
    pub fn from_image(image: &RawImage) -> Self {
        let rows = (0..image.height())
            .map(|y| Mutex::new(image.row(y).to_vec().into_boxed_slice()))
            .collect();
        Self {
            width: image.width(),
            height: image.height(),
            channels: image.channels(),
            rows,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn layout(&self) -> (u32, u32, u8) {
        (self.width, self.height, self.channels)
    }

    pub fn row_stride(&self) -> usize {
        self.width as usize * self.channels as usize
    }

    /// Copy rows `range` into one contiguous buffer.
    pub fn copy_rows(&self, range: RowRange) -> Vec<u8> {
        let mut out = Vec::with_capacity(range.len() as usize * self.row_stride());
        for y in range.iter() {
            out.extend_from_slice(&self.rows[y as usize].lock());
        }
        out
    }

    /// Overwrite rows `range` from a contiguous buffer of `range.len()` rows.
    pub fn write_rows(&self, range: RowRange, bytes: &[u8]) -> EngineResult<()> {
        let stride = self.row_stride();
        if range.end > self.height || bytes.len() != range.len() as usize * stride {
            return Err(IpsError::invalid_task_range(
                range.start,
                range.end,
                self.height,
            ));
        }
        for (y, chunk) in range.iter().zip(bytes.chunks_exact(stride)) {
            self.rows[y as usize].lock().copy_from_slice(chunk);
        }
        Ok(())
    }

    /// Assemble the current contents into a RawImage.
    pub fn snapshot(&self) -> RawImage {
        let mut buffer = Vec::with_capacity(self.height as usize * self.row_stride());
        for row in &self.rows {
            buffer.extend_from_slice(&row.lock());
        }
        RawImage {
            width: self.width,
            height: self.height,
            channels: self.channels,
            buffer,
        }
    }

    /// Take the rows out without copying when this is the last reference.
    pub fn into_image(this: Arc<Self>) -> RawImage {
        match Arc::try_unwrap(this) {
            Ok(shared) => {
                let mut buffer = Vec::with_capacity(shared.height as usize * shared.row_stride());
                for row in shared.rows {
                    buffer.extend_from_slice(&row.into_inner());
                }
                RawImage {
                    width: shared.width,
                    height: shared.height,
                    channels: shared.channels,
                    buffer,
                }
            }
            Err(shared) => shared.snapshot(),
        }
    }
}
