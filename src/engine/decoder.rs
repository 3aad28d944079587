// src/engine/decoder.rs
//
// Decode collaborator: PNG file or buffer -> RawImage.
//
// Files are memory-mapped and handed to the image crate without an extra copy.
// Header dimensions are checked before any pixel buffer is allocated.

use crate::engine::common::run_with_panic_policy;
use crate::engine::raster::RawImage;
use crate::error::IpsError;
use image::{ImageFormat, ImageReader};
use memmap2::Mmap;
use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

use crate::engine::{MAX_DIMENSION, MAX_PIXELS};

// Type alias for Result - always use IpsError to preserve error taxonomy
type DecoderResult<T> = std::result::Result<T, IpsError>;

/// Detect input format using magic bytes. Returns None if unknown.
pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

/// Check if image dimensions are within safe limits.
/// Returns an error if the image is too large (potential decompression bomb).
pub fn check_dimensions(width: u32, height: u32) -> DecoderResult<()> {
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(IpsError::dimension_exceeds_limit(
            width.max(height),
            MAX_DIMENSION,
        ));
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(IpsError::pixel_count_exceeds_limit(pixels, MAX_PIXELS));
    }
    Ok(())
}

/// Decode an in-memory PNG.
pub fn decode_bytes(bytes: &[u8]) -> DecoderResult<RawImage> {
    match detect_format(bytes) {
        Some(ImageFormat::Png) => {}
        Some(other) => {
            return Err(IpsError::unsupported_format(
                other.extensions_str().first().copied().unwrap_or("unknown"),
            ))
        }
        None => return Err(IpsError::unsupported_format("unknown")),
    }

    run_with_panic_policy("decode:png", || {
        let reader = ImageReader::with_format(Cursor::new(bytes), ImageFormat::Png);
        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| IpsError::decode_failed(format!("png: failed to read header: {e}")))?;
        check_dimensions(width, height)?;

        let img = image::load_from_memory_with_format(bytes, ImageFormat::Png)
            .map_err(|e| IpsError::decode_failed(format!("png: decode failed: {e}")))?;
        RawImage::from_dynamic(img)
    })
}

/// Decode a PNG file.
pub fn decode(path: impl AsRef<Path>) -> DecoderResult<RawImage> {
    let path = path.as_ref();
    let shown = path.to_string_lossy().into_owned();
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => IpsError::file_not_found(shown.clone()),
        _ => IpsError::file_read_failed(shown.clone(), e),
    })?;

    // SAFETY: the map is read-only and dropped before this function returns;
    // concurrent truncation of the file by another process is not supported.
    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| IpsError::mmap_failed(shown, e))?;
    let image = decode_bytes(&mmap)?;
    debug!(
        path = %path.display(),
        width = image.width(),
        height = image.height(),
        channels = image.channels(),
        "decoded"
    );
    Ok(image)
}
