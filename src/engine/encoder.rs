// src/engine/encoder.rs
//
// PNG output for the file sink and the CLI.

use crate::engine::common::run_with_panic_policy;
use crate::engine::raster::RawImage;
use crate::error::IpsError;
use image::ImageFormat;
use std::fs;
use std::io::Cursor;
use std::path::Path;

type EncoderResult<T> = std::result::Result<T, IpsError>;

/// Encode to PNG bytes (lossless).
pub fn encode_png(image: &RawImage) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:png", || {
        let dynamic = image.to_dynamic()?;
        let mut buf = Vec::with_capacity(image.as_bytes().len() / 2);
        dynamic
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| IpsError::encode_failed("png", format!("PNG encode failed: {e}")))?;
        Ok(buf)
    })
}

/// Encode and write to `path`. The file is written through a sibling
/// temporary so readers never observe a partial PNG.
pub fn write_png(path: impl AsRef<Path>, image: &RawImage) -> EncoderResult<()> {
    let path = path.as_ref();
    let bytes = encode_png(image)?;
    let tmp = path.with_extension("png.tmp");
    let display = || path.to_string_lossy().into_owned();
    fs::write(&tmp, &bytes).map_err(|e| IpsError::file_write_failed(display(), e))?;
    fs::rename(&tmp, path).map_err(|e| IpsError::file_write_failed(display(), e))?;
    Ok(())
}
