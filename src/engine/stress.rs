// src/engine/stress.rs
//
// Stress test utilities for fuzzing and soak testing.
// Only compiled with --features stress.

use crate::engine::common::EngineResult;
use crate::engine::config::EngineConfig;
use crate::engine::decoder::decode_bytes;
use crate::engine::frame::{FrameDriver, NullSink};
use crate::engine::raster::RawImage;
use crate::error::IpsError;
use crate::ops::{Adjustment, TransformKind};

/// Run a single stress test iteration.
///
/// Decodes `data`, then renders it through every pass combination with a few
/// worker counts while replacing the source between frames, so stale tiles
/// are constantly being discarded.
///
/// # Returns
/// * `Ok(())` if every frame either completed or was superseded
/// * `Err(IpsError)` on decode errors or a frame-fatal error
pub fn run_stress_iteration(data: &[u8]) -> EngineResult<()> {
    let image = decode_bytes(data)?;

    let pipelines = [
        vec![TransformKind::BrightnessContrast],
        vec![TransformKind::BrightnessContrast, TransformKind::Normalize],
        vec![TransformKind::Edge, TransformKind::Normalize],
        vec![
            TransformKind::BrightnessContrast,
            TransformKind::Edge,
            TransformKind::Normalize,
        ],
    ];

    for workers in [1usize, 2, 7] {
        let config = EngineConfig::default()
            .with_worker_count(workers)
            .with_rows_per_task(1 + workers as u32);
        let mut driver = FrameDriver::new(config)?;
        driver.set_adjustment(Adjustment::new(12.0, 1.3))?;
        driver.set_animated(true);

        let mut sink = NullSink::default();
        for passes in &pipelines {
            driver.set_passes(passes.clone());
            driver.load_image(image.clone());
            driver.render_frame(&mut sink)?;
            // A second source with the same layout, swapped in right away.
            driver.load_image(invert(&image)?);
            driver.render_frame(&mut sink)?;
        }
        driver.shutdown();

        if sink.frames == 0 {
            return Err(IpsError::internal_panic(format!(
                "stress: no frame rendered with {workers} workers"
            )));
        }
    }

    Ok(())
}

fn invert(image: &RawImage) -> EngineResult<RawImage> {
    let bytes = image.as_bytes().iter().map(|v| 255 - v).collect();
    RawImage::from_raw(image.width(), image.height(), image.channels(), bytes)
}
