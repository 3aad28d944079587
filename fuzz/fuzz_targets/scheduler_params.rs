#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use ips::engine::{apply_sequential, PipelineRun, RawImage, Scheduler, Transform, WorkerPool};
use ips::ops::{Adjustment, TransformKind};
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;
use std::time::Duration;

#[derive(Arbitrary, Debug)]
struct Params {
    width: u8,
    height: u8,
    alpha: bool,
    workers: u8,
    rows_per_task: u8,
    brightness: i16,
    contrast: u16,
    passes: Vec<u8>,
}

fn build_image(params: &Params, pixels: &[u8]) -> Option<RawImage> {
    let width = params.width as u32 % 32 + 1;
    let height = params.height as u32 % 48 + 1;
    let channels = if params.alpha { 4 } else { 3 };
    if pixels.is_empty() {
        return RawImage::new(width, height, channels).ok();
    }
    RawImage::from_fn(width, height, channels, |x, y, c| {
        let i = (y * width + x) as usize * channels as usize + c;
        pixels[i % pixels.len()]
    })
    .ok()
}

fn build_passes(seeds: &[u8], adjustment: Adjustment) -> Vec<Arc<dyn Transform>> {
    let mut kinds = Vec::new();
    for seed in seeds.iter().take(4) {
        let kind = match seed % 3 {
            0 => TransformKind::BrightnessContrast,
            1 => TransformKind::Edge,
            _ => TransformKind::Normalize,
        };
        // Normalize needs a producing pass in front of it.
        if kind == TransformKind::Normalize && kinds.is_empty() {
            continue;
        }
        kinds.push(kind);
    }
    if kinds.is_empty() {
        kinds.push(TransformKind::BrightnessContrast);
    }
    kinds.into_iter().map(|k| k.into_transform(adjustment)).collect()
}

fuzz_target!(|data: &[u8]| {
    let mut u = Unstructured::new(data);
    let Ok(params) = Params::arbitrary(&mut u) else {
        return;
    };
    let Some(image) = build_image(&params, u.take_rest()) else {
        return;
    };

    let adjustment = Adjustment::new(
        (params.brightness % 101) as f32,
        0.1 + (params.contrast % 490) as f32 / 100.0,
    );
    let passes = build_passes(&params.passes, adjustment);
    let workers = params.workers as usize % 8 + 1;
    let rows_per_task = params.rows_per_task as u32 % 8 + 1;

    let mut expected = image.clone();
    let mut upstream = None;
    for pass in &passes {
        let (next, extrema) = apply_sequential(pass.as_ref(), &expected, upstream)
            .expect("sequential reference failed");
        expected = next;
        upstream = extrema;
    }

    let scheduler = Scheduler::new(rows_per_task).expect("rows_per_task is non-zero");
    let mut pool = WorkerPool::new(scheduler.work_context(), Duration::from_millis(1));
    pool.start(workers).expect("worker count in range");
    let run = scheduler
        .run_pipeline(Arc::new(image), &passes, workers)
        .expect("pipeline failed");
    pool.stop();

    match run {
        PipelineRun::Completed(output) => assert_eq!(output.image, expected),
        PipelineRun::Superseded { .. } => panic!("nothing advanced the epoch"),
    }
});
