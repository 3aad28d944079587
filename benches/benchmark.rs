use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ips::engine::{apply_sequential, PipelineRun, RawImage, Scheduler, Transform, WorkerPool};
use ips::ops::{Adjustment, TransformKind};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

fn frame() -> Arc<RawImage> {
    Arc::new(
        RawImage::from_fn(WIDTH, HEIGHT, 4, |x, y, c| {
            if c == 3 {
                255
            } else {
                ((x ^ y) as usize + c * 40) as u8
            }
        })
        .unwrap(),
    )
}

fn passes(kinds: &[TransformKind]) -> Vec<Arc<dyn Transform>> {
    kinds
        .iter()
        .map(|k| k.into_transform(Adjustment::default()))
        .collect()
}

fn bench_sequential(c: &mut Criterion) {
    let source = frame();
    let bc = TransformKind::BrightnessContrast.into_transform(Adjustment::default());

    let mut group = c.benchmark_group("sequential");
    group.throughput(Throughput::Elements(WIDTH as u64 * HEIGHT as u64));
    group.bench_function("brightness_contrast", |b| {
        b.iter(|| apply_sequential(bc.as_ref(), black_box(&source), None).unwrap())
    });
    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let source = frame();
    let pipelines = [
        ("brightness_contrast", passes(&[TransformKind::BrightnessContrast])),
        (
            "bc_normalize",
            passes(&[TransformKind::BrightnessContrast, TransformKind::Normalize]),
        ),
        (
            "edge_normalize",
            passes(&[TransformKind::Edge, TransformKind::Normalize]),
        ),
    ];

    for (name, transforms) in &pipelines {
        let mut group = c.benchmark_group(format!("pipeline/{name}"));
        group.throughput(Throughput::Elements(WIDTH as u64 * HEIGHT as u64));
        for workers in [1usize, 2, 4, 8] {
            let scheduler = Scheduler::new(1).unwrap();
            let mut pool = WorkerPool::new(scheduler.work_context(), Duration::from_millis(50));
            pool.start(workers).unwrap();

            group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, &w| {
                b.iter(|| {
                    let run = scheduler
                        .run_pipeline(Arc::clone(&source), transforms, w)
                        .unwrap();
                    assert!(matches!(run, PipelineRun::Completed(_)));
                    black_box(run)
                })
            });
            pool.stop();
        }
        group.finish();
    }
}

fn bench_rows_per_task(c: &mut Criterion) {
    let source = frame();
    let transforms = passes(&[TransformKind::BrightnessContrast]);
    let workers = 4;

    let mut group = c.benchmark_group("rows_per_task");
    for rows in [1u32, 4, 16, 64] {
        let scheduler = Scheduler::new(rows).unwrap();
        let mut pool = WorkerPool::new(scheduler.work_context(), Duration::from_millis(50));
        pool.start(workers).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(rows), &rows, |b, _| {
            b.iter(|| {
                black_box(
                    scheduler
                        .run_pipeline(Arc::clone(&source), &transforms, workers)
                        .unwrap(),
                )
            })
        });
        pool.stop();
    }
    group.finish();
}

criterion_group!(benches, bench_sequential, bench_pipeline, bench_rows_per_task);
criterion_main!(benches);
