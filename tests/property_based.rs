// tests/property_based.rs
//
// Property tests for the tiled scheduler: the parallel pipeline must be
// indistinguishable from running each pass sequentially over the whole image.

use ips::engine::{
    apply_sequential, partition_rows, Extrema, PipelineRun, RawImage, Scheduler, TileJob,
    Transform, TransformContract, WorkerPool,
};
use ips::error::IpsError;
use ips::ops::{Adjustment, TransformKind};
use proptest::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Stamps every pixel with a per-row tag and counts how often each row was processed.
#[derive(Debug)]
struct RowTagger {
    visits: Vec<AtomicU32>,
}

impl RowTagger {
    fn new(height: u32) -> Self {
        Self {
            visits: (0..height).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    fn tag(y: u32) -> u8 {
        (y % 251) as u8 + 1
    }
}

impl Transform for RowTagger {
    fn name(&self) -> &'static str {
        "row_tagger"
    }

    fn contract(&self) -> TransformContract {
        TransformContract::point("row_tagger")
    }

    fn apply(&self, job: &mut TileJob<'_>) -> Result<(), IpsError> {
        for y in job.rows.iter() {
            self.visits[y as usize].fetch_add(1, Ordering::Relaxed);
            let (_, dst) = job.rows_mut(y);
            dst.fill(Self::tag(y));
        }
        Ok(())
    }
}

fn pool_for(scheduler: &Scheduler, workers: usize) -> WorkerPool {
    let mut pool = WorkerPool::new(scheduler.work_context(), Duration::from_millis(5));
    pool.start(workers).unwrap();
    pool
}

fn completed(run: PipelineRun) -> ips::engine::FrameOutput {
    match run {
        PipelineRun::Completed(output) => output,
        other => panic!("expected a completed run, got {other:?}"),
    }
}

fn image_strategy() -> impl Strategy<Value = RawImage> {
    (1u32..=24, 1u32..=40, prop_oneof![Just(3u8), Just(4u8)])
        .prop_flat_map(|(w, h, ch)| {
            let len = (w * h * ch as u32) as usize;
            proptest::collection::vec(any::<u8>(), len)
                .prop_map(move |bytes| RawImage::from_raw(w, h, ch, bytes).unwrap())
        })
}

fn adjustment_strategy() -> impl Strategy<Value = Adjustment> {
    (-100.0f32..=100.0, 0.1f32..=5.0).prop_map(|(b, c)| Adjustment::new(b, c))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn every_row_is_processed_exactly_once(
        width in 1u32..=8,
        height in 1u32..=64,
        workers in 1usize..=8,
        rows_per_task in 1u32..=5,
    ) {
        let scheduler = Scheduler::new(rows_per_task).unwrap();
        let mut pool = pool_for(&scheduler, workers);

        let source = Arc::new(RawImage::new(width, height, 3).unwrap());
        let tagger = Arc::new(RowTagger::new(height));
        let pass: Arc<dyn Transform> = tagger.clone();
        let output = completed(scheduler.run_pipeline(source, &[pass], workers).unwrap());
        pool.stop();

        for y in 0..height {
            prop_assert_eq!(tagger.visits[y as usize].load(Ordering::Relaxed), 1, "row {}", y);
            prop_assert!(output.image.row(y).iter().all(|&v| v == RowTagger::tag(y)));
        }
        prop_assert_eq!(output.reports[0].executed, height.div_ceil(rows_per_task) as usize);
    }

    #[test]
    fn partition_is_contiguous_and_disjoint(
        height in 0u32..=500,
        workers in 1usize..=16,
        rows_per_task in 1u32..=32,
    ) {
        let ranges = partition_rows(height, workers, rows_per_task).unwrap();
        let mut next = 0;
        for r in &ranges {
            prop_assert_eq!(r.start, next);
            prop_assert!(!r.is_empty());
            prop_assert!(r.len() <= rows_per_task);
            next = r.end;
        }
        prop_assert_eq!(next, height);
    }

    #[test]
    fn single_pass_matches_sequential(
        image in image_strategy(),
        adjustment in adjustment_strategy(),
        workers in 1usize..=6,
        rows_per_task in 1u32..=4,
    ) {
        let scheduler = Scheduler::new(rows_per_task).unwrap();
        let mut pool = pool_for(&scheduler, workers);

        let transform = TransformKind::BrightnessContrast.into_transform(adjustment);
        let (expected, expected_extrema) =
            apply_sequential(transform.as_ref(), &image, None).unwrap();

        let source = Arc::new(image);
        let output = completed(scheduler.run_pipeline(source, &[transform], workers).unwrap());
        pool.stop();

        prop_assert_eq!(&output.image, &expected);
        prop_assert_eq!(output.reports[0].extrema, expected_extrema);
    }

    #[test]
    fn merged_extrema_equal_a_sequential_scan(
        image in image_strategy(),
        adjustment in adjustment_strategy(),
        workers in 1usize..=6,
    ) {
        let scheduler = Scheduler::new(1).unwrap();
        let mut pool = pool_for(&scheduler, workers);

        let transform = TransformKind::BrightnessContrast.into_transform(adjustment);
        let output = completed(
            scheduler
                .run_pipeline(Arc::new(image), &[transform], workers)
                .unwrap(),
        );
        pool.stop();

        let channels = output.image.channels() as usize;
        let scanned = Extrema::scan(output.image.as_bytes(), channels, channels.min(3));
        prop_assert_eq!(output.reports[0].extrema, scanned);
    }

    #[test]
    fn multi_pass_matches_sequential(
        image in image_strategy(),
        adjustment in adjustment_strategy(),
        workers in 1usize..=6,
        rows_per_task in 1u32..=4,
        with_edge in any::<bool>(),
    ) {
        let scheduler = Scheduler::new(rows_per_task).unwrap();
        let mut pool = pool_for(&scheduler, workers);

        let mut kinds = vec![TransformKind::BrightnessContrast];
        if with_edge {
            kinds.push(TransformKind::Edge);
        }
        kinds.push(TransformKind::Normalize);
        let passes: Vec<Arc<dyn Transform>> =
            kinds.iter().map(|k| k.into_transform(adjustment)).collect();

        let mut expected = image.clone();
        let mut upstream = None;
        for pass in &passes {
            let (next, extrema) = apply_sequential(pass.as_ref(), &expected, upstream).unwrap();
            expected = next;
            upstream = extrema;
        }

        let output = completed(scheduler.run_pipeline(Arc::new(image), &passes, workers).unwrap());
        pool.stop();

        prop_assert_eq!(output.image, expected);
        prop_assert_eq!(output.reports.len(), passes.len());
        prop_assert!(output.reports.iter().all(|r| r.is_clean()));
    }
}

#[test]
fn reference_row_is_identical_for_any_worker_count() {
    let source = Arc::new(
        RawImage::from_raw(4, 1, 3, vec![10, 10, 10, 250, 250, 250, 0, 0, 0, 128, 128, 128])
            .unwrap(),
    );
    let transform = TransformKind::BrightnessContrast.into_transform(Adjustment::default());

    for workers in 1..=8 {
        let scheduler = Scheduler::new(1).unwrap();
        let mut pool = pool_for(&scheduler, workers);
        let output = completed(
            scheduler
                .run_pipeline(Arc::clone(&source), &[Arc::clone(&transform)], workers)
                .unwrap(),
        );
        pool.stop();

        assert_eq!(
            output.image.as_bytes(),
            &[70, 70, 70, 255, 255, 255, 50, 50, 50, 255, 255, 255],
            "workers = {workers}"
        );
        assert_eq!(
            output.reports[0].extrema,
            Some(Extrema {
                min: 50.0,
                max: 255.0
            })
        );
    }
}
