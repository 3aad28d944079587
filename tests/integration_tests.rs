// tests/integration_tests.rs
//
// End-to-end tests of the public API: decode a PNG from disk, render frames
// through the worker pool and write the result back out.

use ips::engine::{
    decode, write_png, CaptureSink, FrameSink, FrameStats, NullSink, PngFileSink, RawImage,
};
use ips::error::IpsError;
use ips::ops::{Adjustment, TransformKind};
use ips::{EngineConfig, FrameDriver};
use std::path::PathBuf;
use tempfile::TempDir;

// Helper to write a gradient PNG into a temp dir
fn gradient_png(dir: &TempDir, width: u32, height: u32, channels: u8) -> PathBuf {
    let img = RawImage::from_fn(width, height, channels, |x, y, c| {
        if c == 3 {
            200
        } else {
            ((x * 255 / width.max(1) + y + c as u32 * 11) % 256) as u8
        }
    })
    .unwrap();
    let path = dir.path().join(format!("gradient_{width}x{height}x{channels}.png"));
    write_png(&path, &img).unwrap();
    path
}

fn driver(workers: usize) -> FrameDriver {
    FrameDriver::new(
        EngineConfig::default()
            .with_worker_count(workers)
            .with_rows_per_task(3),
    )
    .unwrap()
}

#[test]
fn test_decode_written_png() {
    let dir = TempDir::new().unwrap();
    let path = gradient_png(&dir, 40, 30, 3);
    let img = decode(&path).unwrap();
    assert_eq!(img.layout(), (40, 30, 3));
}

#[test]
fn test_decode_keeps_alpha() {
    let dir = TempDir::new().unwrap();
    let path = gradient_png(&dir, 8, 8, 4);
    let img = decode(&path).unwrap();
    assert_eq!(img.channels(), 4);
    assert!(img.pixel(3, 3)[3] == 200);
}

#[test]
fn test_render_file_to_file() {
    let dir = TempDir::new().unwrap();
    let input = gradient_png(&dir, 64, 48, 3);
    let output = dir.path().join("out.png");

    let mut driver = driver(4);
    driver.load_path(&input).unwrap();
    driver.set_passes(vec![
        TransformKind::BrightnessContrast,
        TransformKind::Normalize,
    ]);
    let mut sink = PngFileSink::new(&output);
    let report = driver.render_frame(&mut sink).unwrap().unwrap();
    driver.shutdown();

    assert_eq!(report.frame, 1);
    assert_eq!(report.passes.len(), 2);
    assert_eq!(report.failed_tiles(), 0);
    assert_eq!(sink.written(), 1);
    assert!(!output.with_extension("png.tmp").exists());

    let rendered = decode(&output).unwrap();
    assert_eq!(rendered.layout(), (64, 48, 3));
    let extrema = report.passes[1].extrema.unwrap();
    assert_eq!(extrema.max, 255.0);
}

#[test]
fn test_driver_matches_sequential_reference() {
    let dir = TempDir::new().unwrap();
    let input = gradient_png(&dir, 33, 17, 4);
    let source = decode(&input).unwrap();

    let mut driver = driver(3);
    driver.load_image(source.clone());
    let mut sink = CaptureSink::default();
    driver.render_frame(&mut sink).unwrap().unwrap();
    driver.shutdown();

    let transform = TransformKind::BrightnessContrast.into_transform(Adjustment::default());
    let (expected, _) = ips::engine::apply_sequential(transform.as_ref(), &source, None).unwrap();
    assert_eq!(sink.take().unwrap(), expected);
}

#[test]
fn test_render_without_image_is_noop() {
    let mut driver = driver(2);
    let mut sink = NullSink::default();
    assert!(driver.render_frame(&mut sink).unwrap().is_none());
    assert_eq!(sink.frames, 0);
    driver.shutdown();
}

#[test]
fn test_render_after_shutdown_fails() {
    let mut driver = driver(2);
    driver.load_image(RawImage::new(4, 4, 3).unwrap());
    driver.shutdown();
    let mut sink = NullSink::default();
    let err = driver.render_frame(&mut sink).unwrap_err();
    assert!(matches!(err, IpsError::InvalidPoolState { .. }));
}

#[test]
fn test_animated_frames_stay_in_range() {
    let mut driver = driver(2);
    driver.load_image(RawImage::from_fn(16, 16, 3, |x, y, _| (x * 16 + y) as u8).unwrap());
    driver.set_adjustment(Adjustment::IDENTITY).unwrap();
    driver.set_animated(true);

    let mut sink = NullSink::default();
    for _ in 0..20 {
        let report = driver.render_frame(&mut sink).unwrap().unwrap();
        assert!(report.adjustment.validate().is_ok());
    }
    assert_eq!(sink.frames, 20);
    assert_eq!(driver.frames(), 20);
    driver.shutdown();
}

#[test]
fn test_sink_errors_propagate() {
    struct Failing;
    impl FrameSink for Failing {
        fn upload_or_update(&mut self, _image: &RawImage) -> Result<(), IpsError> {
            Err(IpsError::encode_failed("png", "sink closed"))
        }
    }

    let mut driver = driver(1);
    driver.load_image(RawImage::new(2, 2, 3).unwrap());
    assert!(matches!(
        driver.render_frame(&mut Failing),
        Err(IpsError::EncodeFailed { .. })
    ));
    driver.shutdown();
}

#[test]
fn test_frame_stats_reports_on_interval() {
    let mut stats = FrameStats::new(4);
    let reports: Vec<_> = (0..12).map(|_| stats.record(640, 480)).collect();
    assert_eq!(reports.iter().filter(|r| r.is_some()).count(), 3);
    assert!(reports[3].is_some());
    assert!(reports[2].is_none());
    assert_eq!(stats.frames(), 12);
}
