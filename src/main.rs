//! ips - render a PNG through the tiled brightness/contrast pipeline
//!
//! Stands in for the viewer's frame loop: every frame re-runs the configured
//! passes over the source on the worker pool and hands the result to a sink.

use anyhow::{Context, Result};
use clap::Parser;
use ips::engine::{FrameSink, NullSink, PngFileSink};
use ips::{Adjustment, EngineConfig, FrameDriver, TransformKind};
use std::path::PathBuf;
use std::time::Instant;
use tracing::warn;

#[derive(Parser)]
#[command(name = "ips")]
#[command(author, version, about = "Parallel brightness/contrast image processing")]
#[command(long_about = "
Runs a PNG through a multi-pass pixel pipeline on a pool of worker threads.

Examples:
  ips photo.png -o out.png                      # contrast 2, brightness 50
  ips photo.png -o out.png -b -20 -c 1.5
  ips photo.png -o out.png --pass brightness-contrast --pass normalize
  ips photo.png --pass edge --pass normalize --frames 960 -j 8 -v
")]
struct Cli {
    /// Input PNG
    input: PathBuf,

    /// Write the last frame here as PNG
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Brightness offset (-100 to 100)
    #[arg(short, long, default_value_t = 50.0, allow_hyphen_values = true)]
    brightness: f32,

    /// Contrast gain (0.1 to 5.0)
    #[arg(short, long, default_value_t = 2.0)]
    contrast: f32,

    /// Pass to run, in order (brightness-contrast, normalize, edge). Repeatable.
    #[arg(short, long = "pass", value_name = "PASS")]
    passes: Vec<TransformKind>,

    /// Number of worker threads (0 = IPS_WORKER_COUNT or all cores)
    #[arg(short = 'j', long, default_value_t = 0)]
    workers: usize,

    /// Rows per task (0 = IPS_ROWS_PER_TASK or 1)
    #[arg(long, default_value_t = 0)]
    rows_per_task: u32,

    /// Number of frames to render
    #[arg(short, long, default_value_t = 1)]
    frames: u64,

    /// Bounce brightness and contrast across their ranges from frame to frame
    #[arg(long)]
    animate: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over -v when set.
    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    let mut config = EngineConfig::from_env();
    if cli.workers > 0 {
        config = config.with_worker_count(cli.workers);
    }
    if cli.rows_per_task > 0 {
        config = config.with_rows_per_task(cli.rows_per_task);
    }

    let mut driver = FrameDriver::new(config).context("Failed to start worker pool")?;
    driver
        .load_path(&cli.input)
        .with_context(|| format!("Failed to load {}", cli.input.display()))?;
    driver
        .set_adjustment(Adjustment::new(cli.brightness, cli.contrast))
        .context("Invalid adjustment")?;
    if !cli.passes.is_empty() {
        driver.set_passes(cli.passes.clone());
    }
    driver.set_animated(cli.animate);

    let mut sink: Box<dyn FrameSink> = match &cli.output {
        Some(path) => Box::new(PngFileSink::new(path)),
        None => Box::new(NullSink::default()),
    };

    let started = Instant::now();
    let mut rendered = 0u64;
    let mut failed_tiles = 0usize;
    for frame in 0..cli.frames {
        match driver.render_frame(sink.as_mut()) {
            Ok(Some(report)) => {
                rendered += 1;
                failed_tiles += report.failed_tiles();
            }
            Ok(None) => {}
            Err(e) if e.is_recoverable() => {
                warn!(frame, category = e.category().as_str(), "frame dropped: {e}");
            }
            Err(e) => return Err(e).with_context(|| format!("Frame {frame} failed")),
        }
    }
    driver.shutdown();

    let elapsed = started.elapsed().as_secs_f64();
    let (width, height, channels) = driver
        .source()
        .map(|img| img.layout())
        .unwrap_or_default();
    println!(
        "{}: {width} X {height} x{channels}, {rendered} frame(s) in {:.3}s ({:.2} FPS), {} worker(s)",
        cli.input.display(),
        elapsed,
        if elapsed > 0.0 { rendered as f64 / elapsed } else { 0.0 },
        driver.config().worker_count,
    );
    if failed_tiles > 0 {
        println!("{failed_tiles} tile(s) failed and kept their previous contents");
    }
    if let Some(path) = &cli.output {
        println!("Wrote {}", path.display());
    }
    Ok(())
}
