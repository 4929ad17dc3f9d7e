//! Unseen command-line host.
//!
//! Runs the pipeline for a while, logging status and findings as they are
//! published. Without a capture backend (or with `--sample`) it works on the
//! sample frame.

use std::path::PathBuf;
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;

use unseen::capture::CaptureDevice;
use unseen::inspect::LogAlert;
use unseen::{Config, Event, Pipeline};

#[derive(Debug, Parser)]
#[command(name = "unseen", about = "Preview a screen as seen with color vision deficiencies")]
struct Args {
    /// Normal, Deuteranopia, Protanopia or Tritanopia.
    #[arg(long)]
    mode: Option<ie::VisionMode>,

    /// Stop after this many seconds.
    #[arg(long, default_value_t = 10)]
    seconds: u64,

    /// Skip live capture and analyze the sample frame.
    #[arg(long)]
    sample: bool,

    /// Image to use as the sample frame.
    #[arg(long)]
    sample_image: Option<PathBuf>,

    /// Capture this application's window instead of the first monitor.
    #[arg(long)]
    app_name: Option<String>,

    /// Disable text contrast analysis.
    #[arg(long)]
    no_text: bool,

    /// Write the last published frame here as PNG.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Persist the effective configuration.
    #[arg(long)]
    save_config: bool,
}

fn main() -> Result<()> {
    // Structured logging. Use `RUST_LOG=info` etc.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut cfg = Config::load_or_default();
    if let Some(mode) = args.mode {
        cfg.mode = mode;
    }
    if args.sample_image.is_some() {
        cfg.sample_image = args.sample_image.clone();
    }
    if args.app_name.is_some() {
        cfg.app_name = args.app_name.clone();
    }
    if args.no_text {
        cfg.analyze_text = false;
    }
    if args.save_config {
        cfg.save()?;
    }

    let ie = ie::Ie::new(build_detector(&cfg), cfg.contrast)
        .with_max_findings(cfg.max_findings)
        .with_max_analysis_height(cfg.max_analysis_height);

    let pipeline = Pipeline::new(cfg.pipeline_settings(), build_device(&cfg), ie, Some(Box::new(LogAlert)))?;
    let events = pipeline.subscribe();

    if args.sample {
        pipeline.activate_fallback("Sample mode");
    } else {
        pipeline.start();
    }

    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match events.recv_timeout(remaining) {
            Ok(Event::Status(status)) => {
                tracing::info!(state = ?status.state, mode = %status.mode, "{}", status.message);
            }
            Ok(Event::Findings(findings)) => {
                for f in findings.iter() {
                    tracing::info!(
                        text = f.text(),
                        ratio = %format!("{:.2}", f.ratio()),
                        pass = f.pass(),
                        fg = f.foreground_hex(),
                        bg = f.background_hex(),
                        "finding"
                    );
                }
            }
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout) => break,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    pipeline.stop();

    if let Some(path) = &args.output {
        match pipeline.snapshot().frame {
            Some(frame) => {
                frame.image.as_image().save_png(path)?;
                tracing::info!(path = ?path, "frame written");
            }
            None => tracing::warn!("no frame was published"),
        }
    }

    Ok(())
}

#[cfg(feature = "screen-capture")]
fn build_device(cfg: &Config) -> Box<dyn CaptureDevice> {
    Box::new(unseen::capture::ScreenCapture::new(cfg.app_name.clone(), cfg.capture_fps))
}

#[cfg(not(feature = "screen-capture"))]
fn build_device(_cfg: &Config) -> Box<dyn CaptureDevice> {
    Box::new(unseen::capture::NoDevice)
}

#[cfg(feature = "paddle-ocr")]
fn build_detector(cfg: &Config) -> Box<dyn ie::TextDetector> {
    let detection = resolve_model_path(&cfg.detection_model);
    let recognition = resolve_model_path(&cfg.recognition_model);
    let charset = resolve_model_path(&cfg.charset);

    match ie::ocr::PaddleDetector::try_new(detection, recognition, charset, cfg.detector_options()) {
        Ok(detector) => Box::new(detector),
        Err(err) => {
            tracing::warn!(error = %err, "failed to load OCR models; text analysis disabled");
            Box::new(ie::ocr::NullDetector)
        }
    }
}

#[cfg(not(feature = "paddle-ocr"))]
fn build_detector(_cfg: &Config) -> Box<dyn ie::TextDetector> {
    tracing::info!("built without an OCR backend; no text will be found");
    Box::new(ie::ocr::NullDetector)
}

#[cfg(feature = "paddle-ocr")]
fn resolve_model_path(rel: &std::path::Path) -> PathBuf {
    if let Ok(cwd) = std::env::current_dir() {
        let p = cwd.join(rel);
        if p.exists() {
            return p;
        }
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let p = dir.join(rel);
            if p.exists() {
                return p;
            }
        }
    }

    rel.to_path_buf()
}
