//! Persistent application configuration.
//!
//! Stored as JSON in a platform-appropriate config directory. Missing fields
//! take their defaults, so older files keep loading.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::pipeline::PipelineSettings;

/// On-disk configuration for the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Simulation applied to every frame.
    pub mode: ie::VisionMode,

    /// Run OCR + contrast analysis at all.
    pub analyze_text: bool,

    /// Analyze every N-th live frame.
    pub ocr_frame_interval: u64,

    /// Findings kept per pass.
    pub max_findings: usize,

    /// Text shorter than this fraction of the frame height is ignored.
    pub min_text_height: f64,

    /// Side of the square averaged on a tap, in image pixels.
    pub tap_sample_size: f64,

    /// Overlays with an edge at or below this many view units are not drawn.
    pub min_overlay_edge: f64,

    pub contrast: ie::ContrastSettings,

    /// OCR runs on a copy downscaled to this height (contrast still uses the full frame).
    pub max_analysis_height: Option<u32>,

    /// Image shown in sample mode instead of the generated demo frame.
    pub sample_image: Option<PathBuf>,

    /// Capture this application's window (from `xcap::Window::app_name()`).
    /// The first monitor when unset.
    pub app_name: Option<String>,

    pub capture_fps: f32,

    /// OCR model files, relative to the working directory or the executable.
    pub detection_model: PathBuf,
    pub recognition_model: PathBuf,
    pub charset: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: ie::VisionMode::default(),
            analyze_text: true,
            ocr_frame_interval: 10,
            max_findings: 12,
            min_text_height: 0.03,
            tap_sample_size: 12.0,
            min_overlay_edge: 10.0,
            contrast: ie::ContrastSettings::default(),
            max_analysis_height: Some(720),
            sample_image: None,
            app_name: None,
            capture_fps: crate::capture::DEFAULT_FPS,
            detection_model: PathBuf::from("ocr/detection.mnn"),
            recognition_model: PathBuf::from("ocr/latin_recognition.mnn"),
            charset: PathBuf::from("ocr/latin_charset.txt"),
        }
    }
}

impl Config {
    /// Path to the config file.
    pub fn path() -> Result<PathBuf> {
        let base = dirs::config_dir().context("config_dir() unavailable")?;
        Ok(base.join("unseen.json"))
    }

    /// Load configuration from disk, falling back to defaults on any error.
    pub fn load_or_default() -> Self {
        match Self::try_load() {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!(error = %err, "failed to load config; using defaults");
                Self::default()
            }
        }
    }

    /// Try to load configuration from disk. A missing file is not an error.
    pub fn try_load() -> Result<Self> {
        let path = Self::path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = fs::read_to_string(&path).with_context(|| format!("read {:?}", path))?;
        Self::from_json(&json).with_context(|| format!("parse {:?}", path))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Save configuration to disk.
    pub fn save(&self) -> Result<()> {
        let path = Self::path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(self).context("serialize config")?;
        fs::write(&path, json).with_context(|| format!("write {:?}", path))?;
        Ok(())
    }

    pub fn detector_options(&self) -> ie::DetectorOptions {
        ie::DetectorOptions {
            min_text_height: self.min_text_height,
            max_results: self.max_findings,
            ..Default::default()
        }
    }

    /// Pipeline knobs. An unreadable sample image falls back to the demo frame.
    pub fn pipeline_settings(&self) -> PipelineSettings {
        let sample_image = self.sample_image.as_ref().and_then(|path| match ie::OwnedImage::open(path) {
            Ok(image) => Some(Arc::new(image)),
            Err(err) => {
                tracing::warn!(error = %err, path = ?path, "failed to load sample image; using demo frame");
                None
            }
        });

        PipelineSettings {
            mode: self.mode,
            analyze_text: self.analyze_text,
            ocr_frame_interval: self.ocr_frame_interval,
            tap_sample_size: self.tap_sample_size,
            min_overlay_edge: self.min_overlay_edge,
            sample_image,
        }
    }
}
