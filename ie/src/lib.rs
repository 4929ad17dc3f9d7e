//! Image engine: color-vision simulation, text detection and WCAG contrast
//! estimation over captured frames.

mod image;
pub use image::*;
pub mod color;
pub use color::{PASS_THRESHOLD, Sample, contrast_ratio};
pub mod contrast;
pub use contrast::{ContrastEstimate, ContrastSettings, Finding};
pub mod demo;
pub mod geometry;
pub use geometry::{NormalizedRect, Point, Rect, Size};
pub mod ocr;
pub use ocr::{DetectorOptions, TextDetector, TextObservation};
mod vision;
pub use vision::VisionMode;

use anyhow::Context;

/// One text-analysis pass: detect text, then measure contrast for every hit.
pub struct Ie {
    detector: Box<dyn TextDetector>,
    contrast: ContrastSettings,
    max_findings: usize,
    max_analysis_height: Option<u32>,
}

impl Ie {
    pub fn new(detector: Box<dyn TextDetector>, contrast: ContrastSettings) -> Self {
        Self {
            detector,
            contrast,
            max_findings: DetectorOptions::default().max_results,
            max_analysis_height: None,
        }
    }

    pub fn with_max_findings(mut self, max_findings: usize) -> Self {
        self.max_findings = max_findings;
        self
    }

    /// Run OCR on a downscaled copy when the frame is taller than `height`.
    pub fn with_max_analysis_height(mut self, height: Option<u32>) -> Self {
        self.max_analysis_height = height;
        self
    }

    /// Findings for `image`, worst contrast first.
    ///
    /// Boxes are normalized, so detection may run on a smaller copy while
    /// contrast is always sampled from the full-resolution frame.
    pub fn analyze(&self, image: &OwnedImage) -> anyhow::Result<Vec<Finding>> {
        let observations = match self.max_analysis_height {
            Some(max_h) if image.height() > max_h => {
                let small = image
                    .clone()
                    .downscaled_to(max_h)
                    .context("downscale frame for OCR")?;
                self.detector.detect(small.as_image())?
            }
            _ => self.detector.detect(image.as_image())?,
        };

        let mut findings: Vec<Finding> = observations
            .into_iter()
            .take(self.max_findings)
            .filter_map(|obs| {
                let estimate = contrast::estimate_contrast(obs.bbox, image.as_image(), &self.contrast)?;
                Finding::new(obs.text, obs.bbox, &estimate)
            })
            .collect();

        contrast::sort_findings(&mut findings);
        tracing::debug!(count = findings.len(), "text analysis finished");
        Ok(findings)
    }
}
