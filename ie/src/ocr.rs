//! Text detection.
//!
//! The pipeline only needs "which strings are where": a ranked list of
//! recognized strings with normalized, bottom-left-origin boxes. Backends plug in
//! behind [`TextDetector`]; the PaddleOCR one (`ocr-rs`) is behind the
//! `paddle-ocr` feature because it links the MNN runtime.

use crate::NormalizedRect;

/// A recognized string and where it was found.
#[derive(Debug, Clone, PartialEq)]
pub struct TextObservation {
    pub text: String,
    pub bbox: NormalizedRect,
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct DetectorOptions {
    /// Prefer speed over accuracy; no language correction.
    pub fast: bool,
    /// Observations shorter than this fraction of the image height are dropped.
    pub min_text_height: f64,
    pub max_results: usize,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            fast: true,
            min_text_height: 0.03,
            max_results: 12,
        }
    }
}

pub trait TextDetector: Send + Sync {
    /// Ranked observations, best first.
    fn detect(&self, image: crate::Image) -> anyhow::Result<Vec<TextObservation>>;
}

/// Detector used when no OCR backend is available. Never finds anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDetector;

impl TextDetector for NullDetector {
    fn detect(&self, _image: crate::Image) -> anyhow::Result<Vec<TextObservation>> {
        Ok(Vec::new())
    }
}

/// Shared post-processing: height filter, confidence ranking, result cap.
pub fn rank_observations(mut observations: Vec<TextObservation>, options: &DetectorOptions) -> Vec<TextObservation> {
    observations.retain(|o| o.bbox.is_valid() && o.bbox.height >= options.min_text_height);
    observations.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    observations.truncate(options.max_results);
    observations
}

#[cfg(feature = "paddle-ocr")]
pub use paddle::PaddleDetector;

#[cfg(feature = "paddle-ocr")]
mod paddle {
    use std::path::Path;

    use anyhow::Context;

    use super::{DetectorOptions, TextDetector, TextObservation, rank_observations};
    use crate::NormalizedRect;
    use crate::geometry::Rect;

    pub struct PaddleDetector {
        engine: ocr_rs::OcrEngine,
        options: DetectorOptions,
    }

    impl PaddleDetector {
        /// Initialize the OCR engine with the given model paths.
        pub fn try_new(
            detection: impl AsRef<Path>,
            recognition: impl AsRef<Path>,
            charsset: impl AsRef<Path>,
            options: DetectorOptions,
        ) -> anyhow::Result<Self> {
            let thread_count = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1);

            // Fast mode keeps the engine on fewer threads so capture stays smooth.
            let thread_count = if options.fast { thread_count.min(2) } else { thread_count };

            let engine = ocr_rs::OcrEngine::new(
                detection,
                recognition,
                charsset,
                Some(ocr_rs::OcrEngineConfig {
                    backend: ocr_rs::Backend::CPU,
                    thread_count,
                    enable_parallel: thread_count > 1,
                    min_result_confidence: 0.5,
                    ..Default::default()
                }),
            )
            .context("failed to initialize OCR engine")?;

            Ok(Self { engine, options })
        }
    }

    impl TextDetector for PaddleDetector {
        fn detect(&self, image: crate::Image) -> anyhow::Result<Vec<TextObservation>> {
            let (width, height) = (image.width(), image.height());
            let input = ocr_rs::preprocess::rgb_to_image(&image.get_bytes(), width, height);

            let results = self
                .engine
                .recognize(&input)
                .map_err(|e| anyhow::anyhow!("{e}"))
                .context("OCR recognize")?;

            let observations = results
                .into_iter()
                .map(|v| {
                    let rect = v.bbox.rect;
                    let pixel = Rect::new(
                        rect.left() as f64,
                        rect.top() as f64,
                        rect.width() as f64,
                        rect.height() as f64,
                    );
                    TextObservation {
                        text: v.text,
                        bbox: NormalizedRect::from_pixel_rect(pixel, width, height),
                        confidence: v.confidence,
                    }
                })
                .collect();

            Ok(rank_observations(observations, &self.options))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(text: &str, height: f64, confidence: f32) -> TextObservation {
        TextObservation {
            text: text.to_string(),
            bbox: NormalizedRect::new(0.1, 0.1, 0.3, height),
            confidence,
        }
    }

    #[test]
    fn ranking_filters_sorts_and_caps() {
        let options = DetectorOptions {
            max_results: 2,
            ..Default::default()
        };
        let ranked = rank_observations(
            vec![
                obs("tiny", 0.01, 0.99),
                obs("low", 0.1, 0.6),
                obs("high", 0.1, 0.95),
                obs("mid", 0.1, 0.8),
            ],
            &options,
        );
        let texts: Vec<&str> = ranked.iter().map(|o| o.text.as_str()).collect();
        assert_eq!(texts, vec!["high", "mid"]);
    }

    #[test]
    fn null_detector_finds_nothing() {
        let img = crate::OwnedImage::filled(8, 8, crate::Color::WHITE);
        assert!(NullDetector.detect(img.as_image()).unwrap().is_empty());
    }

    #[test]
    fn options_fill_missing_fields_from_defaults() {
        let options: DetectorOptions = serde_json::from_str(r#"{ "max_results": 3 }"#).unwrap();
        assert_eq!(options.max_results, 3);
        assert!(options.fast);
        assert_eq!(options.min_text_height, 0.03);
    }
}
