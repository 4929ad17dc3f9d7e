//! Region contrast estimation for detected text.
//!
//! A text box is split into two samples: an inset "foreground" rectangle that
//! should mostly cover glyph strokes, and an expanded "background" rectangle
//! that mostly covers whatever the text sits on. Both are area-averaged and
//! compared with the WCAG formula.

use crate::color::{PASS_THRESHOLD, contrast_ratio};
use crate::geometry::{NormalizedRect, Rect};
use crate::{Image, Sample};

/// Tunable sampling geometry. Ratios are fractions of the box size per side.
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct ContrastSettings {
    pub fg_inset_x: f64,
    pub fg_inset_y: f64,
    /// Lower bound for the foreground inset, in pixels.
    pub fg_min_inset: f64,
    pub bg_outset_x: f64,
    pub bg_outset_y: f64,
    /// Lower bound for the background outset, in pixels.
    pub bg_min_outset: f64,
}

impl Default for ContrastSettings {
    fn default() -> Self {
        Self {
            fg_inset_x: 0.22,
            fg_inset_y: 0.25,
            fg_min_inset: 1.0,
            bg_outset_x: 0.26,
            bg_outset_y: 0.38,
            bg_min_outset: 4.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContrastEstimate {
    pub ratio: f64,
    pub foreground: Sample,
    pub background: Sample,
}

/// Area-average of the part of `rect` (raster pixels) that overlaps `image`.
///
/// Fractional edges are widened to whole pixels. `None` when nothing overlaps.
pub fn average_color(image: Image, rect: Rect) -> Option<Sample> {
    let extent = Rect::new(0.0, 0.0, image.width() as f64, image.height() as f64);
    let safe = rect.intersection(&extent)?;

    let x1 = safe.x.floor() as u32;
    let y1 = safe.y.floor() as u32;
    let x2 = (safe.max_x().ceil() as u32).min(image.width());
    let y2 = (safe.max_y().ceil() as u32).min(image.height());
    if x2 <= x1 || y2 <= y1 {
        return None;
    }

    image.sub_image(x1, y1, x2 - x1, y2 - y1).average_sample()
}

/// Estimate the contrast of the text inside `bbox`.
///
/// `None` for degenerate boxes and for boxes whose samples cannot be taken
/// (e.g. entirely outside the image); callers skip those detections.
pub fn estimate_contrast(
    bbox: NormalizedRect,
    image: Image,
    settings: &ContrastSettings,
) -> Option<ContrastEstimate> {
    if !bbox.is_valid() {
        return None;
    }

    let rect = bbox.to_pixel_rect(image.width(), image.height());
    if rect.is_empty() {
        return None;
    }

    let fg_rect = rect.inset(
        (rect.width * settings.fg_inset_x).max(settings.fg_min_inset),
        (rect.height * settings.fg_inset_y).max(settings.fg_min_inset),
    )?;
    let bg_rect = rect.inset(
        -(rect.width * settings.bg_outset_x).max(settings.bg_min_outset),
        -(rect.height * settings.bg_outset_y).max(settings.bg_min_outset),
    )?;

    let foreground = average_color(image, fg_rect)?;
    let background = average_color(image, bg_rect)?;

    Some(ContrastEstimate {
        ratio: contrast_ratio(foreground, background),
        foreground,
        background,
    })
}

/// One piece of recognized text with its measured contrast.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Finding {
    text: String,
    bbox: NormalizedRect,
    ratio: f64,
    foreground_hex: String,
    background_hex: String,
}

impl Finding {
    /// `None` for empty text.
    pub fn new(text: impl Into<String>, bbox: NormalizedRect, estimate: &ContrastEstimate) -> Option<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return None;
        }
        Some(Self {
            text,
            bbox,
            ratio: estimate.ratio.max(1.0),
            foreground_hex: estimate.foreground.hex(),
            background_hex: estimate.background.hex(),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn bbox(&self) -> NormalizedRect {
        self.bbox
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Derived from the ratio on every call.
    pub fn pass(&self) -> bool {
        self.ratio >= PASS_THRESHOLD
    }

    pub fn foreground_hex(&self) -> &str {
        &self.foreground_hex
    }

    pub fn background_hex(&self) -> &str {
        &self.background_hex
    }
}

/// Worst (lowest ratio) first.
pub fn sort_findings(findings: &mut [Finding]) {
    findings.sort_by(|a, b| a.ratio.total_cmp(&b.ratio));
}
