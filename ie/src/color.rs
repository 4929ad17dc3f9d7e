//! Color samples and WCAG contrast math.

use crate::Color;

/// WCAG AA threshold for normal-size text.
pub const PASS_THRESHOLD: f64 = 4.5;

/// A color as three channel intensities in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Sample {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Sample {
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0);
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0);

    #[inline]
    pub const fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    /// Each channel clamped to `[0, 255]` and rounded.
    pub fn to_rgb8(self) -> Color {
        Color::new(channel_u8(self.r), channel_u8(self.g), channel_u8(self.b))
    }

    /// `#RRGGBB`, upper case.
    pub fn hex(self) -> String {
        let c = self.to_rgb8();
        format!("#{:02X}{:02X}{:02X}", c.r, c.g, c.b)
    }

    /// `r, g, b` in 8-bit units.
    pub fn rgb_string(self) -> String {
        let c = self.to_rgb8();
        format!("{}, {}, {}", c.r, c.g, c.b)
    }

    /// Parse `#RRGGBB` (the leading `#` is optional).
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
        Some(Color::new(channel(0)?, channel(2)?, channel(4)?).to_sample())
    }

    /// WCAG 2.x relative luminance.
    pub fn relative_luminance(self) -> f64 {
        0.2126 * linearize(self.r) + 0.7152 * linearize(self.g) + 0.0722 * linearize(self.b)
    }
}

#[inline]
fn channel_u8(v: f64) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

#[inline]
fn linearize(v: f64) -> f64 {
    if v <= 0.03928 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

/// WCAG contrast ratio in `[1, 21]`. Symmetric in its arguments.
pub fn contrast_ratio(a: Sample, b: Sample) -> f64 {
    let l1 = a.relative_luminance();
    let l2 = b.relative_luminance();
    (l1.max(l2) + 0.05) / (l1.min(l2) + 0.05)
}
