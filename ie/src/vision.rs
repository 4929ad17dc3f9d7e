//! Color-vision-deficiency simulation.
//!
//! Each mode is a fixed 3×3 linear RGB matrix. These are approximations, not
//! physiologically exact cone-space transforms.

use std::sync::Arc;

use crate::{Color, OwnedImage, Sample};

type Matrix = [[f64; 3]; 3];

const IDENTITY: Matrix = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

const PROTANOPIA: Matrix = [
    [0.56667, 0.43333, 0.0],
    [0.55833, 0.44167, 0.0],
    [0.0, 0.24167, 0.75833],
];

const DEUTERANOPIA: Matrix = [[0.625, 0.375, 0.0], [0.70, 0.30, 0.0], [0.0, 0.30, 0.70]];

const TRITANOPIA: Matrix = [
    [0.95, 0.05, 0.0],
    [0.0, 0.43333, 0.56667],
    [0.0, 0.475, 0.525],
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
pub enum VisionMode {
    Normal,
    #[default]
    Deuteranopia,
    Protanopia,
    Tritanopia,
}

impl VisionMode {
    pub const ALL: [Self; 4] = [
        Self::Normal,
        Self::Deuteranopia,
        Self::Protanopia,
        Self::Tritanopia,
    ];

    pub const fn matrix(self) -> &'static Matrix {
        match self {
            Self::Normal => &IDENTITY,
            Self::Protanopia => &PROTANOPIA,
            Self::Deuteranopia => &DEUTERANOPIA,
            Self::Tritanopia => &TRITANOPIA,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Deuteranopia => "Deuteranopia",
            Self::Protanopia => "Protanopia",
            Self::Tritanopia => "Tritanopia",
        }
    }

    pub const fn short_label(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Deuteranopia => "Red-Green",
            Self::Protanopia => "Red-Weak",
            Self::Tritanopia => "Blue-Weak",
        }
    }

    /// Apply the mode to a single color, clamping each channel to `[0, 1]`.
    pub fn transform_color(self, color: Sample) -> Sample {
        if self == Self::Normal {
            return color;
        }
        let [r, g, b] = apply(self.matrix(), [color.r, color.g, color.b]);
        Sample::new(r.clamp(0.0, 1.0), g.clamp(0.0, 1.0), b.clamp(0.0, 1.0))
    }

    /// Apply the mode to every pixel.
    ///
    /// `Normal` hands back the very same buffer; nothing is copied or multiplied.
    pub fn simulate(self, image: Arc<OwnedImage>) -> Arc<OwnedImage> {
        if self == Self::Normal {
            return image;
        }

        let m = self.matrix();
        let mut out = (*image).clone();
        out.map_pixels(|px| {
            let [r, g, b] = apply(m, [px.r as f64, px.g as f64, px.b as f64]);
            *px = Color::new(to_u8(r), to_u8(g), to_u8(b));
        });
        Arc::new(out)
    }
}

impl std::fmt::Display for VisionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for VisionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s) || m.short_label().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown vision mode: {s}"))
    }
}

#[inline]
fn apply(m: &Matrix, v: [f64; 3]) -> [f64; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

#[inline]
fn to_u8(v: f64) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}
