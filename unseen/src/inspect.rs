//! Tap-to-inspect: what does this color look like under each deficiency, and
//! what could replace it.

use ie::geometry::{self, Point, Rect, Size};
use ie::{Finding, OwnedImage, Sample, VisionMode, contrast};

/// Luminance below which a light text color is suggested in `Normal` mode.
const LIGHT_TEXT_LUMINANCE: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuggestionRole {
	/// Wrong answer, warning, error.
	Warning,
	/// Correct answer, done.
	Success,
	Neutral,
	AccentA,
	AccentB,
	Accent,
	LightText,
	DarkText,
}

impl std::fmt::Display for SuggestionRole {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			Self::Warning => "Wrong / Warning",
			Self::Success => "Correct / Done",
			Self::Neutral => "Secondary",
			Self::AccentA => "Accent A",
			Self::AccentB => "Accent B",
			Self::Accent => "Accent",
			Self::LightText => "Light text for contrast",
			Self::DarkText => "Dark text for contrast",
		})
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
	pub role: SuggestionRole,
	pub hex: &'static str,
}

const fn suggestion(role: SuggestionRole, hex: &'static str) -> Suggestion {
	Suggestion { role, hex }
}

const RED_GREEN_SAFE: [Suggestion; 3] = [
	suggestion(SuggestionRole::Warning, "#D26A00"),
	suggestion(SuggestionRole::Success, "#2F6EE2"),
	suggestion(SuggestionRole::Neutral, "#6C7280"),
];

const BLUE_YELLOW_SAFE: [Suggestion; 3] = [
	suggestion(SuggestionRole::AccentA, "#BD5A4F"),
	suggestion(SuggestionRole::AccentB, "#2A6FB2"),
	suggestion(SuggestionRole::Neutral, "#57606D"),
];

/// Curated replacements for `color` as seen in `mode`.
pub fn suggested_alternatives(color: Sample, mode: VisionMode) -> Vec<Suggestion> {
	match mode {
		VisionMode::Deuteranopia | VisionMode::Protanopia => RED_GREEN_SAFE.to_vec(),
		VisionMode::Tritanopia => BLUE_YELLOW_SAFE.to_vec(),
		VisionMode::Normal if color.relative_luminance() < LIGHT_TEXT_LUMINANCE => vec![
			suggestion(SuggestionRole::LightText, "#F5F7FA"),
			suggestion(SuggestionRole::Accent, "#C44100"),
		],
		VisionMode::Normal => vec![
			suggestion(SuggestionRole::DarkText, "#1A1A1A"),
			suggestion(SuggestionRole::Neutral, "#1D5FA0"),
		],
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct Inspection {
	pub picked_hex: String,
	pub picked_rgb: String,
	/// Every mode, in `VisionMode::ALL` order.
	pub mode_samples: Vec<(VisionMode, String)>,
	pub suggestions: Vec<Suggestion>,
}

/// Side channel for the "you tapped a failing region" cue (haptics, sound, ...).
pub trait AlertSink: Send + Sync {
	fn failing_region_tapped(&self, finding: &Finding);
}

/// Default sink: just logs.
#[derive(Debug, Default)]
pub struct LogAlert;

impl AlertSink for LogAlert {
	fn failing_region_tapped(&self, finding: &Finding) {
		tracing::info!(text = finding.text(), ratio = finding.ratio(), "tapped failing text");
	}
}

/// Everything inspection needs from the pipeline, borrowed for one tap.
pub struct InspectRequest<'a> {
	pub image: &'a OwnedImage,
	pub findings: &'a [Finding],
	pub mode: VisionMode,
	pub sample_size: f64,
	pub alert: Option<&'a dyn AlertSink>,
}

/// Inspect the color under a view-space tap. `None` when the tap misses the image.
pub fn inspect(request: &InspectRequest<'_>, point: Point, view: Size) -> Option<Inspection> {
	let image_size = Size::new(request.image.width() as f64, request.image.height() as f64);
	let image_point = geometry::view_point_to_image_point(point, view, image_size)?;

	if let Some(alert) = request.alert {
		let hit = request.findings.iter().find(|f| {
			!f.pass() && geometry::overlay_rect(f.bbox(), image_size, view).contains(point)
		});
		if let Some(finding) = hit {
			alert.failing_region_tapped(finding);
		}
	}

	let sampled = contrast::average_color(
		request.image.as_image(),
		Rect::square_around(image_point, request.sample_size),
	)?;

	let mode_samples = VisionMode::ALL
		.into_iter()
		.map(|m| (m, m.transform_color(sampled).hex()))
		.collect();

	Some(Inspection {
		picked_hex: sampled.hex(),
		picked_rgb: sampled.rgb_string(),
		mode_samples,
		suggestions: suggested_alternatives(sampled, request.mode),
	})
}
