//! Frame sources.
//!
//! A [`CaptureDevice`] is driven from a single delivery thread owned by the
//! pipeline: `next_frame` blocks until the device has a new buffer.

use std::time::{Duration, Instant};

use crate::error::CaptureError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
	NotDetermined,
	Authorized,
	Denied,
	Restricted,
}

/// One delivered buffer.
pub struct Frame {
	pub image: ie::OwnedImage,
	/// Rotation needed to show the buffer upright.
	pub orientation: ie::Orientation,
	pub timestamp: Instant,
}

impl Frame {
	pub fn new(image: ie::OwnedImage, orientation: ie::Orientation) -> Self {
		Self {
			image,
			orientation,
			timestamp: Instant::now(),
		}
	}
}

pub trait CaptureDevice: Send {
	fn authorization(&self) -> Authorization;

	/// Ask for access. Blocks until answered; `true` when granted.
	fn request_access(&mut self) -> bool;

	/// Find the device and wire it up. Called once per `start()`.
	fn open(&mut self) -> Result<(), CaptureError>;

	/// Block until the next buffer is available.
	fn next_frame(&mut self) -> Result<Frame, CaptureError>;

	fn close(&mut self);
}

/// Stand-in when no capture backend is compiled in. Always ends in sample mode.
#[derive(Debug, Default)]
pub struct NoDevice;

impl CaptureDevice for NoDevice {
	fn authorization(&self) -> Authorization {
		Authorization::Authorized
	}

	fn request_access(&mut self) -> bool {
		true
	}

	fn open(&mut self) -> Result<(), CaptureError> {
		Err(CaptureError::DeviceUnavailable("no capture backend".into()))
	}

	fn next_frame(&mut self) -> Result<Frame, CaptureError> {
		Err(CaptureError::DeviceUnavailable("no capture backend".into()))
	}

	fn close(&mut self) {}
}

pub const DEFAULT_FPS: f32 = 15.0;

/// Delay between grabs at `fps`. Rates are clamped to 0.5..=60; NaN and infinities use the default.
pub fn frame_interval(fps: f32) -> Duration {
	let fps = if fps.is_finite() {
		fps.clamp(0.5, 60.0)
	} else {
		tracing::warn!(fps, "invalid capture rate; using default");
		DEFAULT_FPS
	};
	Duration::from_secs_f32(1.0 / fps)
}

#[cfg(feature = "screen-capture")]
pub use screen::ScreenCapture;

#[cfg(feature = "screen-capture")]
mod screen {
	use std::time::{Duration, Instant};

	use super::{Authorization, CaptureDevice, Frame, frame_interval};
	use crate::error::CaptureError;

	enum Source {
		Window(xcap::Window),
		Monitor(xcap::Monitor),
	}

	/// Captures a window (by app name) or the first monitor at a fixed rate.
	pub struct ScreenCapture {
		app_name: Option<String>,
		interval: Duration,
		next_due: Instant,
		source: Option<Source>,
	}

	impl ScreenCapture {
		pub fn new(app_name: Option<String>, fps: f32) -> Self {
			Self {
				app_name,
				interval: frame_interval(fps),
				next_due: Instant::now(),
				source: None,
			}
		}
	}

	fn find_window(app_name: &str) -> Option<xcap::Window> {
		let windows = xcap::Window::all().ok()?;
		windows
			.into_iter()
			.find(|window| window.app_name().ok().as_deref() == Some(app_name))
	}

	impl CaptureDevice for ScreenCapture {
		fn authorization(&self) -> Authorization {
			// The OS prompts on first capture; there is nothing to query up front.
			Authorization::Authorized
		}

		fn request_access(&mut self) -> bool {
			true
		}

		fn open(&mut self) -> Result<(), CaptureError> {
			let source = match &self.app_name {
				Some(name) => find_window(name)
					.map(Source::Window)
					.ok_or_else(|| CaptureError::DeviceUnavailable(format!("no window named {name:?}")))?,
				None => xcap::Monitor::all()
					.map_err(|e| CaptureError::SessionConfiguration(e.to_string()))?
					.into_iter()
					.next()
					.map(Source::Monitor)
					.ok_or_else(|| CaptureError::DeviceUnavailable("no monitor".into()))?,
			};
			self.source = Some(source);
			self.next_due = Instant::now();
			tracing::info!(app_name = ?self.app_name, "screen capture opened");
			Ok(())
		}

		fn next_frame(&mut self) -> Result<Frame, CaptureError> {
			let now = Instant::now();
			if self.next_due > now {
				std::thread::sleep(self.next_due - now);
			}
			self.next_due = Instant::now() + self.interval;

			let img = match &self.source {
				Some(Source::Window(w)) => w.capture_image(),
				Some(Source::Monitor(m)) => m.capture_image(),
				None => return Err(CaptureError::DeviceUnavailable("capture not opened".into())),
			}
			.map_err(|e| CaptureError::Frame(e.to_string()))?;

			let image = ie::OwnedImage::from_rgba(img.width() as usize, img.as_raw());
			Ok(Frame::new(image, ie::Orientation::Up))
		}

		fn close(&mut self) {
			self.source = None;
		}
	}
}
