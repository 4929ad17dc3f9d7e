/// Failures of the capture side.
///
/// Everything except `Frame` ends live capture; the pipeline answers all of them
/// the same way, by switching to the demo frame with an explanatory status.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
	#[error("capture permission denied")]
	PermissionDenied,

	#[error("no capture device available: {0}")]
	DeviceUnavailable(String),

	#[error("capture session could not be configured: {0}")]
	SessionConfiguration(String),

	/// A single frame could not be grabbed. Delivery continues with the next one.
	#[error("frame capture failed: {0}")]
	Frame(String),
}

impl CaptureError {
	/// Status line shown while the demo frame stands in for live capture.
	pub fn fallback_reason(&self) -> &'static str {
		match self {
			Self::PermissionDenied => "Sample mode: no capture permission",
			Self::DeviceUnavailable(_) => "Sample mode: no capture device",
			Self::SessionConfiguration(_) => "Sample mode: capture setup failed",
			Self::Frame(_) => "Sample mode: capture interrupted",
		}
	}
}
