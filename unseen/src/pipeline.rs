//! Frame pipeline orchestration.
//!
//! Three execution contexts:
//! 1. the delivery thread pulls frames from the capture device, transforms and
//!    publishes every one, and owns the frame counter;
//! 2. the analysis worker runs OCR + contrast estimation, one pass at a time
//!    (guarded by [`AnalysisSlot`]);
//! 3. observers read published snapshots and never block either of the above.
//!
//! Every capture failure ends in `Fallback`: the demo frame is transformed and
//! published instead, so diagnostics never go blank.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;

use ie::{Finding, OwnedImage, Point, Rect, Size, VisionMode};

use crate::capture::{Authorization, CaptureDevice, Frame};
use crate::error::CaptureError;
use crate::inspect::{self, AlertSink, InspectRequest, Inspection};
use crate::publish::{Event, PublishedFrame, Publisher, Snapshot, Status};
use crate::slot::{AnalysisSlot, SlotPermit};

const STATUS_LIVE: &str = "Live analysis";
const STATUS_SAMPLE: &str = "Sample mode";
const STATUS_FROZEN: &str = "Frame frozen";
const STATUS_STOPPED: &str = "Capture stopped";
const STATUS_ANALYSIS_ERROR: &str = "Text analysis error";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
	Uninitialized,
	RequestingPermission,
	Configuring,
	Running,
	Fallback,
	Stopped,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
	pub mode: VisionMode,
	pub analyze_text: bool,
	/// Analyze every N-th live frame.
	pub ocr_frame_interval: u64,
	/// Side of the square averaged on a tap, in image pixels.
	pub tap_sample_size: f64,
	/// Overlays with an edge at or below this many view units are not drawn.
	pub min_overlay_edge: f64,
	/// Image shown in sample mode. The generated demo frame when `None`.
	pub sample_image: Option<Arc<OwnedImage>>,
}

impl Default for PipelineSettings {
	fn default() -> Self {
		Self {
			mode: VisionMode::default(),
			analyze_text: true,
			ocr_frame_interval: 10,
			tap_sample_size: 12.0,
			min_overlay_edge: 10.0,
			sample_image: None,
		}
	}
}

struct Controls {
	mode: Mutex<VisionMode>,
	analyze_text: AtomicBool,
	frozen: AtomicBool,
	fallback: AtomicBool,
	/// The sample render could not be analyzed because a pass was in flight.
	pending_sample_analysis: AtomicBool,
	/// Serializes "may this frame be shown" checks with the publish itself, so a
	/// late live frame can never land on top of the sample render or a freeze.
	frame_gate: Mutex<()>,
}

impl Controls {
	fn mode(&self) -> VisionMode {
		*self.mode.lock().expect("mode lock poisoned")
	}
}

struct AnalysisJob {
	image: Arc<OwnedImage>,
	mode: VisionMode,
	/// Held for the whole pass; dropping it frees the slot.
	permit: SlotPermit,
}

/// State shared by the pipeline handle, the delivery thread and (weakly) the analysis worker.
struct Shared {
	publisher: Publisher,
	controls: Controls,
	slot: AnalysisSlot,
	analysis_tx: Mutex<Sender<AnalysisJob>>,
	ocr_frame_interval: u64,
	tap_sample_size: f64,
	min_overlay_edge: f64,
	sample: Arc<OwnedImage>,
	alert: Option<Box<dyn AlertSink>>,
}

impl Shared {
	fn set_state(&self, state: PipelineState) {
		self.publisher.update_status(|s| s.state = state);
	}

	fn state(&self) -> PipelineState {
		self.publisher.status().state
	}

	fn live_frames_blocked(&self) -> bool {
		self.controls.frozen.load(Ordering::Acquire) || self.controls.fallback.load(Ordering::Acquire)
	}

	/// Delivery-thread entry point for one live frame.
	fn on_frame(&self, frame: Frame, counter: &mut u64) {
		if self.live_frames_blocked() {
			return;
		}

		let image = Arc::new(frame.image.oriented(frame.orientation));
		let mode = self.controls.mode();
		let simulated = mode.simulate(image);
		{
			let _gate = self.controls.frame_gate.lock().expect("frame_gate lock poisoned");
			if self.live_frames_blocked() {
				return;
			}
			self.publisher.publish_frame(PublishedFrame {
				image: simulated.clone(),
				mode,
			});
		}

		*counter += 1;
		if !self.controls.analyze_text.load(Ordering::Acquire) || *counter % self.ocr_frame_interval != 0 {
			return;
		}
		self.dispatch_analysis(simulated, mode);
	}

	/// Hand a frame to the analysis worker if no pass is in flight. `false` when skipped.
	fn dispatch_analysis(&self, image: Arc<OwnedImage>, mode: VisionMode) -> bool {
		let Some(permit) = self.slot.try_acquire() else {
			tracing::trace!("analysis in flight; frame skipped");
			return false;
		};

		let job = AnalysisJob {
			image,
			mode,
			permit,
		};
		if self.analysis_tx.lock().expect("analysis_tx lock poisoned").send(job).is_err() {
			// Worker gone; the permit inside the returned job is dropped with it.
			tracing::warn!("analysis worker is not running");
			return false;
		}
		true
	}

	/// Transform and publish the sample image once, then analyze it once.
	///
	/// If a pass is in flight, the worker picks the sample up when it is done.
	fn render_sample(&self) {
		let mode = self.controls.mode();
		let simulated = mode.simulate(self.sample.clone());
		{
			let _gate = self.controls.frame_gate.lock().expect("frame_gate lock poisoned");
			self.publisher.publish_frame(PublishedFrame {
				image: simulated.clone(),
				mode,
			});
		}

		if self.controls.analyze_text.load(Ordering::Acquire) {
			self.controls.pending_sample_analysis.store(true, Ordering::Release);
			if self.dispatch_analysis(simulated, mode) {
				self.controls.pending_sample_analysis.store(false, Ordering::Release);
			}
		}
	}

	/// Worker side of a deferred sample analysis.
	fn resume_sample_analysis(&self) {
		if !self.controls.pending_sample_analysis.swap(false, Ordering::AcqRel) {
			return;
		}
		if !self.controls.fallback.load(Ordering::Acquire) || !self.controls.analyze_text.load(Ordering::Acquire) {
			return;
		}
		if let Some(frame) = self.publisher.frame() {
			tracing::debug!("analyzing deferred sample frame");
			self.dispatch_analysis(frame.image.clone(), frame.mode);
		}
	}

	fn is_published(&self, image: &Arc<OwnedImage>) -> bool {
		self.publisher
			.frame()
			.is_some_and(|frame| Arc::ptr_eq(&frame.image, image))
	}

	fn enter_fallback(&self, reason: &str) {
		tracing::info!(reason, "switching to sample mode");
		self.controls.fallback.store(true, Ordering::Release);
		self.publisher.update_status(|s| {
			s.state = PipelineState::Fallback;
			s.fallback_active = true;
			s.message = reason.to_string();
		});
		self.render_sample();
	}

	fn finish_analysis(&self, image: &Arc<OwnedImage>, mode: VisionMode, result: anyhow::Result<Vec<Finding>>) {
		// In sample mode only the sample render on screen may supply findings.
		if self.controls.fallback.load(Ordering::Acquire) && !self.is_published(image) {
			tracing::debug!("stale analysis result dropped");
			return;
		}
		match result {
			Ok(findings) => {
				if !self.controls.analyze_text.load(Ordering::Acquire) {
					return;
				}
				let message = analysis_summary(mode, &findings);
				self.publisher.publish_findings(findings);
				self.publisher.update_status(|s| s.message = message);
			}
			Err(err) => {
				// Previous findings stay up so the overlay does not flicker on a transient error.
				tracing::warn!(error = %err, "text analysis failed");
				self.publisher.update_status(|s| s.message = STATUS_ANALYSIS_ERROR.to_string());
			}
		}
	}
}

fn analysis_summary(mode: VisionMode, findings: &[Finding]) -> String {
	if let Some(worst) = findings.iter().find(|f| !f.pass()) {
		format!("{mode} · FAIL {:.2} found", worst.ratio())
	} else if findings.is_empty() {
		"No text recognized".to_string()
	} else {
		format!("{mode} · all text PASS")
	}
}

fn analysis_worker(shared: Weak<Shared>, ie: ie::Ie, jobs: Receiver<AnalysisJob>) {
	// Ends when the last sender (owned by `Shared`) is dropped.
	while let Ok(AnalysisJob { image, mode, permit }) = jobs.recv() {
		let result = ie.analyze(&image);
		// The slot is free again before the result is visible.
		drop(permit);
		match shared.upgrade() {
			Some(shared) => {
				shared.finish_analysis(&image, mode, result);
				shared.resume_sample_analysis();
			}
			None => {
				tracing::debug!("pipeline torn down; analysis result dropped");
				break;
			}
		}
	}
}

fn delivery_loop(shared: Arc<Shared>, device: Arc<Mutex<Box<dyn CaptureDevice>>>, running: Arc<AtomicBool>) {
	// Only this thread touches the counter.
	let mut counter = 0u64;

	while running.load(Ordering::Acquire) {
		let next = device.lock().expect("device lock poisoned").next_frame();
		if !running.load(Ordering::Acquire) {
			break;
		}
		match next {
			Ok(frame) => shared.on_frame(frame, &mut counter),
			Err(CaptureError::Frame(err)) => {
				tracing::warn!(error = %err, "frame dropped");
			}
			Err(err) => {
				tracing::warn!(error = %err, "capture ended");
				running.store(false, Ordering::Release);
				shared.enter_fallback(err.fallback_reason());
				break;
			}
		}
	}
}

#[derive(Default)]
struct Session {
	delivery: Option<JoinHandle<()>>,
}

pub struct Pipeline {
	shared: Arc<Shared>,
	device: Arc<Mutex<Box<dyn CaptureDevice>>>,
	running: Arc<AtomicBool>,
	session: Mutex<Session>,
}

impl Pipeline {
	pub fn new(
		settings: PipelineSettings,
		device: Box<dyn CaptureDevice>,
		ie: ie::Ie,
		alert: Option<Box<dyn AlertSink>>,
	) -> anyhow::Result<Self> {
		let (analysis_tx, analysis_rx) = mpsc::channel();

		let status = Status {
			mode: settings.mode,
			analyze_text: settings.analyze_text,
			..Default::default()
		};

		let shared = Arc::new(Shared {
			publisher: Publisher::new(status),
			controls: Controls {
				mode: Mutex::new(settings.mode),
				analyze_text: AtomicBool::new(settings.analyze_text),
				frozen: AtomicBool::new(false),
				fallback: AtomicBool::new(false),
				pending_sample_analysis: AtomicBool::new(false),
				frame_gate: Mutex::new(()),
			},
			slot: AnalysisSlot::new(),
			analysis_tx: Mutex::new(analysis_tx),
			ocr_frame_interval: settings.ocr_frame_interval.max(1),
			tap_sample_size: settings.tap_sample_size,
			min_overlay_edge: settings.min_overlay_edge,
			sample: settings
				.sample_image
				.unwrap_or_else(|| Arc::new(ie::demo::demo_frame())),
			alert,
		});

		let weak = Arc::downgrade(&shared);
		std::thread::Builder::new()
			.name("unseen-analysis".into())
			.spawn(move || analysis_worker(weak, ie, analysis_rx))?;

		Ok(Self {
			shared,
			device: Arc::new(Mutex::new(device)),
			running: Arc::new(AtomicBool::new(false)),
			session: Mutex::new(Session::default()),
		})
	}

	/// Begin (or resume) live capture. Any failure on the way lands in sample mode.
	pub fn start(&self) {
		let mut session = self.session.lock().expect("session lock poisoned");

		// Delivery still alive, e.g. after a manual switch to sample mode.
		if let Some(handle) = &session.delivery {
			if !handle.is_finished() {
				self.go_live();
				return;
			}
		}
		if let Some(handle) = session.delivery.take() {
			let _ = handle.join();
		}

		let mut device = self.device.lock().expect("device lock poisoned");

		match device.authorization() {
			Authorization::Authorized => {}
			Authorization::NotDetermined => {
				self.shared.set_state(PipelineState::RequestingPermission);
				if !device.request_access() {
					drop(device);
					self.permission_denied();
					return;
				}
			}
			Authorization::Denied | Authorization::Restricted => {
				drop(device);
				self.permission_denied();
				return;
			}
		}

		self.shared.set_state(PipelineState::Configuring);
		if let Err(err) = device.open() {
			tracing::warn!(error = %err, "capture configuration failed");
			drop(device);
			self.shared.enter_fallback(err.fallback_reason());
			return;
		}
		drop(device);

		self.running.store(true, Ordering::Release);
		let shared = self.shared.clone();
		let device = self.device.clone();
		let running = self.running.clone();
		let spawned = std::thread::Builder::new()
			.name("unseen-capture".into())
			.spawn(move || delivery_loop(shared, device, running));

		match spawned {
			Ok(handle) => {
				session.delivery = Some(handle);
				self.go_live();
			}
			Err(err) => {
				self.running.store(false, Ordering::Release);
				let err = CaptureError::SessionConfiguration(err.to_string());
				tracing::warn!(error = %err, "capture thread failed to start");
				self.shared.enter_fallback(err.fallback_reason());
			}
		}
	}

	fn go_live(&self) {
		self.shared.controls.fallback.store(false, Ordering::Release);
		self.shared.publisher.update_status(|s| {
			s.state = PipelineState::Running;
			s.fallback_active = false;
			s.message = STATUS_LIVE.to_string();
		});
		tracing::info!("live analysis running");
	}

	fn permission_denied(&self) {
		self.shared.publisher.update_status(|s| s.permission_denied = true);
		self.shared.enter_fallback(CaptureError::PermissionDenied.fallback_reason());
	}

	/// Halt delivery and release the device. Idempotent.
	pub fn stop(&self) {
		let mut session = self.session.lock().expect("session lock poisoned");
		if self.shared.state() == PipelineState::Stopped {
			return;
		}

		self.running.store(false, Ordering::Release);
		if let Some(handle) = session.delivery.take() {
			let _ = handle.join();
		}
		self.device.lock().expect("device lock poisoned").close();

		self.shared.publisher.update_status(|s| {
			s.state = PipelineState::Stopped;
			s.message = STATUS_STOPPED.to_string();
		});
		tracing::info!("pipeline stopped");
	}

	/// Switch to the sample image. Always honored, even while live.
	pub fn activate_fallback(&self, reason: &str) {
		self.shared.enter_fallback(reason);
	}

	/// Returns the new frozen state.
	pub fn toggle_freeze(&self) -> bool {
		let frozen = {
			let _gate = self.shared.controls.frame_gate.lock().expect("frame_gate lock poisoned");
			!self.shared.controls.frozen.fetch_xor(true, Ordering::AcqRel)
		};
		let fallback = self.shared.controls.fallback.load(Ordering::Acquire);
		self.shared.publisher.update_status(|s| {
			s.frozen = frozen;
			s.message = match (frozen, fallback) {
				(true, _) => STATUS_FROZEN,
				(false, true) => STATUS_SAMPLE,
				(false, false) => STATUS_LIVE,
			}
			.to_string();
		});
		frozen
	}

	pub fn set_mode(&self, mode: VisionMode) {
		*self.shared.controls.mode.lock().expect("mode lock poisoned") = mode;
		self.shared.publisher.update_status(|s| {
			s.mode = mode;
			s.message = format!("Mode: {mode}");
		});
		if self.shared.controls.fallback.load(Ordering::Acquire) {
			self.shared.render_sample();
		}
	}

	/// Turning analysis off clears the published findings.
	pub fn set_analyze_text(&self, enabled: bool) {
		self.shared.controls.analyze_text.store(enabled, Ordering::Release);
		self.shared.publisher.update_status(|s| s.analyze_text = enabled);
		if !enabled {
			self.shared.publisher.publish_findings(Vec::new());
		}
	}

	pub fn mode(&self) -> VisionMode {
		self.shared.controls.mode()
	}

	pub fn state(&self) -> PipelineState {
		self.shared.state()
	}

	pub fn snapshot(&self) -> Snapshot {
		self.shared.publisher.snapshot()
	}

	pub fn subscribe(&self) -> Receiver<Event> {
		self.shared.publisher.subscribe()
	}

	/// Where a detector box lands in a view of `view` size. Zero before the first frame.
	pub fn overlay_rect(&self, bbox: ie::NormalizedRect, view: Size) -> Rect {
		match self.shared.publisher.frame() {
			Some(frame) => ie::geometry::overlay_rect(bbox, frame.size(), view),
			None => Rect::ZERO,
		}
	}

	/// Current findings with their view rectangles, skipping ones too small to draw.
	pub fn overlays(&self, view: Size) -> Vec<(Finding, Rect)> {
		let min_edge = self.shared.min_overlay_edge;
		self.shared
			.publisher
			.findings()
			.iter()
			.map(|f| (f.clone(), self.overlay_rect(f.bbox(), view)))
			.filter(|(_, r)| r.width > min_edge && r.height > min_edge)
			.collect()
	}

	/// Inspect the color under a tap. `None` before the first frame or off-image.
	pub fn inspect(&self, point: Point, view: Size) -> Option<Arc<Inspection>> {
		let frame = self.shared.publisher.frame()?;
		let findings = self.shared.publisher.findings();
		let request = InspectRequest {
			image: &frame.image,
			findings: &findings,
			mode: self.shared.controls.mode(),
			sample_size: self.shared.tap_sample_size,
			alert: self.shared.alert.as_deref(),
		};
		let inspection = inspect::inspect(&request, point, view)?;
		Some(self.shared.publisher.publish_inspection(inspection))
	}
}

impl Drop for Pipeline {
	fn drop(&mut self) {
		self.running.store(false, Ordering::Release);
		if let Ok(mut session) = self.session.lock() {
			if let Some(handle) = session.delivery.take() {
				let _ = handle.join();
				// Opened by `start()` and never closed by `stop()`.
				if let Ok(mut device) = self.device.lock() {
					device.close();
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn finding(ratio: f64) -> Finding {
		let est = ie::ContrastEstimate {
			ratio,
			foreground: ie::Sample::BLACK,
			background: ie::Sample::WHITE,
		};
		Finding::new("x", ie::NormalizedRect::new(0.1, 0.1, 0.1, 0.1), &est).unwrap()
	}

	#[test]
	fn summary_reports_worst_failure() {
		let findings = vec![finding(2.346), finding(3.0), finding(8.0)];
		assert_eq!(
			analysis_summary(VisionMode::Protanopia, &findings),
			"Protanopia · FAIL 2.35 found"
		);
	}

	#[test]
	fn summary_for_empty_and_all_pass() {
		assert_eq!(analysis_summary(VisionMode::Normal, &[]), "No text recognized");
		assert_eq!(
			analysis_summary(VisionMode::Tritanopia, &[finding(4.5), finding(12.0)]),
			"Tritanopia · all text PASS"
		);
	}
}
