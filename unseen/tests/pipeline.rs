use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use ie::{Color, NormalizedRect, OwnedImage, Point, Size, TextObservation, VisionMode};
use unseen::capture::{Authorization, CaptureDevice, Frame};
use unseen::error::CaptureError;
use unseen::{Event, Pipeline, PipelineSettings, PipelineState, Snapshot};

const LIVE_W: u32 = 64;
const LIVE_H: u32 = 48;

#[derive(Default)]
struct DeviceStats {
	frames: AtomicUsize,
	closed: AtomicUsize,
}

struct FakeDevice {
	authorization: Authorization,
	grant: bool,
	open_error: Option<CaptureError>,
	fail_after: Option<usize>,
	stats: Arc<DeviceStats>,
}

impl FakeDevice {
	fn working() -> Self {
		Self {
			authorization: Authorization::Authorized,
			grant: true,
			open_error: None,
			fail_after: None,
			stats: Arc::default(),
		}
	}
}

impl CaptureDevice for FakeDevice {
	fn authorization(&self) -> Authorization {
		self.authorization
	}

	fn request_access(&mut self) -> bool {
		self.grant
	}

	fn open(&mut self) -> Result<(), CaptureError> {
		match self.open_error.take() {
			Some(err) => Err(err),
			None => Ok(()),
		}
	}

	fn next_frame(&mut self) -> Result<Frame, CaptureError> {
		std::thread::sleep(Duration::from_millis(2));
		let n = self.stats.frames.fetch_add(1, Ordering::SeqCst) + 1;
		if self.fail_after.is_some_and(|limit| n > limit) {
			return Err(CaptureError::DeviceUnavailable("unplugged".into()));
		}
		let image = OwnedImage::filled(LIVE_W, LIVE_H, Color::new(200, 40, 40));
		Ok(Frame::new(image, ie::Orientation::Up))
	}

	fn close(&mut self) {
		self.stats.closed.fetch_add(1, Ordering::SeqCst);
	}
}

#[derive(Default)]
struct DetectorStats {
	calls: AtomicUsize,
	fail: AtomicBool,
}

/// Reports one string on the red demo tag, or fails on demand.
struct ScriptedDetector(Arc<DetectorStats>);

impl ie::TextDetector for ScriptedDetector {
	fn detect(&self, _image: ie::Image) -> anyhow::Result<Vec<TextObservation>> {
		self.0.calls.fetch_add(1, Ordering::SeqCst);
		if self.0.fail.load(Ordering::SeqCst) {
			anyhow::bail!("model crashed");
		}
		Ok(vec![TextObservation {
			text: "Play".into(),
			bbox: NormalizedRect::new(120.0 / 1280.0, 350.0 / 720.0, 420.0 / 1280.0, 120.0 / 720.0),
			confidence: 0.9,
		}])
	}
}

fn pipeline_with(device: FakeDevice, settings: PipelineSettings) -> (Pipeline, Arc<DetectorStats>) {
	let stats = Arc::new(DetectorStats::default());
	let ie = ie::Ie::new(Box::new(ScriptedDetector(stats.clone())), ie::ContrastSettings::default());
	let pipeline = Pipeline::new(settings, Box::new(device), ie, None).unwrap();
	(pipeline, stats)
}

/// Labels every hit with the analyzed frame's height; slow on one height.
struct SlowDetector {
	slow_height: u32,
	delay: Duration,
	heights: Arc<Mutex<Vec<u32>>>,
	dropped: Arc<AtomicBool>,
}

impl SlowDetector {
	fn new(slow_height: u32, delay: Duration) -> Self {
		Self {
			slow_height,
			delay,
			heights: Arc::default(),
			dropped: Arc::default(),
		}
	}
}

impl ie::TextDetector for SlowDetector {
	fn detect(&self, image: ie::Image) -> anyhow::Result<Vec<TextObservation>> {
		let height = image.height();
		self.heights.lock().unwrap().push(height);
		if height == self.slow_height {
			std::thread::sleep(self.delay);
		}
		Ok(vec![TextObservation {
			text: format!("h{height}"),
			bbox: NormalizedRect::new(0.1, 0.5, 0.3, 0.2),
			confidence: 0.9,
		}])
	}
}

impl Drop for SlowDetector {
	fn drop(&mut self) {
		self.dropped.store(true, Ordering::SeqCst);
	}
}

fn pipeline_with_detector(device: FakeDevice, settings: PipelineSettings, detector: impl ie::TextDetector + 'static) -> Pipeline {
	let ie = ie::Ie::new(Box::new(detector), ie::ContrastSettings::default());
	Pipeline::new(settings, Box::new(device), ie, None).unwrap()
}

fn wait_until(what: &str, pred: impl Fn() -> bool) {
	let deadline = Instant::now() + Duration::from_secs(5);
	while !pred() {
		assert!(Instant::now() < deadline, "timed out waiting for {what}");
		std::thread::sleep(Duration::from_millis(5));
	}
}

fn finding_texts(snapshot: &Snapshot) -> Vec<String> {
	snapshot.findings.iter().map(|f| f.text().to_string()).collect()
}

fn wait_for(pipeline: &Pipeline, what: &str, pred: impl Fn(&Snapshot) -> bool) -> Snapshot {
	let deadline = Instant::now() + Duration::from_secs(5);
	loop {
		let snapshot = pipeline.snapshot();
		if pred(&snapshot) {
			return snapshot;
		}
		assert!(Instant::now() < deadline, "timed out waiting for {what}");
		std::thread::sleep(Duration::from_millis(5));
	}
}

fn frame_size(snapshot: &Snapshot) -> Option<Size> {
	snapshot.frame.as_ref().map(|f| f.size())
}

/// Analysis results rewrite the status line, so tests that read it turn analysis off.
fn quiet() -> PipelineSettings {
	PipelineSettings {
		analyze_text: false,
		..Default::default()
	}
}

const DEMO: Size = Size::new(1280.0, 720.0);
const LIVE: Size = Size::new(LIVE_W as f64, LIVE_H as f64);

#[test]
fn denied_permission_shows_sample_frame() {
	let device = FakeDevice {
		authorization: Authorization::Denied,
		..FakeDevice::working()
	};
	let (pipeline, _) = pipeline_with(device, quiet());
	pipeline.start();

	let snapshot = pipeline.snapshot();
	assert_eq!(snapshot.status.state, PipelineState::Fallback);
	assert!(snapshot.status.permission_denied);
	assert!(snapshot.status.fallback_active);
	assert_eq!(snapshot.status.message, "Sample mode: no capture permission");
	assert_eq!(frame_size(&snapshot), Some(DEMO));
	assert_eq!(snapshot.frame.unwrap().mode, VisionMode::Deuteranopia);
}

#[test]
fn refused_permission_request_shows_sample_frame() {
	let device = FakeDevice {
		authorization: Authorization::NotDetermined,
		grant: false,
		..FakeDevice::working()
	};
	let (pipeline, _) = pipeline_with(device, PipelineSettings::default());
	pipeline.start();

	let status = pipeline.snapshot().status;
	assert_eq!(status.state, PipelineState::Fallback);
	assert!(status.permission_denied);
}

#[test]
fn missing_device_shows_sample_frame() {
	let device = FakeDevice {
		open_error: Some(CaptureError::DeviceUnavailable("none".into())),
		..FakeDevice::working()
	};
	let (pipeline, _) = pipeline_with(device, quiet());
	pipeline.start();

	let snapshot = pipeline.snapshot();
	assert_eq!(snapshot.status.state, PipelineState::Fallback);
	assert!(!snapshot.status.permission_denied);
	assert_eq!(snapshot.status.message, "Sample mode: no capture device");
	assert_eq!(frame_size(&snapshot), Some(DEMO));
}

#[test]
fn live_frames_are_analyzed_every_nth_frame() {
	let device = FakeDevice::working();
	let stats = device.stats.clone();
	let settings = PipelineSettings {
		ocr_frame_interval: 3,
		..Default::default()
	};
	let (pipeline, detector) = pipeline_with(device, settings);
	pipeline.start();
	assert_eq!(pipeline.state(), PipelineState::Running);

	wait_for(&pipeline, "live frame", |s| frame_size(s) == Some(LIVE));
	while stats.frames.load(Ordering::SeqCst) < 30 {
		std::thread::sleep(Duration::from_millis(5));
	}
	pipeline.stop();

	let delivered = stats.frames.load(Ordering::SeqCst);
	let analyzed = detector.calls.load(Ordering::SeqCst);
	assert!(analyzed >= 1);
	assert!(analyzed <= delivered / 3, "{analyzed} passes for {delivered} frames");
}

#[test]
fn frozen_pipeline_drops_frames() {
	let device = FakeDevice::working();
	let (pipeline, _) = pipeline_with(device, quiet());
	pipeline.start();
	wait_for(&pipeline, "live frame", |s| s.frame.is_some());

	assert!(pipeline.toggle_freeze());
	assert_eq!(pipeline.snapshot().status.message, "Frame frozen");
	let events = pipeline.subscribe();
	std::thread::sleep(Duration::from_millis(50));
	let frames = events.try_iter().filter(|e| matches!(e, Event::Frame(_))).count();
	assert_eq!(frames, 0);

	assert!(!pipeline.toggle_freeze());
	assert_eq!(pipeline.snapshot().status.message, "Live analysis");
	let events = pipeline.subscribe();
	let resumed = events.recv_timeout(Duration::from_secs(5)).unwrap();
	assert!(matches!(resumed, Event::Frame(_)));
	pipeline.stop();
}

#[test]
fn failed_analysis_keeps_previous_findings() {
	let device = FakeDevice {
		open_error: Some(CaptureError::SessionConfiguration("busy".into())),
		..FakeDevice::working()
	};
	let (pipeline, detector) = pipeline_with(device, PipelineSettings::default());
	pipeline.start();

	let first = wait_for(&pipeline, "findings", |s| s.findings.len() == 1);
	assert_eq!(first.findings[0].text(), "Play");

	detector.fail.store(true, Ordering::SeqCst);
	pipeline.set_mode(VisionMode::Protanopia);
	let after = wait_for(&pipeline, "analysis error", |s| s.status.message == "Text analysis error");
	assert_eq!(after.findings.len(), 1);
	assert_eq!(after.frame.unwrap().mode, VisionMode::Protanopia);
	assert_eq!(detector.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn disabling_text_analysis_clears_findings() {
	let device = FakeDevice {
		authorization: Authorization::Restricted,
		..FakeDevice::working()
	};
	let (pipeline, _) = pipeline_with(device, PipelineSettings::default());
	pipeline.start();
	wait_for(&pipeline, "findings", |s| !s.findings.is_empty());

	pipeline.set_analyze_text(false);
	let snapshot = pipeline.snapshot();
	assert!(snapshot.findings.is_empty());
	assert!(!snapshot.status.analyze_text);
}

#[test]
fn stop_is_idempotent() {
	let device = FakeDevice::working();
	let stats = device.stats.clone();
	let (pipeline, _) = pipeline_with(device, PipelineSettings::default());
	pipeline.start();
	wait_for(&pipeline, "live frame", |s| s.frame.is_some());

	pipeline.stop();
	pipeline.stop();
	assert_eq!(pipeline.state(), PipelineState::Stopped);
	assert_eq!(stats.closed.load(Ordering::SeqCst), 1);

	let frames = stats.frames.load(Ordering::SeqCst);
	std::thread::sleep(Duration::from_millis(30));
	assert_eq!(stats.frames.load(Ordering::SeqCst), frames);
}

#[test]
fn manual_fallback_overrides_live_capture() {
	let device = FakeDevice::working();
	let (pipeline, _) = pipeline_with(device, PipelineSettings::default());
	pipeline.start();
	wait_for(&pipeline, "live frame", |s| frame_size(s) == Some(LIVE));

	pipeline.activate_fallback("Sample mode");
	let events = pipeline.subscribe();
	let snapshot = pipeline.snapshot();
	assert_eq!(snapshot.status.state, PipelineState::Fallback);
	assert_eq!(frame_size(&snapshot), Some(DEMO));

	// Delivery keeps running, but no live frame may land on the sample render.
	std::thread::sleep(Duration::from_millis(50));
	let live_frames = events
		.try_iter()
		.filter(|e| matches!(e, Event::Frame(f) if f.size() == LIVE))
		.count();
	assert_eq!(live_frames, 0);
	assert_eq!(frame_size(&pipeline.snapshot()), Some(DEMO));

	pipeline.start();
	assert_eq!(pipeline.state(), PipelineState::Running);
	wait_for(&pipeline, "live frame again", |s| frame_size(s) == Some(LIVE));
	pipeline.stop();
}

#[test]
fn lost_device_falls_back() {
	let device = FakeDevice {
		fail_after: Some(5),
		..FakeDevice::working()
	};
	let (pipeline, _) = pipeline_with(device, quiet());
	pipeline.start();

	let snapshot = wait_for(&pipeline, "fallback", |s| s.status.state == PipelineState::Fallback);
	assert_eq!(snapshot.status.message, "Sample mode: no capture device");
	wait_for(&pipeline, "sample frame", |s| frame_size(s) == Some(DEMO));
}

#[test]
fn mode_change_in_sample_mode_rerenders() {
	let device = FakeDevice {
		authorization: Authorization::Denied,
		..FakeDevice::working()
	};
	let (pipeline, detector) = pipeline_with(device, quiet());
	pipeline.start();

	pipeline.set_mode(VisionMode::Normal);
	let snapshot = pipeline.snapshot();
	assert_eq!(snapshot.status.message, "Mode: Normal");
	assert_eq!(snapshot.frame.as_ref().unwrap().mode, VisionMode::Normal);
	let image = &snapshot.frame.unwrap().image;
	// Normal is a no-op, so the demo tag color comes back unchanged.
	assert_eq!(image.pixel(130, 260), Color::new(231, 76, 60));
	assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn inspecting_the_sample_frame() {
	let device = FakeDevice {
		authorization: Authorization::Denied,
		..FakeDevice::working()
	};
	let (pipeline, _) = pipeline_with(device, PipelineSettings::default());
	assert!(pipeline.inspect(Point::new(10.0, 10.0), DEMO).is_none());

	pipeline.start();
	let inspection = pipeline.inspect(Point::new(150.0, 340.0), DEMO).unwrap();
	assert_eq!(inspection.mode_samples.len(), 4);
	assert_eq!(inspection.mode_samples[0], (VisionMode::Normal, inspection.picked_hex.clone()));
	assert_eq!(pipeline.snapshot().inspection.as_deref(), Some(&*inspection));

	// Letterboxed: the image spans y in [140, 860) of a 1280x1000 view.
	assert!(pipeline.inspect(Point::new(640.0, 20.0), Size::new(1280.0, 1000.0)).is_none());
}

#[test]
fn overlays_follow_the_published_frame() {
	let device = FakeDevice {
		authorization: Authorization::Denied,
		..FakeDevice::working()
	};
	let (pipeline, _) = pipeline_with(device, PipelineSettings::default());
	let bbox = NormalizedRect::new(0.25, 0.5, 0.5, 0.25);
	assert_eq!(pipeline.overlay_rect(bbox, DEMO), ie::Rect::ZERO);

	pipeline.start();
	let rect = pipeline.overlay_rect(bbox, DEMO);
	assert_eq!(rect, ie::Rect::new(320.0, 180.0, 640.0, 180.0));

	wait_for(&pipeline, "findings", |s| !s.findings.is_empty());
	assert_eq!(pipeline.overlays(DEMO).len(), 1);
	// A tiny view shrinks the tag overlay below the drawable edge.
	assert!(pipeline.overlays(Size::new(32.0, 18.0)).is_empty());
}

#[test]
fn granted_permission_request_goes_live() {
	let device = FakeDevice {
		authorization: Authorization::NotDetermined,
		grant: true,
		..FakeDevice::working()
	};
	let (pipeline, _) = pipeline_with(device, quiet());
	let events = pipeline.subscribe();
	pipeline.start();

	let mut states: Vec<PipelineState> = events
		.try_iter()
		.filter_map(|e| match e {
			Event::Status(status) => Some(status.state),
			_ => None,
		})
		.collect();
	states.dedup();
	assert_eq!(
		states,
		vec![
			PipelineState::RequestingPermission,
			PipelineState::Configuring,
			PipelineState::Running,
		]
	);
	assert!(!pipeline.snapshot().status.permission_denied);
	wait_for(&pipeline, "live frame", |s| frame_size(s) == Some(LIVE));
	pipeline.stop();
}

#[test]
fn sample_mode_during_live_analysis_analyzes_the_sample() {
	let settings = PipelineSettings {
		ocr_frame_interval: 1,
		..Default::default()
	};
	let detector = SlowDetector::new(LIVE_H, Duration::from_millis(300));
	let heights = detector.heights.clone();
	let pipeline = pipeline_with_detector(FakeDevice::working(), settings, detector);
	pipeline.start();

	wait_until("live analysis", || !heights.lock().unwrap().is_empty());
	pipeline.activate_fallback("Sample mode");

	let snapshot = wait_for(&pipeline, "sample findings", |s| finding_texts(s) == ["h720"]);
	assert_eq!(frame_size(&snapshot), Some(DEMO));
	assert_eq!(heights.lock().unwrap().last(), Some(&720));

	// The live pass that was in flight must not replace the sample's findings.
	std::thread::sleep(Duration::from_millis(400));
	assert_eq!(finding_texts(&pipeline.snapshot()), ["h720"]);
	pipeline.stop();
}

#[test]
fn dropping_the_pipeline_mid_analysis_ends_the_worker() {
	let device = FakeDevice {
		authorization: Authorization::Denied,
		..FakeDevice::working()
	};
	let detector = SlowDetector::new(720, Duration::from_millis(200));
	let heights = detector.heights.clone();
	let dropped = detector.dropped.clone();
	let pipeline = pipeline_with_detector(device, PipelineSettings::default(), detector);
	pipeline.start();

	wait_until("sample analysis", || !heights.lock().unwrap().is_empty());
	drop(pipeline);

	// The worker finishes the pass, finds the pipeline gone and releases the engine.
	wait_until("worker exit", || dropped.load(Ordering::SeqCst));
	assert_eq!(heights.lock().unwrap().len(), 1);
}

#[test]
fn dropping_a_live_pipeline_closes_the_device() {
	let device = FakeDevice::working();
	let stats = device.stats.clone();
	let (pipeline, _) = pipeline_with(device, quiet());
	pipeline.start();
	wait_for(&pipeline, "live frame", |s| s.frame.is_some());

	drop(pipeline);
	assert_eq!(stats.closed.load(Ordering::SeqCst), 1);
}
