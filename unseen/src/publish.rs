//! Published pipeline state.
//!
//! Producers replace whole values (frame, findings, status, inspection) and
//! observers only ever see immutable snapshots. Delivery is fire-and-forget
//! over bounded channels: an observer that falls `OBSERVER_BACKLOG` events
//! behind misses the overflow and can catch up through `snapshot()`.

use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, RwLock};

use ie::{Finding, OwnedImage, Size, VisionMode};

use crate::inspect::Inspection;
use crate::pipeline::PipelineState;

/// Events queued per observer before new ones are dropped.
pub const OBSERVER_BACKLOG: usize = 32;

/// A transformed frame ready for display.
#[derive(Debug, Clone)]
pub struct PublishedFrame {
	pub image: Arc<OwnedImage>,
	pub mode: VisionMode,
}

impl PublishedFrame {
	/// Pixel size of the published image.
	pub fn size(&self) -> Size {
		Size::new(self.image.width() as f64, self.image.height() as f64)
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct Status {
	pub state: PipelineState,
	pub mode: VisionMode,
	pub message: String,
	pub permission_denied: bool,
	pub fallback_active: bool,
	pub frozen: bool,
	pub analyze_text: bool,
}

impl Default for Status {
	fn default() -> Self {
		Self {
			state: PipelineState::Uninitialized,
			mode: VisionMode::default(),
			message: "Preparing capture...".to_string(),
			permission_denied: false,
			fallback_active: false,
			frozen: false,
			analyze_text: true,
		}
	}
}

#[derive(Debug, Clone, Default)]
pub struct Snapshot {
	pub frame: Option<Arc<PublishedFrame>>,
	pub findings: Arc<Vec<Finding>>,
	pub status: Status,
	pub inspection: Option<Arc<Inspection>>,
}

#[derive(Debug, Clone)]
pub enum Event {
	Frame(Arc<PublishedFrame>),
	Findings(Arc<Vec<Finding>>),
	Status(Status),
	Inspection(Arc<Inspection>),
}

#[derive(Debug, Default)]
pub struct Publisher {
	latest: RwLock<Snapshot>,
	observers: Mutex<Vec<SyncSender<Event>>>,
}

impl Publisher {
	pub fn new(status: Status) -> Self {
		Self {
			latest: RwLock::new(Snapshot {
				status,
				..Default::default()
			}),
			observers: Mutex::new(Vec::new()),
		}
	}

	pub fn snapshot(&self) -> Snapshot {
		self.latest.read().expect("snapshot lock poisoned").clone()
	}

	pub fn status(&self) -> Status {
		self.latest.read().expect("snapshot lock poisoned").status.clone()
	}

	pub fn frame(&self) -> Option<Arc<PublishedFrame>> {
		self.latest.read().expect("snapshot lock poisoned").frame.clone()
	}

	pub fn findings(&self) -> Arc<Vec<Finding>> {
		self.latest.read().expect("snapshot lock poisoned").findings.clone()
	}

	/// New observer. It receives events published from now on, up to the backlog.
	pub fn subscribe(&self) -> Receiver<Event> {
		let (tx, rx) = mpsc::sync_channel(OBSERVER_BACKLOG);
		self.observers.lock().expect("observers lock poisoned").push(tx);
		rx
	}

	pub fn publish_frame(&self, frame: PublishedFrame) {
		let frame = Arc::new(frame);
		self.latest.write().expect("snapshot lock poisoned").frame = Some(frame.clone());
		self.broadcast(Event::Frame(frame));
	}

	pub fn publish_findings(&self, findings: Vec<Finding>) {
		let findings = Arc::new(findings);
		self.latest.write().expect("snapshot lock poisoned").findings = findings.clone();
		self.broadcast(Event::Findings(findings));
	}

	pub fn publish_inspection(&self, inspection: Inspection) -> Arc<Inspection> {
		let inspection = Arc::new(inspection);
		self.latest.write().expect("snapshot lock poisoned").inspection = Some(inspection.clone());
		self.broadcast(Event::Inspection(inspection.clone()));
		inspection
	}

	/// Replace the status with an edited copy. Observers are only notified on change.
	pub fn update_status(&self, edit: impl FnOnce(&mut Status)) {
		let changed = {
			let mut latest = self.latest.write().expect("snapshot lock poisoned");
			let mut status = latest.status.clone();
			edit(&mut status);
			if status == latest.status {
				None
			} else {
				latest.status = status.clone();
				Some(status)
			}
		};
		if let Some(status) = changed {
			tracing::debug!(state = ?status.state, message = %status.message, "status");
			self.broadcast(Event::Status(status));
		}
	}

	fn broadcast(&self, event: Event) {
		// Disconnected observers are dropped on the way; full ones just miss this event.
		self.observers
			.lock()
			.expect("observers lock poisoned")
			.retain(|tx| match tx.try_send(event.clone()) {
				Ok(()) | Err(TrySendError::Full(_)) => true,
				Err(TrySendError::Disconnected(_)) => false,
			});
	}
}
