//! Single-flight guard for the text-analysis pass.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// At most one analysis in flight. Extra requests are dropped, never queued.
#[derive(Debug, Clone, Default)]
pub struct AnalysisSlot {
	busy: Arc<AtomicBool>,
}

impl AnalysisSlot {
	pub fn new() -> Self {
		Self::default()
	}

	/// Take the slot if it is free. `false` (and no side effect) when busy.
	pub fn claim(&self) -> bool {
		self.busy
			.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
			.is_ok()
	}

	pub fn release(&self) {
		self.busy.store(false, Ordering::Release);
	}

	pub fn is_busy(&self) -> bool {
		self.busy.load(Ordering::Acquire)
	}

	/// Claim with a permit that releases the slot when dropped.
	pub fn try_acquire(&self) -> Option<SlotPermit> {
		self.claim().then(|| SlotPermit { slot: self.clone() })
	}
}

#[must_use = "dropping the permit releases the slot"]
#[derive(Debug)]
pub struct SlotPermit {
	slot: AnalysisSlot,
}

impl Drop for SlotPermit {
	fn drop(&mut self) {
		self.slot.release();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Barrier;

	#[test]
	fn claim_is_exclusive_until_released() {
		let slot = AnalysisSlot::new();
		assert!(slot.claim());
		assert!(!slot.claim());
		slot.release();
		assert!(slot.claim());
	}

	#[test]
	fn permit_releases_on_drop() {
		let slot = AnalysisSlot::new();
		let permit = slot.try_acquire().unwrap();
		assert!(slot.try_acquire().is_none());
		drop(permit);
		assert!(!slot.is_busy());
		assert!(slot.try_acquire().is_some());
	}

	#[test]
	fn concurrent_claims_while_held_all_fail() {
		let slot = AnalysisSlot::new();
		let _held = slot.try_acquire().unwrap();

		let n = 16;
		let barrier = Arc::new(Barrier::new(n));
		let handles: Vec<_> = (0..n)
			.map(|_| {
				let slot = slot.clone();
				let barrier = barrier.clone();
				std::thread::spawn(move || {
					barrier.wait();
					slot.claim()
				})
			})
			.collect();

		let wins = handles
			.into_iter()
			.map(|h| h.join().unwrap())
			.filter(|won| *won)
			.count();
		assert_eq!(wins, 0);
	}

	#[test]
	fn concurrent_claims_yield_exactly_one_winner() {
		let slot = AnalysisSlot::new();
		let n = 16;
		let barrier = Arc::new(Barrier::new(n));
		let handles: Vec<_> = (0..n)
			.map(|_| {
				let slot = slot.clone();
				let barrier = barrier.clone();
				std::thread::spawn(move || {
					barrier.wait();
					slot.claim()
				})
			})
			.collect();

		let wins = handles
			.into_iter()
			.map(|h| h.join().unwrap())
			.filter(|won| *won)
			.count();
		assert_eq!(wins, 1);
		assert!(slot.is_busy());
	}
}
