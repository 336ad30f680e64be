use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared counters and status for the worker, owned by the context and read
/// by the heartbeat.
pub struct WorkerState {
	// Submission metrics
	pub tasks_accepted: AtomicU64,
	pub tasks_rejected: AtomicU64,

	// Processing metrics
	pub tasks_completed: AtomicU64,
	pub tasks_failed: AtomicU64,
	pub reports_failed: AtomicU64,

	// Queue state
	pub queue_depth: AtomicUsize,

	// Worker state
	pub is_transcribing: AtomicBool,
}

impl Default for WorkerState {
	fn default() -> Self {
		Self {
			tasks_accepted: AtomicU64::new(0),
			tasks_rejected: AtomicU64::new(0),
			tasks_completed: AtomicU64::new(0),
			tasks_failed: AtomicU64::new(0),
			reports_failed: AtomicU64::new(0),
			queue_depth: AtomicUsize::new(0),
			is_transcribing: AtomicBool::new(false),
		}
	}
}

impl WorkerState {
	#[must_use]
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	// Convenience methods
	pub fn set_transcribing(&self, value: bool) {
		self.is_transcribing.store(value, Ordering::Relaxed);
	}

	pub fn is_transcribing(&self) -> bool {
		self.is_transcribing.load(Ordering::Relaxed)
	}

	pub fn update_queue_depth(&self, depth: usize) {
		self.queue_depth.store(depth, Ordering::Relaxed);
	}

	pub fn record_accepted(&self) {
		self.tasks_accepted.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_rejected(&self) {
		self.tasks_rejected.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_completed(&self) {
		self.tasks_completed.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_failed(&self) {
		self.tasks_failed.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_report_failed(&self) {
		self.reports_failed.fetch_add(1, Ordering::Relaxed);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_counters_start_at_zero() {
		let state = WorkerState::new();
		assert_eq!(state.tasks_accepted.load(Ordering::Relaxed), 0);
		assert_eq!(state.tasks_completed.load(Ordering::Relaxed), 0);
		assert!(!state.is_transcribing());
	}

	#[test]
	fn test_record_methods_increment() {
		let state = WorkerState::new();
		state.record_accepted();
		state.record_accepted();
		state.record_rejected();
		state.record_completed();
		state.record_failed();
		state.record_report_failed();
		state.update_queue_depth(3);
		state.set_transcribing(true);

		assert_eq!(state.tasks_accepted.load(Ordering::Relaxed), 2);
		assert_eq!(state.tasks_rejected.load(Ordering::Relaxed), 1);
		assert_eq!(state.tasks_completed.load(Ordering::Relaxed), 1);
		assert_eq!(state.tasks_failed.load(Ordering::Relaxed), 1);
		assert_eq!(state.reports_failed.load(Ordering::Relaxed), 1);
		assert_eq!(state.queue_depth.load(Ordering::Relaxed), 3);
		assert!(state.is_transcribing());
	}
}
