use std::sync::Arc;
use stt_queue::{AudioHandle, SubmitError, Task, TaskId, TaskSender};
use tracing::{debug, warn};

use crate::models::ModelCatalog;
use crate::observability::{QUEUE_DEPTH, TASKS_ACCEPTED, TASKS_REJECTED};
use crate::state::WorkerState;

/// Owns the queue producer half, the model catalog, and the shared state.
///
/// Built once at startup and handed to both the submission side and the
/// worker; there are no global registries to reach around it.
pub struct WorkerContext {
	sender: TaskSender,
	catalog: Arc<ModelCatalog>,
	state: Arc<WorkerState>,
}

// The submission side belongs to the embedding front end; only tests drive
// it inside this binary.
#[allow(dead_code)]
impl WorkerContext {
	#[must_use]
	pub fn new(sender: TaskSender, catalog: Arc<ModelCatalog>, state: Arc<WorkerState>) -> Self {
		Self { sender, catalog, state }
	}

	#[must_use]
	pub fn catalog(&self) -> &ModelCatalog {
		&self.catalog
	}

	#[must_use]
	pub fn state(&self) -> &Arc<WorkerState> {
		&self.state
	}

	/// Submission boundary for the front end: wrap an upload into a task and
	/// enqueue it without blocking.
	///
	/// # Errors
	///
	/// [`SubmitError::QueueFull`] is the backpressure signal the front end
	/// turns into a 429; [`SubmitError::Closed`] means shutdown is underway.
	pub fn submit(&self, model_name: &str, audio: AudioHandle, task_id: TaskId) -> Result<(), SubmitError> {
		let task = Task::new(task_id, model_name, audio);

		match self.sender.submit(task) {
			Ok(()) => {
				self.state.record_accepted();
				TASKS_ACCEPTED.inc();
				let depth = self.sender.depth();
				self.state.update_queue_depth(depth);
				QUEUE_DEPTH.set(depth as i64);
				debug!(task_id = %task_id, model = model_name, depth, "task accepted");
				Ok(())
			}
			Err(e) => {
				self.state.record_rejected();
				TASKS_REJECTED.inc();
				warn!(task_id = %task_id, model = model_name, "task rejected: {e}");
				Err(e)
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::Ordering;
	use stt_queue::TaskQueue;

	fn audio() -> AudioHandle {
		AudioHandle::from_bytes(b"fake audio", "wav").unwrap()
	}

	fn test_context(capacity: usize) -> (WorkerContext, TaskQueue) {
		let queue = TaskQueue::new(capacity);
		let catalog = {
			let dir = tempfile::tempdir().unwrap();
			Arc::new(ModelCatalog::discover(dir.path()).unwrap())
		};
		let context = WorkerContext::new(queue.sender(), catalog, WorkerState::new());
		(context, queue)
	}

	#[test]
	fn test_submit_accepts_until_capacity() {
		let (context, _queue) = test_context(2);

		assert!(context.submit("base", audio(), TaskId::new(1)).is_ok());
		assert!(context.submit("base", audio(), TaskId::new(2)).is_ok());
		assert_eq!(context.state().tasks_accepted.load(Ordering::Relaxed), 2);

		let err = context.submit("base", audio(), TaskId::new(3)).unwrap_err();
		assert!(matches!(err, SubmitError::QueueFull(_)));
		assert_eq!(context.state().tasks_rejected.load(Ordering::Relaxed), 1);
	}

	#[test]
	fn test_submit_tracks_queue_depth() {
		let (context, _queue) = test_context(5);

		context.submit("base", audio(), TaskId::new(1)).unwrap();
		context.submit("base", audio(), TaskId::new(2)).unwrap();

		assert_eq!(context.state().queue_depth.load(Ordering::Relaxed), 2);
	}
}
