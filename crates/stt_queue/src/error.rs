use crate::task::Task;
use thiserror::Error;

/// Submission-side rejection.
///
/// Both variants hand the task back so the caller keeps ownership of the
/// audio handle and can decide whether to retry or drop it.
#[derive(Error, Debug)]
pub enum SubmitError {
	/// The queue is at capacity; the caller should back off and retry.
	#[error("task queue is full")]
	QueueFull(Task),

	/// The consumer half is gone; the process is shutting down.
	#[error("task queue is closed")]
	Closed(Task),
}

impl SubmitError {
	/// Recover the rejected task.
	#[must_use]
	pub fn into_task(self) -> Task {
		match self {
			Self::QueueFull(task) | Self::Closed(task) => task,
		}
	}
}
