use crate::error::SubmitError;
use crate::task::Task;
use tokio::sync::mpsc;

/// Default bound on outstanding tasks before submissions are rejected.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Bounded FIFO of pending transcription tasks.
///
/// Uses a bounded MPSC channel to enforce backpressure instead of hiding
/// overload: `submit` never blocks and never displaces a queued task. The
/// receiver half can be taken exactly once; the single-consumer invariant is
/// what keeps inference-device access exclusive without a lock.
pub struct TaskQueue {
	tx: mpsc::Sender<Task>,
	rx: Option<mpsc::Receiver<Task>>,
	capacity: usize,
}

impl TaskQueue {
	/// # Panics
	///
	/// Panics if `capacity` is zero (a zero-capacity channel cannot hold work).
	#[must_use]
	pub fn new(capacity: usize) -> Self {
		let (tx, rx) = mpsc::channel(capacity);

		Self { tx, rx: Some(rx), capacity }
	}

	#[must_use]
	pub const fn capacity(&self) -> usize {
		self.capacity
	}

	/// Get a producer handle for submission contexts.
	#[must_use]
	pub fn sender(&self) -> TaskSender {
		TaskSender { tx: self.tx.clone() }
	}

	/// Take the consumer half (for the worker - can only be taken once).
	pub fn take_receiver(&mut self) -> Option<mpsc::Receiver<Task>> {
		self.rx.take()
	}
}

/// Cloneable producer half of a [`TaskQueue`].
#[derive(Clone)]
pub struct TaskSender {
	tx: mpsc::Sender<Task>,
}

impl TaskSender {
	/// Enqueue a task without blocking.
	///
	/// # Errors
	///
	/// [`SubmitError::QueueFull`] when the queue is at capacity and
	/// [`SubmitError::Closed`] when the worker side is gone; either way the
	/// task is handed back to the caller.
	pub fn submit(&self, task: Task) -> Result<(), SubmitError> {
		match self.tx.try_send(task) {
			Ok(()) => Ok(()),
			Err(mpsc::error::TrySendError::Full(task)) => Err(SubmitError::QueueFull(task)),
			Err(mpsc::error::TrySendError::Closed(task)) => Err(SubmitError::Closed(task)),
		}
	}

	/// Number of tasks currently waiting in the queue.
	#[must_use]
	pub fn depth(&self) -> usize {
		self.tx.max_capacity() - self.tx.capacity()
	}
}
