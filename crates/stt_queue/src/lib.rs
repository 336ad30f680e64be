//! Bounded task queue for background speech-to-text processing.
//!
//! A submitter turns an uploaded audio file into a [`Task`] and pushes it
//! through [`TaskSender::submit`], which never blocks: a full queue rejects
//! the task immediately so the caller can surface backpressure. Exactly one
//! worker consumes the other end in strict arrival order and resolves each
//! task to an [`Outcome`].

pub mod error;
pub mod queue;
pub mod task;

pub use error::SubmitError;
pub use queue::{TaskQueue, TaskSender, DEFAULT_QUEUE_CAPACITY};
pub use task::{AudioHandle, Outcome, Task, TaskId};
