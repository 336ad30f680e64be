use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::{Builder, NamedTempFile};
use tracing::debug;

/// Opaque correlation id supplied by the submitter.
///
/// The worker never interprets it; it only travels with the task so the
/// eventual report can be matched to the original request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(i64);

impl TaskId {
	#[must_use]
	pub const fn new(id: i64) -> Self {
		Self(id)
	}

	#[must_use]
	pub const fn value(self) -> i64 {
		self.0
	}
}

impl fmt::Display for TaskId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

impl From<i64> for TaskId {
	fn from(id: i64) -> Self {
		Self(id)
	}
}

/// Single-use handle to an audio file awaiting transcription.
///
/// The handle owns its backing temp file exclusively. `release` consumes the
/// handle and deletes the file; since it takes `self`, a double release does
/// not compile. Dropping an unreleased handle also deletes the file, so every
/// exit path cleans up exactly once.
#[derive(Debug)]
pub struct AudioHandle {
	file: NamedTempFile,
}

impl AudioHandle {
	/// Spool uploaded bytes into a fresh temp file, keeping the upload's
	/// extension so format sniffing downstream still works.
	pub fn from_bytes(data: &[u8], extension: &str) -> std::io::Result<Self> {
		let suffix = if extension.is_empty() {
			String::new()
		} else {
			format!(".{}", extension.trim_start_matches('.'))
		};
		let mut file = Builder::new().prefix("stt-upload-").suffix(&suffix).tempfile()?;
		file.write_all(data)?;
		file.flush()?;
		Ok(Self { file })
	}

	#[must_use]
	pub fn from_temp_file(file: NamedTempFile) -> Self {
		Self { file }
	}

	#[must_use]
	pub fn path(&self) -> &Path {
		self.file.path()
	}

	/// Consume the handle and delete the backing file.
	pub fn release(self) {
		let path = self.file.path().to_path_buf();
		debug!(path = %path.display(), "releasing audio file");
		if let Err(e) = self.file.close() {
			debug!(path = %path.display(), error = %e, "audio file was already gone at release");
		}
	}
}

/// One submitted unit of work: an audio resource plus the requested model
/// name and the caller-supplied id. Processed at most once.
#[derive(Debug)]
pub struct Task {
	pub id: TaskId,
	pub model_name: String,
	pub audio: AudioHandle,
	submitted_at: Instant,
}

impl Task {
	#[must_use]
	pub fn new(id: TaskId, model_name: impl Into<String>, audio: AudioHandle) -> Self {
		Self {
			id,
			model_name: model_name.into(),
			audio,
			submitted_at: Instant::now(),
		}
	}

	/// How long this task has been waiting since submission.
	#[must_use]
	pub fn queue_latency(&self) -> Duration {
		self.submitted_at.elapsed()
	}

	/// Split the task into its id, model name, and audio resource.
	#[must_use]
	pub fn into_parts(self) -> (TaskId, String, AudioHandle) {
		(self.id, self.model_name, self.audio)
	}
}

/// Tagged result of processing one task, always carrying the originating id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
	Success { task_id: TaskId, transcript: String },
	Failure { task_id: TaskId, reason: String },
}

impl Outcome {
	#[must_use]
	pub const fn task_id(&self) -> TaskId {
		match self {
			Self::Success { task_id, .. } | Self::Failure { task_id, .. } => *task_id,
		}
	}

	#[must_use]
	pub const fn is_success(&self) -> bool {
		matches!(self, Self::Success { .. })
	}
}
