use thiserror::Error;

/// Per-task failures.
///
/// Every variant is absorbed at the worker loop and converted into a failure
/// report for that task alone; none of them terminate the worker.
#[derive(Error, Debug)]
pub enum TaskError {
	/// The requested model name is not in the startup catalog. The display
	/// string is the exact reason reported back to the submitter.
	#[error("Requested model is not available")]
	ModelNotFound,

	#[error("model load failed: {0}")]
	ModelLoad(String),

	#[error("audio decode failed: {0}")]
	Audio(String),

	#[error("transcription failed: {0}")]
	Inference(String),

	#[error("audio I/O error: {0}")]
	Io(#[from] std::io::Error),
}
