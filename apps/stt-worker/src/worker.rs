use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use stt_queue::{Outcome, Task};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::TaskError;
use crate::host::ResultReporter;
use crate::models::ResolveModel;
use crate::observability::{QUEUE_WAIT_SECONDS, REPORTS_FAILED, TASKS_COMPLETED, TASKS_FAILED, TRANSCRIBE_SECONDS, WORKER_BUSY};
use crate::state::WorkerState;

/// Start the single blocking worker thread.
///
/// Exactly one worker consumes the queue; that is what keeps the inference
/// device exclusively owned without a lock. The worker runs for the process
/// lifetime and exits only when the cancellation token fires or every sender
/// is gone.
pub fn start_worker(
	rx: mpsc::Receiver<Task>,
	resolver: Arc<dyn ResolveModel>,
	reporter: Arc<dyn ResultReporter>,
	state: Arc<WorkerState>,
	cancellation_token: CancellationToken,
	drain_on_shutdown: bool,
) -> JoinHandle<()> {
	info!("🏭 Starting transcription worker thread");

	tokio::task::spawn_blocking(move || worker_loop(rx, &*resolver, &*reporter, &state, &cancellation_token, drain_on_shutdown))
}

/// Main worker loop - runs in blocking context.
///
/// Idle → Dequeued → Resolving → Transcribing → Reporting → Idle. Blocking
/// on the queue is the only suspension point; every per-task error is
/// absorbed into a failure report and the loop carries on with the next
/// task.
fn worker_loop(
	mut rx: mpsc::Receiver<Task>,
	resolver: &dyn ResolveModel,
	reporter: &dyn ResultReporter,
	state: &WorkerState,
	cancellation_token: &CancellationToken,
	drain_on_shutdown: bool,
) {
	let handle = tokio::runtime::Handle::current();

	info!("🔄 Worker loop started, waiting for tasks...");

	loop {
		// Blocking receive - waits for the next task. Returns None once all
		// senders are dropped and the buffer is empty, which is how shutdown
		// reaches an idle worker.
		let Some(task) = rx.blocking_recv() else {
			info!("🛑 Worker shutting down (queue senders dropped)");
			break;
		};

		if cancellation_token.is_cancelled() && !drain_on_shutdown {
			debug!(task_id = %task.id, "discarding queued task on shutdown");
			task.audio.release();
			continue;
		}

		QUEUE_WAIT_SECONDS.observe(task.queue_latency().as_secs_f64());
		state.update_queue_depth(rx.len());

		state.set_transcribing(true);
		WORKER_BUSY.set(1);

		let outcome = process_task(task, resolver);
		match &outcome {
			Outcome::Success { task_id, transcript } => {
				state.record_completed();
				TASKS_COMPLETED.inc();
				info!(task_id = %task_id, transcript_chars = transcript.len(), "✅ Task completed");
			}
			Outcome::Failure { task_id, reason } => {
				state.record_failed();
				TASKS_FAILED.inc();
				error!(task_id = %task_id, reason = %reason, "❌ Task failed");
			}
		}

		deliver(reporter, &outcome, &handle, state);

		state.set_transcribing(false);
		WORKER_BUSY.set(0);
	}

	info!("✅ Worker thread exiting");
}

/// Drive one task to an outcome.
///
/// The audio handle is released here, exactly once, whichever branch
/// produced the outcome; `transcribe_task` only ever borrows the path.
fn process_task(task: Task, resolver: &dyn ResolveModel) -> Outcome {
	let (id, model_name, audio) = task.into_parts();

	info!(task_id = %id, model = %model_name, "📥 Processing task");

	let result = transcribe_task(&model_name, audio.path(), resolver);
	audio.release();

	match result {
		Ok(transcript) => Outcome::Success { task_id: id, transcript },
		Err(e) => Outcome::Failure {
			task_id: id,
			reason: e.to_string(),
		},
	}
}

/// Resolve the model and run inference. An unknown model fails here before
/// the audio file is ever opened.
fn transcribe_task(model_name: &str, audio: &Path, resolver: &dyn ResolveModel) -> Result<String, TaskError> {
	let model = resolver.resolve(model_name)?;

	info!(model = %model_name, "🎬 Generating transcription");
	let start = Instant::now();

	let segments = model.transcribe(audio)?;

	let elapsed = start.elapsed();
	TRANSCRIBE_SECONDS.observe(elapsed.as_secs_f64());
	info!(model = %model_name, segments = segments.len(), elapsed_ms = elapsed.as_millis(), "🎤 Transcription generated");

	// Segments carry their own spacing; concatenate without a separator.
	Ok(segments.concat())
}

/// Report the outcome, in dequeue order, from the blocking thread.
///
/// A failed report is logged and counted; it is never retried and never
/// stalls the loop.
fn deliver(reporter: &dyn ResultReporter, outcome: &Outcome, handle: &tokio::runtime::Handle, state: &WorkerState) {
	let result = match outcome {
		Outcome::Success { task_id, transcript } => handle.block_on(reporter.report_success(*task_id, transcript)),
		Outcome::Failure { task_id, reason } => handle.block_on(reporter.report_failure(*task_id, reason)),
	};

	if let Err(e) = result {
		state.record_report_failed();
		REPORTS_FAILED.inc();
		error!(task_id = %outcome.task_id(), error = %e, "❌ Failed to report outcome to host");
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::models::SpeechModel;
	use anyhow::Result;
	use async_trait::async_trait;
	use std::path::PathBuf;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Mutex;
	use stt_queue::{AudioHandle, TaskId, TaskQueue};

	struct FixedModel {
		segments: Vec<&'static str>,
		calls: Arc<AtomicUsize>,
	}

	impl SpeechModel for FixedModel {
		fn transcribe(&self, _audio: &Path) -> Result<Vec<String>, TaskError> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			Ok(self.segments.iter().map(ToString::to_string).collect())
		}
	}

	struct BrokenModel;

	impl SpeechModel for BrokenModel {
		fn transcribe(&self, _audio: &Path) -> Result<Vec<String>, TaskError> {
			Err(TaskError::Inference("decoder exploded".to_string()))
		}
	}

	/// Resolver backed by a closure; `None` means the name is unknown.
	struct FakeResolver {
		model: Option<Arc<dyn SpeechModel>>,
		known_name: &'static str,
	}

	impl ResolveModel for FakeResolver {
		fn resolve(&self, name: &str) -> Result<Arc<dyn SpeechModel>, TaskError> {
			if name != self.known_name {
				return Err(TaskError::ModelNotFound);
			}
			self.model.as_ref().map(Arc::clone).ok_or(TaskError::ModelNotFound)
		}
	}

	/// Records every report in arrival order; optionally errors on delivery.
	struct RecordingReporter {
		reports: Mutex<Vec<(TaskId, Result<String, String>)>>,
		fail_deliveries: AtomicUsize,
	}

	impl RecordingReporter {
		fn new() -> Arc<Self> {
			Arc::new(Self {
				reports: Mutex::new(Vec::new()),
				fail_deliveries: AtomicUsize::new(0),
			})
		}

		fn failing_first(n: usize) -> Arc<Self> {
			let reporter = Self::new();
			reporter.fail_deliveries.store(n, Ordering::SeqCst);
			reporter
		}

		fn reports(&self) -> Vec<(TaskId, Result<String, String>)> {
			self.reports.lock().unwrap().clone()
		}

		fn should_fail_delivery(&self) -> bool {
			self
				.fail_deliveries
				.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
				.is_ok()
		}
	}

	#[async_trait]
	impl ResultReporter for RecordingReporter {
		async fn report_success(&self, task_id: TaskId, transcript: &str) -> Result<()> {
			self.reports.lock().unwrap().push((task_id, Ok(transcript.to_string())));
			if self.should_fail_delivery() {
				anyhow::bail!("host unreachable");
			}
			Ok(())
		}

		async fn report_failure(&self, task_id: TaskId, reason: &str) -> Result<()> {
			self.reports.lock().unwrap().push((task_id, Err(reason.to_string())));
			if self.should_fail_delivery() {
				anyhow::bail!("host unreachable");
			}
			Ok(())
		}
	}

	fn make_task(id: i64, model_name: &str) -> (Task, PathBuf) {
		let audio = AudioHandle::from_bytes(b"fake audio", "wav").unwrap();
		let path = audio.path().to_path_buf();
		(Task::new(TaskId::new(id), model_name, audio), path)
	}

	fn fixed_resolver(segments: Vec<&'static str>, calls: &Arc<AtomicUsize>) -> Arc<dyn ResolveModel> {
		Arc::new(FakeResolver {
			model: Some(Arc::new(FixedModel {
				segments,
				calls: Arc::clone(calls),
			})),
			known_name: "base",
		})
	}

	/// Submit the tasks, close the queue, and run the worker to completion.
	async fn run_worker(
		tasks: Vec<Task>,
		resolver: Arc<dyn ResolveModel>,
		reporter: Arc<RecordingReporter>,
		cancel_before_start: bool,
		drain_on_shutdown: bool,
	) -> Arc<WorkerState> {
		let mut queue = TaskQueue::new(tasks.len().max(1));
		let sender = queue.sender();
		let rx = queue.take_receiver().unwrap();
		drop(queue);

		for task in tasks {
			sender.submit(task).unwrap();
		}
		drop(sender);

		let state = WorkerState::new();
		let token = CancellationToken::new();
		if cancel_before_start {
			token.cancel();
		}

		let handle = start_worker(rx, resolver, reporter, Arc::clone(&state), token, drain_on_shutdown);
		handle.await.unwrap();
		state
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn test_unknown_model_reports_single_failure() {
		let calls = Arc::new(AtomicUsize::new(0));
		let resolver = fixed_resolver(vec![" hello"], &calls);
		let reporter = RecordingReporter::new();

		let (task, audio_path) = make_task(1, "nonexistent");
		let state = run_worker(vec![task], resolver, Arc::clone(&reporter), false, true).await;

		let reports = reporter.reports();
		assert_eq!(reports.len(), 1);
		assert_eq!(reports[0].0, TaskId::new(1));
		assert_eq!(reports[0].1, Err("Requested model is not available".to_string()));
		assert_eq!(calls.load(Ordering::SeqCst), 0, "inference path must not be touched");
		assert!(!audio_path.exists(), "audio must be released on the resolution-failure path");
		assert_eq!(state.tasks_failed.load(Ordering::Relaxed), 1);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn test_worker_survives_inference_failure() {
		let resolver: Arc<dyn ResolveModel> = Arc::new(FakeResolver {
			model: Some(Arc::new(BrokenModel)),
			known_name: "base",
		});
		let reporter = RecordingReporter::new();

		let (broken, broken_path) = make_task(1, "base");
		let (unknown, _) = make_task(2, "nonexistent");
		let state = run_worker(vec![broken, unknown], resolver, Arc::clone(&reporter), false, true).await;

		let reports = reporter.reports();
		assert_eq!(reports.len(), 2, "the worker must keep processing after a failure");
		assert_eq!(reports[0].0, TaskId::new(1));
		assert_eq!(reports[0].1, Err("transcription failed: decoder exploded".to_string()));
		assert_eq!(reports[1].0, TaskId::new(2));
		assert!(!broken_path.exists(), "audio must be released on the inference-failure path");
		assert_eq!(state.tasks_failed.load(Ordering::Relaxed), 2);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn test_transcript_concatenates_segments_without_separator() {
		let calls = Arc::new(AtomicUsize::new(0));
		let resolver = fixed_resolver(vec![" Hello", " world.", " Bye."], &calls);
		let reporter = RecordingReporter::new();

		let (task, audio_path) = make_task(7, "base");
		run_worker(vec![task], resolver, Arc::clone(&reporter), false, true).await;

		let reports = reporter.reports();
		assert_eq!(reports.len(), 1);
		assert_eq!(reports[0].1, Ok(" Hello world. Bye.".to_string()));
		assert!(!audio_path.exists(), "audio must be released on the success path");
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn test_outcomes_reported_in_arrival_order() {
		let calls = Arc::new(AtomicUsize::new(0));
		let resolver = fixed_resolver(vec![" ok"], &calls);
		let reporter = RecordingReporter::new();

		// Interleave successes and failures
		let tasks = vec![
			make_task(1, "base").0,
			make_task(2, "nonexistent").0,
			make_task(3, "base").0,
			make_task(4, "nonexistent").0,
			make_task(5, "base").0,
		];
		run_worker(tasks, resolver, Arc::clone(&reporter), false, true).await;

		let ids: Vec<i64> = reporter.reports().iter().map(|(id, _)| id.value()).collect();
		assert_eq!(ids, vec![1, 2, 3, 4, 5]);

		let successes: Vec<bool> = reporter.reports().iter().map(|(_, r)| r.is_ok()).collect();
		assert_eq!(successes, vec![true, false, true, false, true]);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn test_report_failure_does_not_stall_the_queue() {
		let calls = Arc::new(AtomicUsize::new(0));
		let resolver = fixed_resolver(vec![" ok"], &calls);
		let reporter = RecordingReporter::failing_first(1);

		let tasks = vec![make_task(1, "base").0, make_task(2, "base").0];
		let state = run_worker(tasks, resolver, Arc::clone(&reporter), false, true).await;

		assert_eq!(reporter.reports().len(), 2, "a failed report must not block the next task");
		assert_eq!(state.reports_failed.load(Ordering::Relaxed), 1);
		assert_eq!(state.tasks_completed.load(Ordering::Relaxed), 2);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn test_discard_shutdown_releases_queued_audio_unprocessed() {
		let calls = Arc::new(AtomicUsize::new(0));
		let resolver = fixed_resolver(vec![" ok"], &calls);
		let reporter = RecordingReporter::new();

		let (task_a, path_a) = make_task(1, "base");
		let (task_b, path_b) = make_task(2, "base");
		run_worker(vec![task_a, task_b], resolver, Arc::clone(&reporter), true, false).await;

		assert!(reporter.reports().is_empty(), "discarded tasks are not reported");
		assert_eq!(calls.load(Ordering::SeqCst), 0);
		assert!(!path_a.exists() && !path_b.exists(), "discarded tasks still release their audio");
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn test_drain_shutdown_processes_queued_tasks() {
		let calls = Arc::new(AtomicUsize::new(0));
		let resolver = fixed_resolver(vec![" ok"], &calls);
		let reporter = RecordingReporter::new();

		let tasks = vec![make_task(1, "base").0, make_task(2, "base").0];
		let state = run_worker(tasks, resolver, Arc::clone(&reporter), true, true).await;

		assert_eq!(reporter.reports().len(), 2, "drain mode finishes already-queued tasks");
		assert_eq!(state.tasks_completed.load(Ordering::Relaxed), 2);
	}
}
