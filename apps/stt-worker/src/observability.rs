use lazy_static::lazy_static;
use prometheus::{register_histogram, register_int_counter, register_int_gauge, Encoder, Histogram, IntCounter, IntGauge, TextEncoder};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::state::WorkerState;

lazy_static! {
	pub static ref TASKS_ACCEPTED: IntCounter =
		register_int_counter!("stt_tasks_accepted_total", "Tasks accepted into the queue").expect("Failed to register TASKS_ACCEPTED");
	pub static ref TASKS_REJECTED: IntCounter =
		register_int_counter!("stt_tasks_rejected_total", "Tasks rejected because the queue was full").expect("Failed to register TASKS_REJECTED");
	pub static ref TASKS_COMPLETED: IntCounter =
		register_int_counter!("stt_tasks_completed_total", "Tasks that produced a transcript").expect("Failed to register TASKS_COMPLETED");
	pub static ref TASKS_FAILED: IntCounter =
		register_int_counter!("stt_tasks_failed_total", "Tasks that ended in a failure report").expect("Failed to register TASKS_FAILED");
	pub static ref REPORTS_FAILED: IntCounter =
		register_int_counter!("stt_reports_failed_total", "Outcome reports the host did not accept").expect("Failed to register REPORTS_FAILED");
	pub static ref QUEUE_DEPTH: IntGauge = register_int_gauge!("stt_queue_depth", "Tasks currently waiting in the queue").expect("Failed to register QUEUE_DEPTH");
	pub static ref WORKER_BUSY: IntGauge = register_int_gauge!("stt_worker_busy", "1 while the worker is transcribing").expect("Failed to register WORKER_BUSY");
	pub static ref QUEUE_WAIT_SECONDS: Histogram =
		register_histogram!("stt_queue_wait_seconds", "Time a task spent queued before the worker took it").expect("Failed to register QUEUE_WAIT_SECONDS");
	pub static ref MODEL_LOAD_SECONDS: Histogram =
		register_histogram!("stt_model_load_seconds", "Time to load a model from disk").expect("Failed to register MODEL_LOAD_SECONDS");
	pub static ref TRANSCRIBE_SECONDS: Histogram =
		register_histogram!("stt_transcribe_seconds", "Time to transcribe one task").expect("Failed to register TRANSCRIBE_SECONDS");
}

/// Initialize tracing with env-filter and fmt output.
pub fn init_tracing(service_name: &str) {
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,stt_worker=debug,stt_queue=debug"));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer().with_target(true))
		.init();

	info!(service = service_name, "✅ Tracing initialized");
}

/// Render every registered metric in Prometheus text format.
///
/// The front end exposes this on its scrape endpoint; the worker itself does
/// not serve HTTP.
///
/// # Errors
///
/// Fails if the gathered metrics cannot be encoded.
#[allow(dead_code)]
pub fn gather_metrics() -> anyhow::Result<String> {
	let encoder = TextEncoder::new();
	let metric_families = prometheus::gather();
	let mut buffer = Vec::new();

	encoder.encode(&metric_families, &mut buffer)?;
	Ok(String::from_utf8(buffer)?)
}

/// Heartbeat logger - call this periodically to track service health
pub struct Heartbeat {
	last_heartbeat: Instant,
	interval: Duration,
}

impl Heartbeat {
	#[must_use]
	pub fn new(interval_secs: u64) -> Self {
		Self {
			last_heartbeat: Instant::now(),
			interval: Duration::from_secs(interval_secs),
		}
	}

	/// Check if it's time for a heartbeat and log stats if so
	pub fn maybe_log(&mut self, state: &WorkerState) -> bool {
		if self.last_heartbeat.elapsed() >= self.interval {
			info!(
				tasks_accepted = state.tasks_accepted.load(Ordering::Relaxed),
				tasks_rejected = state.tasks_rejected.load(Ordering::Relaxed),
				tasks_completed = state.tasks_completed.load(Ordering::Relaxed),
				tasks_failed = state.tasks_failed.load(Ordering::Relaxed),
				queue_depth = state.queue_depth.load(Ordering::Relaxed),
				transcribing = state.is_transcribing(),
				"💓 Heartbeat"
			);
			self.last_heartbeat = Instant::now();
			true
		} else {
			false
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_heartbeat_timing() {
		let state = WorkerState::new();
		let mut heartbeat = Heartbeat::new(1);
		assert!(!heartbeat.maybe_log(&state));
		std::thread::sleep(Duration::from_secs(1));
		assert!(heartbeat.maybe_log(&state));
	}

	#[test]
	fn test_gather_metrics_contains_registered_names() {
		TASKS_ACCEPTED.inc();
		let rendered = gather_metrics().unwrap();
		assert!(rendered.contains("stt_tasks_accepted_total"));
	}
}
