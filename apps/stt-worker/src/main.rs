mod config;
mod context;
mod error;
mod host;
mod models;
mod observability;
mod registration;
mod state;
mod transcription;
mod worker;

use anyhow::{Context as _, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use stt_queue::TaskQueue;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use config::Config;
use context::WorkerContext;
use host::{HostClient, ResultReporter};
use models::{ModelCatalog, ModelLoader, ModelResolver, ResolveModel, SpeechModel};
use observability::Heartbeat;
use state::WorkerState;
use transcription::WhisperModel;

const HEARTBEAT_POLL_INTERVAL_MS: u64 = 1000;

#[tokio::main]
async fn main() -> Result<()> {
	// Load environment variables
	dotenvy::dotenv().ok();

	// Parse CLI arguments
	let config = Config::parse();
	config.validate().map_err(|e| anyhow::anyhow!(e))?;

	observability::init_tracing(&config.service_name);

	info!(
		service = %config.service_name,
		models_dir = %config.models_dir.display(),
		device = %config.device,
		queue_capacity = config.queue_capacity,
		"🎯 Starting speech-to-text worker"
	);

	// Discover which models exist; none of them is loaded yet
	let catalog = Arc::new(ModelCatalog::discover(&config.models_dir).with_context(|| format!("failed to scan models dir {}", config.models_dir.display()))?);
	info!(models = catalog.len(), "📚 Model catalog ready");

	// Build the context that owns the queue and catalog; it replaces any
	// global registries and is all the front end needs to submit tasks.
	let state = WorkerState::new();
	let mut queue = TaskQueue::new(config.queue_capacity);
	let rx = queue.take_receiver().context("fresh queue had no receiver")?;
	let worker_context = WorkerContext::new(queue.sender(), Arc::clone(&catalog), Arc::clone(&state));
	drop(queue);

	// Host client serves both the report channel and provider registration
	let host = HostClient::new(&config.host_url, config.host_token.clone());
	if config.register_providers {
		registration::set_enabled(&host, &catalog, &config.provider_prefix, true).await?;
	}

	let loader: ModelLoader = {
		let device = config.device;
		let threads = config.whisper_threads;
		let language = config.language.clone();
		Box::new(move |entry| {
			let model = WhisperModel::load(entry, device, threads, language.clone())?;
			Ok(Arc::new(model) as Arc<dyn SpeechModel>)
		})
	};
	let resolver: Arc<dyn ResolveModel> = Arc::new(ModelResolver::new(Arc::clone(&catalog), loader, config.model_cache));
	let reporter: Arc<dyn ResultReporter> = Arc::new(host.clone());

	// Explicit worker lifecycle: started here, signalled and joined below
	let cancellation_token = CancellationToken::new();
	let worker_handle = worker::start_worker(
		rx,
		resolver,
		reporter,
		Arc::clone(&state),
		cancellation_token.clone(),
		config.drain_on_shutdown,
	);

	spawn_heartbeat(Arc::clone(&state), cancellation_token.clone(), config.heartbeat_interval_secs);

	wait_for_shutdown_signal().await;
	info!("🛑 Shutdown signal received (SIGTERM/SIGINT)");

	// Signal the worker, then drop the last sender so an idle worker wakes
	// up and a draining worker sees end-of-queue.
	cancellation_token.cancel();
	drop(worker_context);

	if let Err(e) = worker_handle.await {
		error!(error = %e, "worker thread panicked during shutdown");
	}

	if config.register_providers {
		if let Err(e) = registration::set_enabled(&host, &catalog, &config.provider_prefix, false).await {
			warn!(error = %e, "⚠️ Failed to unregister providers on shutdown");
		}
	}

	info!("✅ Worker stopped, exiting");
	Ok(())
}

fn spawn_heartbeat(state: Arc<WorkerState>, cancellation_token: CancellationToken, interval_secs: u64) {
	tokio::spawn(async move {
		let mut heartbeat = Heartbeat::new(interval_secs);
		loop {
			tokio::select! {
				() = cancellation_token.cancelled() => break,
				() = tokio::time::sleep(Duration::from_millis(HEARTBEAT_POLL_INTERVAL_MS)) => {
					heartbeat.maybe_log(&state);
				}
			}
		}
	});
}

async fn wait_for_shutdown_signal() {
	let ctrl_c = async {
		signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
	};

	#[cfg(unix)]
	let terminate = async {
		signal::unix::signal(signal::unix::SignalKind::terminate())
			.expect("failed to install SIGTERM handler")
			.recv()
			.await;
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		() = ctrl_c => {},
		() = terminate => {},
	}
}
