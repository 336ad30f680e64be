use clap::{Parser, ValueEnum};
use std::fmt;
use std::path::PathBuf;

/// Compute device models are bound to. A property of the deployment, not of
/// any single task.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceAffinity {
	Cpu,
	Gpu,
}

impl DeviceAffinity {
	#[must_use]
	pub const fn use_gpu(self) -> bool {
		matches!(self, Self::Gpu)
	}
}

impl fmt::Display for DeviceAffinity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Cpu => write!(f, "cpu"),
			Self::Gpu => write!(f, "gpu"),
		}
	}
}

#[derive(Parser, Debug, Clone)]
#[command(name = "stt-worker")]
#[command(about = "Background speech-to-text transcription worker", long_about = None)]
pub struct Config {
	/// Directory holding one subdirectory per installed model
	#[arg(long, env = "WHISPER_MODELS_PATH")]
	pub models_dir: PathBuf,

	/// Maximum number of queued tasks before submissions are rejected
	#[arg(long, env = "QUEUE_CAPACITY", default_value = "100")]
	pub queue_capacity: usize,

	/// Number of threads for Whisper inference
	#[arg(long, env = "WHISPER_THREADS", default_value = "2")]
	pub whisper_threads: i32,

	/// Compute device models are loaded onto
	#[arg(long, env = "WHISPER_DEVICE", value_enum, default_value_t = DeviceAffinity::Cpu)]
	pub device: DeviceAffinity,

	/// Force a transcription language instead of auto-detect
	#[arg(long, env = "WHISPER_LANGUAGE")]
	pub language: Option<String>,

	/// Keep the most recently used model loaded between tasks
	#[arg(long, env = "MODEL_CACHE", default_value_t = true, action = clap::ArgAction::Set)]
	pub model_cache: bool,

	/// Base URL of the host application that receives result reports
	#[arg(long, env = "HOST_URL", default_value = "http://localhost:8080")]
	pub host_url: String,

	/// App token sent with host API requests
	#[arg(long, env = "HOST_APP_TOKEN")]
	pub host_token: Option<String>,

	/// Identifier prefix for providers registered with the host
	#[arg(long, env = "PROVIDER_PREFIX", default_value = "stt_whisper2")]
	pub provider_prefix: String,

	/// Register discovered models with the host at startup and unregister on shutdown
	#[arg(long, env = "REGISTER_PROVIDERS")]
	pub register_providers: bool,

	/// Process already-queued tasks on shutdown instead of discarding them
	#[arg(long, env = "DRAIN_ON_SHUTDOWN", default_value_t = true, action = clap::ArgAction::Set)]
	pub drain_on_shutdown: bool,

	/// Service name used in logs
	#[arg(long, env = "SERVICE_NAME", default_value = "stt-worker")]
	pub service_name: String,

	/// Heartbeat interval in seconds
	#[arg(long, env = "HEARTBEAT_INTERVAL", default_value = "30")]
	pub heartbeat_interval_secs: u64,
}

impl Config {
	/// Validate configuration values
	///
	/// # Errors
	///
	/// Returns a human-readable message for the first invalid value found.
	pub fn validate(&self) -> Result<(), String> {
		if self.queue_capacity == 0 {
			return Err("queue_capacity must be at least 1".to_string());
		}

		if self.whisper_threads < 1 {
			return Err("whisper_threads must be at least 1".to_string());
		}

		if self.host_url.is_empty() {
			return Err("host_url must not be empty".to_string());
		}

		if self.heartbeat_interval_secs == 0 {
			return Err("heartbeat_interval_secs must be greater than 0".to_string());
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn base_config() -> Config {
		Config::parse_from(["stt-worker", "--models-dir", "/tmp/models"])
	}

	#[test]
	fn test_defaults() {
		let config = base_config();
		assert_eq!(config.queue_capacity, 100);
		assert_eq!(config.device, DeviceAffinity::Cpu);
		assert_eq!(config.provider_prefix, "stt_whisper2");
		assert!(config.model_cache);
		assert!(config.drain_on_shutdown);
		assert!(!config.register_providers);
		assert!(config.validate().is_ok());
	}

	#[test]
	fn test_validate_rejects_zero_capacity() {
		let mut config = base_config();
		config.queue_capacity = 0;
		assert!(config.validate().is_err());
	}

	#[test]
	fn test_validate_rejects_zero_threads() {
		let mut config = base_config();
		config.whisper_threads = 0;
		assert!(config.validate().is_err());
	}

	#[test]
	fn test_device_flag_parses() {
		let config = Config::parse_from(["stt-worker", "--models-dir", "/tmp/models", "--device", "gpu"]);
		assert!(config.device.use_gpu());
		assert_eq!(config.device.to_string(), "gpu");
	}

	#[test]
	fn test_drain_flag_can_be_disabled() {
		let config = Config::parse_from(["stt-worker", "--models-dir", "/tmp/models", "--drain-on-shutdown", "false"]);
		assert!(!config.drain_on_shutdown);
	}
}
