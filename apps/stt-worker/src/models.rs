use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::error::TaskError;
use crate::observability::MODEL_LOAD_SECONDS;

/// File every installed model directory must contain.
pub const MODEL_FILE_NAME: &str = "model.bin";

/// One installed model found at startup.
///
/// The path is captured by value per entry at scan time, so later entries
/// can never alias an earlier one.
#[derive(Debug, Clone)]
pub struct ModelEntry {
	pub name: String,
	pub path: PathBuf,
}

/// Immutable mapping from model name to its on-disk location.
///
/// Populated once at startup; discovery only records which names exist, it
/// never loads a model.
pub struct ModelCatalog {
	entries: HashMap<String, ModelEntry>,
}

impl ModelCatalog {
	/// Scan `models_dir` for installed models. Every subdirectory containing
	/// a `model.bin` becomes an entry named after the directory.
	///
	/// # Errors
	///
	/// Fails if the directory itself cannot be read; unreadable or malformed
	/// entries inside it are skipped with a log line.
	pub fn discover(models_dir: &Path) -> std::io::Result<Self> {
		let mut entries = HashMap::new();

		for dir_entry in std::fs::read_dir(models_dir)? {
			let dir_entry = dir_entry?;
			if !dir_entry.file_type()?.is_dir() {
				continue;
			}

			let model_path = dir_entry.path().join(MODEL_FILE_NAME);
			if !model_path.is_file() {
				debug!(path = %dir_entry.path().display(), "skipping directory without a model file");
				continue;
			}

			let name = dir_entry.file_name().to_string_lossy().into_owned();
			info!(model = %name, path = %model_path.display(), "📦 Discovered model");
			entries.insert(name.clone(), ModelEntry { name, path: model_path });
		}

		if entries.is_empty() {
			warn!(dir = %models_dir.display(), "no installed models found");
		}

		Ok(Self { entries })
	}

	#[must_use]
	pub fn get(&self, name: &str) -> Option<&ModelEntry> {
		self.entries.get(name)
	}

	/// Model names in stable (sorted) order, for registration and logs.
	#[must_use]
	pub fn names(&self) -> Vec<String> {
		let mut names: Vec<String> = self.entries.keys().cloned().collect();
		names.sort();
		names
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

/// A loaded, ready-to-run inference capability bound to one model.
pub trait SpeechModel: Send + Sync {
	/// Transcribe the audio file, yielding text segments in production order.
	///
	/// # Errors
	///
	/// Any decode or inference failure; terminal for the task only.
	fn transcribe(&self, audio: &Path) -> Result<Vec<String>, TaskError>;
}

impl std::fmt::Debug for dyn SpeechModel {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str("SpeechModel")
	}
}

/// Resolves a model name to a loaded capability.
pub trait ResolveModel: Send + Sync {
	/// # Errors
	///
	/// [`TaskError::ModelNotFound`] for names outside the catalog, or a load
	/// failure from the underlying engine.
	fn resolve(&self, name: &str) -> Result<Arc<dyn SpeechModel>, TaskError>;
}

/// Loads a catalog entry into a usable model. Boxed so tests can substitute
/// the engine.
pub type ModelLoader = Box<dyn Fn(&ModelEntry) -> Result<Arc<dyn SpeechModel>, TaskError> + Send + Sync>;

/// Lazy resolver over the startup catalog.
///
/// With the cache enabled it retains the most recently used model between
/// tasks: repeated same-model submissions skip the reload, and a different
/// name evicts the resident one so at most one model occupies the device.
/// With the cache disabled every task reloads, trading latency for memory.
pub struct ModelResolver {
	catalog: Arc<ModelCatalog>,
	loader: ModelLoader,
	cache_enabled: bool,
	cached: Mutex<Option<(String, Arc<dyn SpeechModel>)>>,
}

impl ModelResolver {
	#[must_use]
	pub fn new(catalog: Arc<ModelCatalog>, loader: ModelLoader, cache_enabled: bool) -> Self {
		Self {
			catalog,
			loader,
			cache_enabled,
			cached: Mutex::new(None),
		}
	}

	fn load_entry(&self, entry: &ModelEntry) -> Result<Arc<dyn SpeechModel>, TaskError> {
		let start = Instant::now();
		let model = (self.loader)(entry)?;
		MODEL_LOAD_SECONDS.observe(start.elapsed().as_secs_f64());
		Ok(model)
	}
}

impl ResolveModel for ModelResolver {
	fn resolve(&self, name: &str) -> Result<Arc<dyn SpeechModel>, TaskError> {
		let entry = self.catalog.get(name).ok_or(TaskError::ModelNotFound)?;

		if !self.cache_enabled {
			return self.load_entry(entry);
		}

		let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);

		if let Some((cached_name, model)) = cached.as_ref() {
			if cached_name == name {
				debug!(model = %name, "model cache hit");
				return Ok(Arc::clone(model));
			}
			debug!(evicted = %cached_name, model = %name, "evicting cached model");
		}

		// Drop the old model before loading the new one so only one occupies
		// the device at a time.
		*cached = None;
		let model = self.load_entry(entry)?;
		*cached = Some((name.to_string(), Arc::clone(&model)));

		Ok(model)
	}
}
