use hound::WavReader;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::config::DeviceAffinity;
use crate::error::TaskError;
use crate::models::{ModelEntry, SpeechModel};

/// Sample rate Whisper expects.
pub const WHISPER_SAMPLE_RATE: u32 = 16_000;

/// Whisper-backed implementation of [`SpeechModel`].
///
/// One instance holds one loaded whisper.cpp context, bound to the device
/// chosen at deployment time.
pub struct WhisperModel {
	ctx: WhisperContext,
	name: String,
	threads: i32,
	language: Option<String>,
}

impl WhisperModel {
	/// Load the model file from disk. Slow (disk + device initialization);
	/// only called lazily, never for the whole catalog at startup.
	///
	/// # Errors
	///
	/// [`TaskError::ModelLoad`] if whisper.cpp rejects the file.
	pub fn load(entry: &ModelEntry, device: DeviceAffinity, threads: i32, language: Option<String>) -> Result<Self, TaskError> {
		info!(model = %entry.name, path = %entry.path.display(), %device, "🔄 Loading Whisper model");
		let start = Instant::now();

		let path = entry
			.path
			.to_str()
			.ok_or_else(|| TaskError::ModelLoad(format!("non UTF-8 model path: {}", entry.path.display())))?;

		let mut ctx_params = WhisperContextParameters::default();
		ctx_params.use_gpu(device.use_gpu());

		let ctx = WhisperContext::new_with_params(path, ctx_params).map_err(|e| TaskError::ModelLoad(e.to_string()))?;

		info!(model = %entry.name, load_time_ms = start.elapsed().as_millis(), "✅ Whisper model loaded");

		Ok(Self {
			ctx,
			name: entry.name.clone(),
			threads,
			language,
		})
	}

	fn params(&self) -> FullParams<'_, '_> {
		let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
		params.set_translate(false);
		params.set_print_special(false);
		params.set_print_progress(false);
		params.set_print_realtime(false);
		params.set_print_timestamps(false);
		params.set_n_threads(self.threads);
		if let Some(language) = self.language.as_deref() {
			params.set_language(Some(language));
		}
		params
	}
}

impl SpeechModel for WhisperModel {
	fn transcribe(&self, audio: &Path) -> Result<Vec<String>, TaskError> {
		let samples = load_wav(audio)?;

		let mut state = self.ctx.create_state().map_err(|e| TaskError::Inference(format!("failed to create whisper state: {e}")))?;

		state.full(self.params(), &samples).map_err(|e| TaskError::Inference(e.to_string()))?;

		let num_segments = state.full_n_segments();
		if num_segments == 0 {
			warn!(model = %self.name, "no segments produced - audio may be silence");
			return Ok(Vec::new());
		}

		// Segment text is kept verbatim (including whisper's leading spaces)
		// so concatenation downstream needs no separator.
		let mut segments = Vec::new();
		for i in 0..num_segments {
			if let Some(segment) = state.get_segment(i) {
				match segment.to_str() {
					Ok(text) => segments.push(text.to_string()),
					Err(e) => warn!(segment = i, error = %e, "skipping non UTF-8 segment"),
				}
			}
		}

		Ok(segments)
	}
}

/// Decode a WAV file into mono f32 samples.
fn load_wav(path: &Path) -> Result<Vec<f32>, TaskError> {
	let mut reader = WavReader::open(path).map_err(|e| TaskError::Audio(format!("failed to open wav: {e}")))?;
	let spec = reader.spec();

	let samples: Result<Vec<f32>, hound::Error> = match (spec.sample_format, spec.bits_per_sample) {
		(hound::SampleFormat::Float, 32) => reader.samples::<f32>().collect(),
		(hound::SampleFormat::Int, 16) => reader.samples::<i16>().map(|s| s.map(|v| f32::from(v) / 32_768.0)).collect(),
		(hound::SampleFormat::Int, 32) => reader.samples::<i32>().map(|s| s.map(|v| v as f32 / 2_147_483_648.0)).collect(),
		(format, bits) => return Err(TaskError::Audio(format!("unsupported wav format: {format:?} {bits}-bit"))),
	};
	let samples = samples.map_err(|e| TaskError::Audio(format!("failed to read samples: {e}")))?;

	let samples = match spec.channels {
		1 => samples,
		2 => samples.chunks_exact(2).map(|chunk| (chunk[0] + chunk[1]) / 2.0).collect(),
		n => return Err(TaskError::Audio(format!("unsupported channel count: {n}"))),
	};

	if spec.sample_rate != WHISPER_SAMPLE_RATE {
		warn!(sample_rate = spec.sample_rate, "input is not 16 kHz, transcription quality may suffer");
	}

	Ok(samples)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn write_wav(path: &Path, channels: u16, samples: &[i16]) {
		let spec = hound::WavSpec {
			channels,
			sample_rate: WHISPER_SAMPLE_RATE,
			bits_per_sample: 16,
			sample_format: hound::SampleFormat::Int,
		};
		let mut writer = hound::WavWriter::create(path, spec).unwrap();
		for sample in samples {
			writer.write_sample(*sample).unwrap();
		}
		writer.finalize().unwrap();
	}

	#[test]
	fn test_load_wav_mono() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("mono.wav");
		write_wav(&path, 1, &[0, 16_384, -16_384, 0]);

		let samples = load_wav(&path).unwrap();
		assert_eq!(samples.len(), 4);
		assert!((samples[1] - 0.5).abs() < 1e-3);
		assert!((samples[2] + 0.5).abs() < 1e-3);
	}

	#[test]
	fn test_load_wav_downmixes_stereo() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("stereo.wav");
		// Two frames: (1000, 3000) and (-2000, -4000)
		write_wav(&path, 2, &[1000, 3000, -2000, -4000]);

		let samples = load_wav(&path).unwrap();
		assert_eq!(samples.len(), 2);
		assert!((samples[0] - 2000.0 / 32_768.0).abs() < 1e-4);
		assert!((samples[1] + 3000.0 / 32_768.0).abs() < 1e-4);
	}

	#[test]
	fn test_load_wav_rejects_garbage() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("not-audio.wav");
		std::fs::write(&path, b"definitely not a wav").unwrap();

		let err = load_wav(&path).unwrap_err();
		assert!(matches!(err, TaskError::Audio(_)));
	}
}
