use std::sync::{Arc, Mutex};

use log::{debug, error, info, warn};

use crate::config::{AVAILABLE_MODELS, WorkerConfig};
use crate::dto::{PredictInput, PredictOutput, SegmentDto, WordTimestamp};
use crate::engine::{DecodeOptions, Device, SpeechModel, Task, parse_suppress_tokens, temperature_ladder};
use crate::error::PredictError;
use crate::format::format_segments;
use crate::transcript::Segment;
use crate::vad::filter_speech;
use crate::whisper::transcriber::WhisperModel;

#[derive(Clone)]
struct LoadedModel {
    engine: Arc<dyn SpeechModel>,
    device: Device,
}

/// Holds the single loaded model and runs predictions against it.
pub struct Predictor {
    model: Mutex<Option<LoadedModel>>,
}

impl Default for Predictor {
    fn default() -> Self {
        Self::new()
    }
}

impl Predictor {
    pub fn new() -> Self {
        Self {
            model: Mutex::new(None),
        }
    }

    /// Loads the whisper model described by `config`. Failure must abort startup.
    pub fn setup(&self, config: &WorkerConfig) -> Result<(), PredictError> {
        self.setup_with(|| {
            let device = Device::detect(config.use_gpu);
            let engine = WhisperModel::load(config, device)?;
            Ok((Arc::new(engine) as Arc<dyn SpeechModel>, device))
        })
    }

    pub fn setup_with<F>(&self, load: F) -> Result<(), PredictError>
    where
        F: FnOnce() -> Result<(Arc<dyn SpeechModel>, Device), PredictError>,
    {
        info!("Loading {} model during setup...", AVAILABLE_MODELS.join(", "));
        self.release_model();

        match load() {
            Ok((engine, device)) => {
                let mut guard = self.model.lock().map_err(|_| lock_poisoned())?;
                *guard = Some(LoadedModel { engine, device });
                info!("Model loaded on {device} and cached");
                Ok(())
            }
            Err(e) => {
                error!("Error loading model during setup: {e}");
                self.release_model();
                Err(match e {
                    PredictError::Setup(msg) => PredictError::Setup(msg),
                    other => PredictError::Setup(other.to_string()),
                })
            }
        }
    }

    fn release_model(&self) {
        if let Ok(mut guard) = self.model.lock() {
            if guard.take().is_some() {
                debug!("Released previously loaded model");
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.model.lock().map(|guard| guard.is_some()).unwrap_or(false)
    }

    /// Fails with `ModelNotLoaded` until setup has completed.
    pub fn ensure_ready(&self) -> Result<(), PredictError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(PredictError::ModelNotLoaded)
        }
    }

    /// Rejects model names outside the supported set.
    pub fn validate_model(&self, name: &str) -> Result<(), PredictError> {
        if AVAILABLE_MODELS.contains(&name) {
            Ok(())
        } else {
            Err(PredictError::InvalidModel {
                name: name.to_string(),
                available: AVAILABLE_MODELS.to_vec(),
            })
        }
    }

    fn loaded(&self) -> Result<LoadedModel, PredictError> {
        let guard = self.model.lock().map_err(|_| lock_poisoned())?;
        guard.clone().ok_or(PredictError::ModelNotLoaded)
    }

    /// Runs transcription, and translation when requested, over 16 kHz mono `audio`.
    pub fn predict(&self, audio: &[f32], input: &PredictInput) -> Result<PredictOutput, PredictError> {
        self.validate_model(&input.model)?;
        let LoadedModel { engine, device } = self.loaded()?;
        debug!("Using cached model: {}", input.model);

        let temperatures = temperature_ladder(input.temperature, input.temperature_increment_on_fallback);
        let options = decode_options(input, temperatures.clone())?;

        let (segments, language) = if input.enable_vad {
            let params = input.vad_parameters.clone().unwrap_or_default();
            let (speech, timeline) = filter_speech(audio, &params);
            if speech.is_empty() {
                warn!("VAD found no speech; skipping transcription");
                (Vec::new(), input.language.clone().unwrap_or_else(|| "unknown".to_string()))
            } else {
                let mut output = engine.transcribe(&speech, &options)?;
                timeline.restore(&mut output.segments);
                (output.segments, output.language)
            }
        } else {
            let output = engine.transcribe(audio, &options)?;
            (output.segments, output.language)
        };

        info!(
            "Transcription finished: {} segments, language {}",
            segments.len(),
            language
        );

        let mut warnings = Vec::new();
        let transcription = format_segments(&input.transcription, &segments);
        warnings.extend(transcription.warning);

        let translation = if input.translate {
            let translated = engine.transcribe(audio, &DecodeOptions::translation(temperatures))?;
            let rendered = format_segments(&input.translation, &translated.segments);
            warnings.extend(rendered.warning);
            Some(rendered.text)
        } else {
            None
        };

        let word_timestamps = input.word_timestamps.then(|| flatten_words(&segments));

        Ok(PredictOutput {
            segments: segments.iter().map(SegmentDto::from).collect(),
            detected_language: language,
            transcription: transcription.text,
            translation,
            device: device.as_str().to_string(),
            model: input.model.clone(),
            word_timestamps,
            warnings,
        })
    }
}

fn lock_poisoned() -> PredictError {
    PredictError::Inference("Failed to acquire model lock".to_string())
}

fn decode_options(input: &PredictInput, temperatures: Vec<f32>) -> Result<DecodeOptions, PredictError> {
    Ok(DecodeOptions {
        task: Task::Transcribe,
        language: input.language.clone(),
        temperatures,
        beam_size: input.beam_size,
        best_of: input.best_of,
        patience: input.patience,
        length_penalty: input.length_penalty,
        suppress_tokens: parse_suppress_tokens(&input.suppress_tokens)?,
        initial_prompt: input.initial_prompt.clone(),
        condition_on_previous_text: input.condition_on_previous_text,
        compression_ratio_threshold: input.compression_ratio_threshold,
        log_prob_threshold: input.logprob_threshold,
        no_speech_threshold: input.no_speech_threshold,
        word_timestamps: input.word_timestamps,
    })
}

fn flatten_words(segments: &[Segment]) -> Vec<WordTimestamp> {
    segments
        .iter()
        .flat_map(|segment| segment.words.iter().flatten())
        .map(|word| WordTimestamp {
            word: word.word.clone(),
            start: word.start,
            end: word.end,
        })
        .collect()
}
