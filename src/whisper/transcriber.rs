use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, WhisperState};

use crate::config::{SUPPORTED_MODEL, WorkerConfig};
use crate::engine::{ComputeType, DecodeOptions, Device, SpeechModel, Task, TranscribeOutput};
use crate::error::PredictError;
use crate::transcript::{Segment, Word, compression_ratio};

/// whisper.cpp timestamps are in centiseconds.
const TICKS_PER_SECOND: f64 = 100.0;

/// whisper.cpp model shared by all requests.
///
/// Every call decodes on its own `WhisperState`, so concurrent requests
/// share only the immutable weights.
pub struct WhisperModel {
    ctx: WhisperContext,
    threads: i32,
}

impl WhisperModel {
    pub fn load(config: &WorkerConfig, device: Device) -> Result<Self, PredictError> {
        let path = resolve_weights(&config.models_dir, device.compute_type())?;
        info!(
            "Loading {} from {} on {} ({})",
            SUPPORTED_MODEL,
            path.display(),
            device,
            device.compute_type()
        );

        let path_str = path
            .to_str()
            .ok_or_else(|| PredictError::Setup(format!("Invalid model path: {}", path.display())))?;

        let mut ctx_params = WhisperContextParameters::default();
        ctx_params.use_gpu(device.is_accelerated());

        let ctx = WhisperContext::new_with_params(path_str, ctx_params)
            .map_err(|e| PredictError::Setup(format!("Failed to load model: {e}")))?;

        Ok(Self {
            ctx,
            threads: config.cpu_threads,
        })
    }

    fn build_params<'a>(&self, options: &'a DecodeOptions) -> FullParams<'a, 'a> {
        let mut params = FullParams::new(sampling_strategy(options));
        params.set_n_threads(self.threads);
        params.set_translate(options.task == Task::Translate);
        params.set_language(Some(options.language.as_deref().unwrap_or("auto")));
        params.set_no_context(!options.condition_on_previous_text);
        params.set_token_timestamps(options.word_timestamps);
        params.set_suppress_blank(true);
        params.set_suppress_nst(suppress_non_speech(&options.suppress_tokens));
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        let (temperature, increment) = temperature_schedule(&options.temperatures);
        params.set_temperature(temperature);
        params.set_temperature_inc(increment);

        if let Some(prompt) = options.initial_prompt.as_deref() {
            params.set_initial_prompt(prompt);
        }
        if let Some(penalty) = options.length_penalty {
            params.set_length_penalty(penalty);
        }

        let thresholds = DecodeThresholds::from_options(options);
        params.set_entropy_thold(thresholds.entropy);
        params.set_logprob_thold(thresholds.logprob);
        params.set_no_speech_thold(thresholds.no_speech);

        if options.suppress_tokens.iter().any(|&t| t != -1) {
            warn!(
                "Explicit suppress_tokens {:?} are not supported by the whisper.cpp backend; using its built-in set",
                options.suppress_tokens
            );
        }

        params
    }

    fn read_segment(
        &self,
        state: &WhisperState,
        index: i32,
        options: &DecodeOptions,
    ) -> Result<Segment, PredictError> {
        let text = state.full_get_segment_text_lossy(index).map_err(inference)?;
        let t0 = state.full_get_segment_t0(index).map_err(inference)?;
        let t1 = state.full_get_segment_t1(index).map_err(inference)?;
        let n_tokens = state.full_n_tokens(index).map_err(inference)?;
        let eot = self.ctx.token_eot();

        let mut tokens = Vec::with_capacity(n_tokens as usize);
        let mut sum_logprob = 0.0_f32;
        let mut words: Vec<Word> = Vec::new();

        for token_index in 0..n_tokens {
            let data = state
                .full_get_token_data(index, token_index)
                .map_err(inference)?;
            // Special and timestamp tokens sort after end-of-text.
            if data.id >= eot {
                continue;
            }
            tokens.push(data.id);
            sum_logprob += data.plog;

            if options.word_timestamps {
                let piece = state
                    .full_get_token_text_lossy(index, token_index)
                    .map_err(inference)?;
                let start = data.t0 as f64 / TICKS_PER_SECOND;
                let end = data.t1 as f64 / TICKS_PER_SECOND;
                match words.last_mut() {
                    Some(word) if !piece.starts_with(' ') => {
                        word.word.push_str(&piece);
                        word.end = end;
                    }
                    _ => words.push(Word {
                        word: piece,
                        start,
                        end,
                    }),
                }
            }
        }

        let avg_logprob = if tokens.is_empty() {
            0.0
        } else {
            sum_logprob / tokens.len() as f32
        };

        Ok(Segment {
            id: index as usize,
            seek: t0.max(0) as u64,
            start: t0 as f64 / TICKS_PER_SECOND,
            end: t1 as f64 / TICKS_PER_SECOND,
            compression_ratio: compression_ratio(&text),
            text,
            tokens,
            // whisper.cpp does not report which fallback temperature a segment used.
            temperature: options.temperatures.first().copied().unwrap_or(0.0),
            avg_logprob,
            no_speech_prob: 0.0,
            words: options.word_timestamps.then_some(words),
        })
    }
}

impl SpeechModel for WhisperModel {
    fn transcribe(
        &self,
        audio: &[f32],
        options: &DecodeOptions,
    ) -> Result<TranscribeOutput, PredictError> {
        let params = self.build_params(options);

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| PredictError::Inference(format!("Failed to create whisper state: {e}")))?;

        debug!("Running {:?} over {} samples", options.task, audio.len());
        state.full(params, audio).map_err(inference)?;

        let language = state
            .full_lang_id_from_state()
            .ok()
            .and_then(whisper_rs::get_lang_str)
            .map(str::to_string)
            .or_else(|| options.language.clone())
            .unwrap_or_else(|| "unknown".to_string());

        let num_segments = state.full_n_segments().map_err(inference)?;
        let segments = (0..num_segments)
            .map(|i| self.read_segment(&state, i, options))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TranscribeOutput { segments, language })
    }
}

fn sampling_strategy(options: &DecodeOptions) -> SamplingStrategy {
    if options.beam_size > 1 {
        SamplingStrategy::BeamSearch {
            beam_size: options.beam_size as i32,
            patience: options.patience,
        }
    } else {
        SamplingStrategy::Greedy {
            best_of: options.best_of.max(1) as i32,
        }
    }
}

/// Starting temperature and fallback step for whisper.cpp.
fn temperature_schedule(temperatures: &[f32]) -> (f32, f32) {
    let first = temperatures.first().copied().unwrap_or(0.0);
    let increment = match temperatures.get(1) {
        Some(next) => next - first,
        None => 0.0,
    };
    (first, increment)
}

/// `-1` selects whisper.cpp's built-in non-speech token suppression.
fn suppress_non_speech(suppress_tokens: &[i32]) -> bool {
    suppress_tokens.contains(&-1)
}

/// Fallback thresholds as whisper.cpp reads them.
#[derive(Clone, Copy, Debug, PartialEq)]
struct DecodeThresholds {
    entropy: f32,
    logprob: f32,
    no_speech: f32,
}

impl DecodeThresholds {
    // Disabled thresholds are set to values the decoder can never cross.
    fn from_options(options: &DecodeOptions) -> Self {
        Self {
            entropy: options.compression_ratio_threshold.unwrap_or(0.0),
            logprob: options.log_prob_threshold.unwrap_or(f32::NEG_INFINITY),
            no_speech: options.no_speech_threshold.unwrap_or(1.0),
        }
    }
}

fn inference(e: whisper_rs::WhisperError) -> PredictError {
    PredictError::Inference(e.to_string())
}

/// Weight file for `compute`. Int8 falls back to the float16 file when only that one exists.
fn resolve_weights(models_dir: &Path, compute: ComputeType) -> Result<PathBuf, PredictError> {
    let preferred = models_dir.join(compute.weights_file(SUPPORTED_MODEL));
    if preferred.exists() {
        return Ok(preferred);
    }

    if compute == ComputeType::Int8 {
        let fallback = models_dir.join(ComputeType::Float16.weights_file(SUPPORTED_MODEL));
        if fallback.exists() {
            warn!(
                "{} not found, falling back to {}",
                preferred.display(),
                fallback.display()
            );
            return Ok(fallback);
        }
    }

    Err(PredictError::Setup(format!(
        "Model weights not found at {}. Run `whisper-worker fetch-model` first.",
        preferred.display()
    )))
}
