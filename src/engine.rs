use std::fmt;

use crate::error::PredictError;
use crate::transcript::Segment;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Task {
    Transcribe,
    Translate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Device {
    Cuda,
    Metal,
    Cpu,
}

impl Device {
    /// Best device this build can use. Accelerated backends are compile-time features.
    pub fn detect(use_gpu: bool) -> Self {
        if !use_gpu {
            Device::Cpu
        } else if cfg!(feature = "cuda") {
            Device::Cuda
        } else if cfg!(feature = "metal") {
            Device::Metal
        } else {
            Device::Cpu
        }
    }

    pub fn is_accelerated(self) -> bool {
        self != Device::Cpu
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Device::Cuda => "cuda",
            Device::Metal => "metal",
            Device::Cpu => "cpu",
        }
    }

    pub fn compute_type(self) -> ComputeType {
        if self.is_accelerated() {
            ComputeType::Float16
        } else {
            ComputeType::Int8
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComputeType {
    Float16,
    Int8,
}

impl ComputeType {
    /// ggml weight file name for `variant` at this precision.
    pub fn weights_file(self, variant: &str) -> String {
        match self {
            ComputeType::Float16 => format!("ggml-{variant}.bin"),
            ComputeType::Int8 => format!("ggml-{variant}-q8_0.bin"),
        }
    }
}

impl fmt::Display for ComputeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeType::Float16 => f.write_str("float16"),
            ComputeType::Int8 => f.write_str("int8"),
        }
    }
}

/// Decoding parameters handed to the model for one pass over the audio.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodeOptions {
    pub task: Task,
    pub language: Option<String>,
    pub temperatures: Vec<f32>,
    pub beam_size: u32,
    pub best_of: u32,
    pub patience: f32,
    pub length_penalty: Option<f32>,
    pub suppress_tokens: Vec<i32>,
    pub initial_prompt: Option<String>,
    pub condition_on_previous_text: bool,
    pub compression_ratio_threshold: Option<f32>,
    pub log_prob_threshold: Option<f32>,
    pub no_speech_threshold: Option<f32>,
    pub word_timestamps: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            task: Task::Transcribe,
            language: None,
            temperatures: temperature_ladder(0.0, Some(0.2)),
            beam_size: 5,
            best_of: 5,
            patience: 1.0,
            length_penalty: None,
            suppress_tokens: vec![-1],
            initial_prompt: None,
            condition_on_previous_text: true,
            compression_ratio_threshold: Some(2.4),
            log_prob_threshold: Some(-1.0),
            no_speech_threshold: Some(0.6),
            word_timestamps: false,
        }
    }
}

impl DecodeOptions {
    /// Options for the translation pass: default decoding with the caller's temperatures.
    pub fn translation(temperatures: Vec<f32>) -> Self {
        Self {
            task: Task::Translate,
            temperatures,
            ..Self::default()
        }
    }
}

/// Temperatures tried in order, `start, start + inc, ...` up to 1.0 inclusive.
///
/// Without a usable increment only `start` is tried.
pub fn temperature_ladder(start: f32, increment: Option<f32>) -> Vec<f32> {
    let inc = match increment {
        Some(inc) if inc > 0.0 => inc,
        _ => return vec![start],
    };

    let mut ladder = Vec::new();
    let mut step = 0u32;
    loop {
        let value = start + inc * step as f32;
        if value > 1.0 + 1e-6 {
            break;
        }
        ladder.push(value);
        step += 1;
    }

    if ladder.is_empty() {
        ladder.push(start);
    }
    ladder
}

/// Parses a comma-separated list of token ids such as `"-1"` or `"-1,50257"`.
pub fn parse_suppress_tokens(raw: &str) -> Result<Vec<i32>, PredictError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i32>().map_err(|_| {
                PredictError::InvalidInput(format!("suppress_tokens contains non-integer '{s}'"))
            })
        })
        .collect()
}

pub struct TranscribeOutput {
    pub segments: Vec<Segment>,
    pub language: String,
}

/// A loaded speech model. Implementations must tolerate concurrent calls.
pub trait SpeechModel: Send + Sync {
    fn transcribe(
        &self,
        audio: &[f32],
        options: &DecodeOptions,
    ) -> Result<TranscribeOutput, PredictError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_steps_up_to_one() {
        let ladder = temperature_ladder(0.0, Some(0.2));
        assert_eq!(ladder.len(), 6);
        assert!((ladder[5] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn ladder_without_increment_is_single() {
        assert_eq!(temperature_ladder(0.4, None), vec![0.4]);
        assert_eq!(temperature_ladder(0.4, Some(0.0)), vec![0.4]);
    }

    #[test]
    fn ladder_above_one_keeps_start() {
        assert_eq!(temperature_ladder(1.5, Some(0.2)), vec![1.5]);
    }

    #[test]
    fn suppress_tokens_parse() {
        assert_eq!(parse_suppress_tokens("-1").unwrap(), vec![-1]);
        assert_eq!(parse_suppress_tokens("-1, 50257").unwrap(), vec![-1, 50257]);
        assert_eq!(parse_suppress_tokens("").unwrap(), Vec::<i32>::new());
        assert!(parse_suppress_tokens("-1,abc").is_err());
    }

    #[test]
    fn translation_reuses_temperatures_only() {
        let opts = DecodeOptions::translation(vec![0.3]);
        assert_eq!(opts.task, Task::Translate);
        assert_eq!(opts.temperatures, vec![0.3]);
        assert_eq!(opts.beam_size, DecodeOptions::default().beam_size);
    }

    #[test]
    fn cpu_uses_int8_weights() {
        assert_eq!(Device::detect(false), Device::Cpu);
        assert_eq!(Device::Cpu.compute_type(), ComputeType::Int8);
        assert_eq!(Device::Cuda.compute_type(), ComputeType::Float16);
        assert_eq!(
            ComputeType::Int8.weights_file("large-v2"),
            "ggml-large-v2-q8_0.bin"
        );
    }
}
