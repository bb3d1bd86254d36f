use serde::{Deserialize, Serialize};

use crate::audio::AudioSource;
use crate::config::SUPPORTED_MODEL;
use crate::error::PredictError;
use crate::transcript::Segment;
use crate::vad::VadParameters;

/// Prediction request. Field names and defaults follow the public worker API.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct PredictInput {
    /// Local path or http(s) URL.
    pub audio: Option<String>,
    pub audio_base64: Option<String>,
    pub model: String,
    pub transcription: String,
    pub translate: bool,
    pub translation: String,
    pub language: Option<String>,
    pub temperature: f32,
    pub best_of: u32,
    pub beam_size: u32,
    pub patience: f32,
    pub length_penalty: Option<f32>,
    pub suppress_tokens: String,
    pub initial_prompt: Option<String>,
    pub condition_on_previous_text: bool,
    pub temperature_increment_on_fallback: Option<f32>,
    pub compression_ratio_threshold: Option<f32>,
    pub logprob_threshold: Option<f32>,
    pub no_speech_threshold: Option<f32>,
    pub enable_vad: bool,
    pub vad_parameters: Option<VadParameters>,
    pub word_timestamps: bool,
}

impl Default for PredictInput {
    fn default() -> Self {
        Self {
            audio: None,
            audio_base64: None,
            model: SUPPORTED_MODEL.to_string(),
            transcription: "plain_text".to_string(),
            translate: false,
            translation: "plain_text".to_string(),
            language: None,
            temperature: 0.0,
            best_of: 5,
            beam_size: 5,
            patience: 1.0,
            length_penalty: None,
            suppress_tokens: "-1".to_string(),
            initial_prompt: None,
            condition_on_previous_text: true,
            temperature_increment_on_fallback: Some(0.2),
            compression_ratio_threshold: Some(2.4),
            logprob_threshold: Some(-1.0),
            no_speech_threshold: Some(0.6),
            enable_vad: false,
            vad_parameters: None,
            word_timestamps: false,
        }
    }
}

impl PredictInput {
    pub fn audio_source(&self) -> Result<AudioSource, PredictError> {
        match (&self.audio, &self.audio_base64) {
            (Some(reference), None) => Ok(AudioSource::from_reference(reference)),
            (None, Some(encoded)) => Ok(AudioSource::Base64(encoded.clone())),
            (Some(_), Some(_)) => Err(PredictError::InvalidInput(
                "Provide either 'audio' or 'audio_base64', not both".to_string(),
            )),
            (None, None) => Err(PredictError::InvalidInput(
                "Missing 'audio' or 'audio_base64'".to_string(),
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentDto {
    pub id: usize,
    pub seek: u64,
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub tokens: Vec<i32>,
    pub temperature: f32,
    pub avg_logprob: f32,
    pub compression_ratio: f32,
    pub no_speech_prob: f32,
}

impl From<&Segment> for SegmentDto {
    fn from(segment: &Segment) -> Self {
        Self {
            id: segment.id,
            seek: segment.seek,
            start: segment.start,
            end: segment.end,
            text: segment.text.clone(),
            tokens: segment.tokens.clone(),
            temperature: segment.temperature,
            avg_logprob: segment.avg_logprob,
            compression_ratio: segment.compression_ratio,
            no_speech_prob: segment.no_speech_prob,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WordTimestamp {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredictOutput {
    pub segments: Vec<SegmentDto>,
    pub detected_language: String,
    pub transcription: String,
    pub translation: Option<String>,
    pub device: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub word_timestamps: Option<Vec<WordTimestamp>>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub warnings: Vec<String>,
}
