// Energy-based voice activity detection.
// Non-speech audio is cut before decoding; the timeline maps decoded
// timestamps back onto the original audio.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::transcript::Segment;
use crate::whisper::resampler::WHISPER_SAMPLE_RATE;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct VadParameters {
    /// RMS energy at or above which a window counts as speech.
    pub threshold: f32,
    /// Speech regions shorter than this are discarded.
    pub min_speech_duration_ms: u32,
    /// Gaps shorter than this do not split a speech region.
    pub min_silence_duration_ms: u32,
    /// Padding kept on both sides of every speech region.
    pub speech_pad_ms: u32,
    pub window_ms: u32,
}

impl Default for VadParameters {
    fn default() -> Self {
        Self {
            threshold: 0.01,
            min_speech_duration_ms: 250,
            min_silence_duration_ms: 2000,
            speech_pad_ms: 400,
            window_ms: 30,
        }
    }
}

/// Half-open range of sample indices containing speech.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpeechChunk {
    pub start: usize,
    pub end: usize,
}

pub fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

fn ms_to_samples(ms: u32) -> usize {
    (ms as usize * WHISPER_SAMPLE_RATE as usize) / 1000
}

/// Finds speech regions in 16 kHz mono audio.
pub fn detect_speech(samples: &[f32], params: &VadParameters) -> Vec<SpeechChunk> {
    let window = ms_to_samples(params.window_ms).max(1);

    let mut regions: Vec<SpeechChunk> = Vec::new();
    let mut current: Option<SpeechChunk> = None;
    for (index, frame) in samples.chunks(window).enumerate() {
        let start = index * window;
        let end = start + frame.len();
        if calculate_rms(frame) >= params.threshold {
            match current.as_mut() {
                Some(chunk) => chunk.end = end,
                None => current = Some(SpeechChunk { start, end }),
            }
        } else if let Some(chunk) = current.take() {
            regions.push(chunk);
        }
    }
    regions.extend(current);

    let min_silence = ms_to_samples(params.min_silence_duration_ms);
    let mut merged: Vec<SpeechChunk> = Vec::with_capacity(regions.len());
    for region in regions {
        match merged.last_mut() {
            Some(last) if region.start - last.end < min_silence => last.end = region.end,
            _ => merged.push(region),
        }
    }

    let min_speech = ms_to_samples(params.min_speech_duration_ms);
    let pad = ms_to_samples(params.speech_pad_ms);
    let mut chunks: Vec<SpeechChunk> = Vec::with_capacity(merged.len());
    for region in merged.into_iter().filter(|r| r.end - r.start >= min_speech) {
        let padded = SpeechChunk {
            start: region.start.saturating_sub(pad),
            end: (region.end + pad).min(samples.len()),
        };
        match chunks.last_mut() {
            Some(last) if padded.start <= last.end => last.end = padded.end,
            _ => chunks.push(padded),
        }
    }

    debug!(
        "VAD kept {} speech chunks covering {} of {} samples",
        chunks.len(),
        chunks.iter().map(|c| c.end - c.start).sum::<usize>(),
        samples.len()
    );
    chunks
}

/// Maps times in the speech-only audio back to the original audio.
#[derive(Clone, Debug, PartialEq)]
pub struct SpeechTimeline {
    // Per chunk: end offset in the filtered audio, and silence removed before it (samples).
    filtered_ends: Vec<usize>,
    silence_before: Vec<usize>,
}

impl SpeechTimeline {
    pub fn new(chunks: &[SpeechChunk]) -> Self {
        let mut filtered_ends = Vec::with_capacity(chunks.len());
        let mut silence_before = Vec::with_capacity(chunks.len());
        let mut filtered = 0usize;
        for chunk in chunks {
            silence_before.push(chunk.start - filtered);
            filtered += chunk.end - chunk.start;
            filtered_ends.push(filtered);
        }
        Self {
            filtered_ends,
            silence_before,
        }
    }

    /// `is_end` keeps a time on a chunk boundary inside the chunk it closes.
    pub fn original_time(&self, seconds: f64, is_end: bool) -> f64 {
        if self.filtered_ends.is_empty() {
            return seconds;
        }
        let sample = (seconds * WHISPER_SAMPLE_RATE as f64).round().max(0.0) as usize;
        let index = self
            .filtered_ends
            .iter()
            .position(|&end| if is_end { sample <= end } else { sample < end })
            .unwrap_or(self.filtered_ends.len() - 1);
        seconds + self.silence_before[index] as f64 / WHISPER_SAMPLE_RATE as f64
    }

    pub fn restore(&self, segments: &mut [Segment]) {
        for segment in segments {
            segment.start = self.original_time(segment.start, false);
            segment.end = self.original_time(segment.end, true);
            if let Some(words) = segment.words.as_mut() {
                for word in words {
                    word.start = self.original_time(word.start, false);
                    word.end = self.original_time(word.end, true);
                }
            }
        }
    }
}

/// Speech-only audio and the timeline needed to undo the cut.
pub fn filter_speech(samples: &[f32], params: &VadParameters) -> (Vec<f32>, SpeechTimeline) {
    let chunks = detect_speech(samples, params);
    let mut speech = Vec::with_capacity(chunks.iter().map(|c| c.end - c.start).sum());
    for chunk in &chunks {
        speech.extend_from_slice(&samples[chunk.start..chunk.end]);
    }
    (speech, SpeechTimeline::new(&chunks))
}
