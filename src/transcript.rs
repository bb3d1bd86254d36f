use std::io::Write;

use flate2::Compression;
use flate2::write::ZlibEncoder;

#[derive(Clone, Debug, PartialEq)]
pub struct Word {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

/// A time-bounded span of recognized speech. Offsets are in seconds.
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    pub id: usize,
    /// Decoder position of the segment, in 10 ms frames.
    pub seek: u64,
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub tokens: Vec<i32>,
    pub temperature: f32,
    pub avg_logprob: f32,
    pub compression_ratio: f32,
    pub no_speech_prob: f32,
    pub words: Option<Vec<Word>>,
}

#[cfg(test)]
impl Segment {
    /// Segment with only timing and text set; decoder metrics are zeroed.
    pub fn new(id: usize, start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            id,
            seek: (start.max(0.0) * 100.0).round() as u64,
            start,
            end,
            text: text.into(),
            tokens: Vec::new(),
            temperature: 0.0,
            avg_logprob: 0.0,
            compression_ratio: 0.0,
            no_speech_prob: 0.0,
            words: None,
        }
    }
}

/// Raw text length divided by its zlib-compressed length.
/// Highly repetitive decoder output compresses well and scores high.
pub fn compression_ratio(text: &str) -> f32 {
    let bytes = text.as_bytes();
    if bytes.is_empty() {
        return 0.0;
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    let compressed = encoder
        .write_all(bytes)
        .and_then(|_| encoder.finish())
        .map(|out| out.len())
        .unwrap_or(bytes.len());

    bytes.len() as f32 / compressed.max(1) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repetitive_text_compresses_better() {
        let varied = compression_ratio("The quick brown fox jumps over the lazy dog.");
        let looped = compression_ratio(&"thank you ".repeat(40));
        assert!(looped > 2.4, "looped ratio was {looped}");
        assert!(varied < looped);
    }

    #[test]
    fn empty_text_has_zero_ratio() {
        assert_eq!(compression_ratio(""), 0.0);
    }
}
