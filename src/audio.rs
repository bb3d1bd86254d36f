use std::io::Cursor;
use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::{debug, error, info};

use crate::error::PredictError;
use crate::whisper::resampler::{WHISPER_SAMPLE_RATE, resample_to_16khz};

/// Where the audio for a request comes from.
#[derive(Clone, Debug, PartialEq)]
pub enum AudioSource {
    Path(PathBuf),
    Url(String),
    Base64(String),
}

impl AudioSource {
    /// `http(s)://` references are fetched, anything else is treated as a local path.
    pub fn from_reference(reference: &str) -> Self {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            AudioSource::Url(reference.to_string())
        } else {
            AudioSource::Path(PathBuf::from(reference))
        }
    }

    pub async fn read(self) -> Result<Vec<u8>, PredictError> {
        match self {
            AudioSource::Path(path) => tokio::fs::read(&path).await.map_err(|e| {
                PredictError::Audio(format!("Failed to read {}: {e}", path.display()))
            }),
            AudioSource::Url(url) => download(&url).await,
            AudioSource::Base64(encoded) => STANDARD
                .decode(encoded.trim())
                .map_err(|e| PredictError::Audio(format!("Invalid base64 audio: {e}"))),
        }
    }
}

async fn download(url: &str) -> Result<Vec<u8>, PredictError> {
    info!("Downloading audio from {url}");
    let response = reqwest::get(url)
        .await
        .map_err(|e| PredictError::Audio(format!("Failed to fetch {url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(PredictError::Audio(format!(
            "Failed to fetch {url}: server returned {status}"
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| PredictError::Audio(format!("Failed to read body of {url}: {e}")))?;
    debug!("Downloaded {} bytes of audio", bytes.len());
    Ok(bytes.to_vec())
}

/// Layout of headerless PCM uploads.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: usize,
    pub bit_depth: u8,
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self {
            sample_rate: WHISPER_SAMPLE_RATE,
            channels: 1,
            bit_depth: 16,
        }
    }
}

/// Decodes WAV or raw PCM bytes into 16 kHz mono samples.
///
/// Bytes with a RIFF header are read as WAV; anything else is raw
/// little-endian PCM laid out as `pcm` describes.
pub fn decode_audio(bytes: &[u8], pcm: PcmFormat) -> Result<Vec<f32>, PredictError> {
    let (samples, sample_rate, channels) = if bytes.starts_with(b"RIFF") {
        decode_wav(bytes)?
    } else {
        let samples = convert_audio_bytes_to_samples(bytes, pcm.bit_depth)?;
        (samples, pcm.sample_rate, pcm.channels)
    };

    if samples.is_empty() {
        return Err(PredictError::Audio("No audio data provided".to_string()));
    }
    if channels == 0 {
        return Err(PredictError::Audio("Channel count must be positive".to_string()));
    }

    info!(
        "Decoded audio: {} samples, {}Hz, {} channels",
        samples.len(),
        sample_rate,
        channels
    );

    let mono = downmix_to_mono(&samples, channels);
    resample_to_16khz(&mono, sample_rate)
        .map_err(|e| PredictError::Audio(format!("Failed to resample audio: {e}")))
}

fn decode_wav(bytes: &[u8]) -> Result<(Vec<f32>, u32, usize), PredictError> {
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| PredictError::Audio(format!("Invalid WAV data: {e}")))?;
    let spec = reader.spec();
    debug!(
        "WAV spec: {}Hz, {} channels, {} bit {:?}",
        spec.sample_rate, spec.channels, spec.bits_per_sample, spec.sample_format
    );

    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>(),
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<Vec<_>, _>>()
        }
    }
    .map_err(|e| PredictError::Audio(format!("Failed to read WAV samples: {e}")))?;

    Ok((samples, spec.sample_rate, spec.channels as usize))
}

pub fn convert_audio_bytes_to_samples(
    audio_bytes: &[u8],
    bit_depth: u8,
) -> Result<Vec<f32>, PredictError> {
    debug!(
        "Converting {} bytes of {}-bit audio to samples",
        audio_bytes.len(),
        bit_depth
    );

    let width = match bit_depth {
        16 => 2,
        24 => 3,
        32 => 4,
        _ => {
            error!("Unsupported bit depth: {bit_depth}");
            return Err(PredictError::Audio(format!(
                "Unsupported bit depth: {bit_depth}"
            )));
        }
    };

    if audio_bytes.len() % width != 0 {
        error!(
            "Invalid {}-bit audio data: byte count ({}) not divisible by {}",
            bit_depth,
            audio_bytes.len(),
            width
        );
        return Err(PredictError::Audio(format!(
            "Invalid {bit_depth}-bit audio data: byte count not divisible by {width}"
        )));
    }

    let samples = audio_bytes
        .chunks_exact(width)
        .map(|chunk| match width {
            2 => i16::from_le_bytes([chunk[0], chunk[1]]) as f32 / i16::MAX as f32,
            3 => (i32::from_le_bytes([0, chunk[0], chunk[1], chunk[2]]) >> 8) as f32 / 8388607.0,
            _ => i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as f32
                / i32::MAX as f32,
        })
        .collect::<Vec<f32>>();

    debug!("Converted {bit_depth}-bit audio to {} samples", samples.len());
    Ok(samples)
}

/// Averages interleaved frames into a single channel.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_kind_by_scheme() {
        assert_eq!(
            AudioSource::from_reference("https://example.com/a.wav"),
            AudioSource::Url("https://example.com/a.wav".to_string())
        );
        assert_eq!(
            AudioSource::from_reference("/tmp/a.wav"),
            AudioSource::Path(PathBuf::from("/tmp/a.wav"))
        );
    }

    #[test]
    fn converts_16_bit_pcm() {
        let bytes = [0x00, 0x00, 0xff, 0x7f, 0x01, 0x80];
        let samples = convert_audio_bytes_to_samples(&bytes, 16).unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0], 0.0);
        assert!((samples[1] - 1.0).abs() < 1e-6);
        assert!((samples[2] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn converts_24_bit_sign() {
        let bytes = [0xff, 0xff, 0xff, 0xff, 0xff, 0x7f];
        let samples = convert_audio_bytes_to_samples(&bytes, 24).unwrap();
        assert!(samples[0] < 0.0 && samples[0] > -1e-6);
        assert!((samples[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn rejects_misaligned_and_unknown_depths() {
        assert!(convert_audio_bytes_to_samples(&[0, 0, 0], 16).is_err());
        assert!(convert_audio_bytes_to_samples(&[0, 0], 8).is_err());
    }

    #[test]
    fn downmix_averages_frames() {
        assert_eq!(downmix_to_mono(&[1.0, 0.0, 0.5, 0.5], 2), vec![0.5, 0.5]);
        assert_eq!(downmix_to_mono(&[0.25], 1), vec![0.25]);
    }

    #[test]
    fn decodes_wav_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..1600 {
            writer.write_sample(i16::MAX / 2).unwrap();
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let samples = decode_audio(&bytes, PcmFormat::default()).unwrap();
        assert_eq!(samples.len(), 1600);
        assert!((samples[0] - 0.25).abs() < 1e-3);
    }

    #[test]
    fn empty_audio_is_rejected() {
        let err = decode_audio(&[], PcmFormat::default()).unwrap_err();
        assert!(matches!(err, PredictError::Audio(_)));
    }

    #[test]
    fn base64_source_decodes() {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let bytes = rt
            .block_on(AudioSource::Base64(STANDARD.encode([1u8, 2, 3])).read())
            .unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }
}
