use anyhow::{Result, anyhow};
use rubato::{Resampler, SincFixedIn, SincInterpolationType, WindowFunction};

/// Sample rate whisper models expect.
pub const WHISPER_SAMPLE_RATE: u32 = 16000;

/// Resamples mono audio to 16 kHz, compensating for the filter delay.
pub fn resample_to_16khz(samples: &[f32], sample_rate: u32) -> Result<Vec<f32>> {
    if sample_rate == WHISPER_SAMPLE_RATE {
        return Ok(samples.to_vec());
    }
    if sample_rate == 0 {
        return Err(anyhow!("Sample rate must be positive"));
    }
    if samples.is_empty() {
        return Err(anyhow!("No audio frames to resample"));
    }

    let params = rubato::SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = WHISPER_SAMPLE_RATE as f64 / sample_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, samples.len(), 1)?;

    let input = vec![samples.to_vec()];
    let mut output = resampler.process(&input, None)?;
    let delay = resampler.output_delay();
    let expected = (samples.len() as f64 * ratio) as usize;

    let mut channel = output.swap_remove(0);
    let end = (delay + expected).min(channel.len());
    let start = delay.min(end);
    channel.truncate(end);
    channel.drain(..start);

    Ok(channel)
}
