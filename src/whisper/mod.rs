pub mod resampler;
pub mod transcriber;
