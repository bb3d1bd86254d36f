use anyhow::{Result, anyhow};
use dotenv::dotenv;
use std::path::PathBuf;

/// The only model variant this worker serves.
pub const SUPPORTED_MODEL: &str = "large-v2";

pub const AVAILABLE_MODELS: &[&str] = &[SUPPORTED_MODEL];

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub models_dir: PathBuf,
    pub use_gpu: bool,
    pub cpu_threads: i32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
            use_gpu: true,
            cpu_threads: 4,
        }
    }
}

impl WorkerConfig {
    /// Reads `WHISPER_*` variables, loading a `.env` file first if present.
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let models_dir = lookup("WHISPER_MODELS_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.models_dir);

        let use_gpu = match lookup("WHISPER_USE_GPU") {
            Some(raw) => parse_bool(&raw)
                .ok_or_else(|| anyhow!("WHISPER_USE_GPU must be true or false, got '{raw}'"))?,
            None => defaults.use_gpu,
        };

        let cpu_threads = match lookup("WHISPER_CPU_THREADS") {
            Some(raw) => raw
                .trim()
                .parse::<i32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    anyhow!("WHISPER_CPU_THREADS must be a positive integer, got '{raw}'")
                })?,
            None => defaults.cpu_threads,
        };

        Ok(Self {
            models_dir,
            use_gpu,
            cpu_threads,
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug)]
pub struct ClientConfig {
    pub server_url: String,
    pub audio: String,
    pub transcription: String,
    pub translate: bool,
    pub word_timestamps: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = WorkerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.models_dir, PathBuf::from("models"));
        assert!(config.use_gpu);
        assert_eq!(config.cpu_threads, 4);
    }

    #[test]
    fn reads_overrides() {
        let config = WorkerConfig::from_lookup(lookup(&[
            ("WHISPER_MODELS_DIR", "/opt/models"),
            ("WHISPER_USE_GPU", "off"),
            ("WHISPER_CPU_THREADS", "8"),
        ]))
        .unwrap();
        assert_eq!(config.models_dir, PathBuf::from("/opt/models"));
        assert!(!config.use_gpu);
        assert_eq!(config.cpu_threads, 8);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(WorkerConfig::from_lookup(lookup(&[("WHISPER_USE_GPU", "maybe")])).is_err());
        assert!(WorkerConfig::from_lookup(lookup(&[("WHISPER_CPU_THREADS", "0")])).is_err());
    }
}
