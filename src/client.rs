use anyhow::{Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use std::path::Path;

use crate::config::ClientConfig;
use crate::dto::PredictInput;

/// Builds the request body. Local files are inlined as base64 so the worker
/// does not need access to the caller's filesystem.
pub async fn build_input(config: &ClientConfig) -> Result<PredictInput> {
    let mut input = PredictInput {
        transcription: config.transcription.clone(),
        translate: config.translate,
        word_timestamps: config.word_timestamps,
        ..PredictInput::default()
    };

    if config.audio.starts_with("http://") || config.audio.starts_with("https://") {
        input.audio = Some(config.audio.clone());
        return Ok(input);
    }

    if !Path::new(&config.audio).exists() {
        return Err(anyhow!("Audio file not found: {}", config.audio));
    }
    let bytes = tokio::fs::read(&config.audio)
        .await
        .map_err(|e| anyhow!("Failed to read audio file: {}", e))?;
    println!("📁 Audio source: file: {} ({} bytes)", config.audio, bytes.len());

    input.audio_base64 = Some(STANDARD.encode(bytes));
    Ok(input)
}

pub async fn send_predict_request(config: &ClientConfig) -> Result<Value> {
    let client = reqwest::Client::new();
    let input = build_input(config).await?;

    println!(
        "🚀 Sending predict request to: {}/api/v1/predict",
        config.server_url
    );
    println!(
        "   Transcription: {}, Translate: {}",
        config.transcription, config.translate
    );

    let response = client
        .post(format!("{}/api/v1/predict", config.server_url))
        .json(&input)
        .send()
        .await
        .map_err(|e| anyhow!("Failed to send request: {}", e))?;

    let status = response.status();
    let response_text = response
        .text()
        .await
        .map_err(|e| anyhow!("Failed to read response: {}", e))?;

    if !status.is_success() {
        return Err(anyhow!(
            "Server returned error {}: {}",
            status,
            response_text
        ));
    }

    let json: Value = serde_json::from_str(&response_text)
        .map_err(|e| anyhow!("Failed to parse JSON response: {}", e))?;

    Ok(json)
}

pub async fn check_server_health(server_url: &str) -> Result<()> {
    let client = reqwest::Client::new();

    println!("🔍 Checking server health at: {server_url}/api/v1/health");

    let response = client
        .get(format!("{server_url}/api/v1/health"))
        .send()
        .await
        .map_err(|e| anyhow!("Failed to connect to server: {}", e))?;

    if !response.status().is_success() {
        return Err(anyhow!("Server health check failed: {}", response.status()));
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| anyhow!("Invalid health response: {}", e))?;
    if body["model_loaded"] != Value::Bool(true) {
        return Err(anyhow!("Server is up but the model is not loaded yet"));
    }

    println!("✅ Server is healthy");
    Ok(())
}

pub async fn run_client(config: ClientConfig) -> Result<()> {
    println!("🎵 Whisper Worker Client");
    println!("========================");

    if let Err(e) = check_server_health(&config.server_url).await {
        eprintln!("❌ {e}");
        eprintln!("💡 Make sure the worker is running: whisper-worker serve");
        return Err(e);
    }

    match send_predict_request(&config).await {
        Ok(result) => {
            println!("\n✅ Transcription completed!");
            println!("📝 Result:");
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Err(e) => {
            eprintln!("❌ Transcription failed: {e}");
            return Err(e);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(audio: &str) -> ClientConfig {
        ClientConfig {
            server_url: "http://localhost:8080".to_string(),
            audio: audio.to_string(),
            transcription: "srt".to_string(),
            translate: true,
            word_timestamps: false,
        }
    }

    #[actix_web::test]
    async fn urls_are_passed_through() {
        let input = build_input(&config("https://example.com/clip.wav")).await.unwrap();
        assert_eq!(input.audio.as_deref(), Some("https://example.com/clip.wav"));
        assert!(input.audio_base64.is_none());
        assert_eq!(input.transcription, "srt");
        assert!(input.translate);
    }

    #[actix_web::test]
    async fn local_files_are_inlined() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        std::fs::write(&path, b"RIFF").unwrap();

        let input = build_input(&config(path.to_str().unwrap())).await.unwrap();
        assert_eq!(input.audio_base64.as_deref(), Some("UklGRg=="));
        assert!(input.audio.is_none());
    }

    #[actix_web::test]
    async fn missing_file_is_an_error() {
        assert!(build_input(&config("/nonexistent/clip.wav")).await.is_err());
    }
}
