mod audio;
mod cli;
mod client;
mod config;
mod download;
mod dto;
mod engine;
mod error;
mod format;
mod predictor;
mod server;
mod transcript;
mod vad;
mod whisper;

use anyhow::{Result, anyhow};
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

use audio::{AudioSource, PcmFormat};
use cli::{Cli, Commands};
use config::{ClientConfig, WorkerConfig};
use dto::PredictInput;
use predictor::Predictor;

#[actix_web::main]
async fn main() -> Result<()> {
    env_logger::init();
    whisper_rs::install_logging_hooks();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port } => {
            let config = WorkerConfig::from_env()?;
            server::run_server(host, port, config).await
        }
        Commands::Predict {
            audio,
            options,
            transcription,
            translate,
            word_timestamps,
        } => {
            let mut input = match options {
                Some(path) => read_options(path).await?,
                None => PredictInput::default(),
            };
            if let Some(format) = transcription {
                input.transcription = format;
            }
            input.translate |= translate;
            input.word_timestamps |= word_timestamps;
            run_local_prediction(&audio, input).await
        }
        Commands::Request {
            audio,
            server_url,
            transcription,
            translate,
            word_timestamps,
        } => {
            let config = ClientConfig {
                server_url,
                audio,
                transcription,
                translate,
                word_timestamps,
            };
            client::run_client(config).await
        }
        Commands::FetchModel { models_dir } => {
            let models_dir = match models_dir {
                Some(dir) => dir,
                None => WorkerConfig::from_env()?.models_dir,
            };
            download::fetch_model(&models_dir)?;
            Ok(())
        }
    }
}

async fn read_options(path: PathBuf) -> Result<PredictInput> {
    let raw = tokio::fs::read(&path)
        .await
        .map_err(|e| anyhow!("Failed to read options file {}: {}", path.display(), e))?;
    serde_json::from_slice(&raw)
        .map_err(|e| anyhow!("Invalid options file {}: {}", path.display(), e))
}

async fn run_local_prediction(audio: &str, input: PredictInput) -> Result<()> {
    let config = WorkerConfig::from_env()?;
    let predictor = Arc::new(Predictor::new());
    predictor.validate_model(&input.model)?;

    info!("Loading model for local prediction");
    let setup_predictor = predictor.clone();
    actix_web::web::block(move || setup_predictor.setup(&config))
        .await
        .map_err(|e| anyhow!("Setup thread failed: {e}"))??;

    let bytes = AudioSource::from_reference(audio).read().await?;
    let output = server::run_prediction(predictor, bytes, PcmFormat::default(), input).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
