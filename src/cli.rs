use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "whisper-worker",
    about = "Whisper Worker - speech transcription and translation",
    long_about = "Serves a single whisper model (large-v2) over HTTP, or runs one-off predictions locally. Output can be plain text, formatted text, SRT or VTT.",
    after_help = "EXAMPLES:\n    # Download the model weights\n    whisper-worker fetch-model\n\n    # Start the worker\n    whisper-worker serve\n\n    # Transcribe a file locally as SRT\n    whisper-worker predict my_audio.wav --transcription srt\n\n    # Transcribe and translate through a running worker\n    whisper-worker request audio.wav --translate --server-url http://my-server:8080"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(name = "serve")]
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(long, default_value = "8080")]
        port: u16,
    },
    #[command(name = "predict")]
    Predict {
        /// Audio file path or http(s) URL.
        audio: String,

        /// JSON file with prediction options; flags below override it.
        #[arg(long)]
        options: Option<PathBuf>,

        #[arg(long, value_parser = validate_format)]
        transcription: Option<String>,

        #[arg(long)]
        translate: bool,

        #[arg(long)]
        word_timestamps: bool,
    },
    #[command(name = "request")]
    Request {
        audio: String,

        #[arg(long, default_value = "http://localhost:8080")]
        server_url: String,

        #[arg(long, default_value = "plain_text", value_parser = validate_format)]
        transcription: String,

        #[arg(long)]
        translate: bool,

        #[arg(long)]
        word_timestamps: bool,
    },
    #[command(name = "fetch-model")]
    FetchModel {
        /// Defaults to WHISPER_MODELS_DIR.
        #[arg(long)]
        models_dir: Option<PathBuf>,
    },
}

pub fn validate_format(s: &str) -> Result<String, String> {
    match s {
        "plain_text" | "formatted_text" | "srt" | "vtt" => Ok(s.to_string()),
        _ => Err("Format must be plain_text, formatted_text, srt, or vtt".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_predict_flags() {
        let cli = Cli::try_parse_from([
            "whisper-worker",
            "predict",
            "clip.wav",
            "--transcription",
            "vtt",
            "--translate",
        ])
        .unwrap();
        match cli.command {
            Commands::Predict {
                audio,
                transcription,
                translate,
                ..
            } => {
                assert_eq!(audio, "clip.wav");
                assert_eq!(transcription.as_deref(), Some("vtt"));
                assert!(translate);
            }
            _ => panic!("expected predict"),
        }
    }

    #[test]
    fn rejects_unknown_format_flag() {
        assert!(
            Cli::try_parse_from(["whisper-worker", "request", "a.wav", "--transcription", "docx"])
                .is_err()
        );
    }

    #[test]
    fn serve_defaults() {
        let cli = Cli::try_parse_from(["whisper-worker", "serve"]).unwrap();
        match cli.command {
            Commands::Serve { host, port } => {
                assert_eq!(host, "127.0.0.1");
                assert_eq!(port, 8080);
            }
            _ => panic!("expected serve"),
        }
    }
}
