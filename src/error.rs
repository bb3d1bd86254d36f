use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use thiserror::Error;

/// Failures surfaced to the caller of a prediction.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("Invalid model name: {name}. Available models are: {}", available.join(", "))]
    InvalidModel {
        name: String,
        available: Vec<&'static str>,
    },

    #[error("Model not loaded. Ensure setup completed successfully.")]
    ModelNotLoaded,

    #[error("Failed to load model during setup: {0}")]
    Setup(String),

    #[error("Invalid audio: {0}")]
    Audio(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Transcription failed: {0}")]
    Inference(String),
}

impl ResponseError for PredictError {
    fn status_code(&self) -> StatusCode {
        match self {
            PredictError::InvalidModel { .. }
            | PredictError::Audio(_)
            | PredictError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            PredictError::ModelNotLoaded => StatusCode::SERVICE_UNAVAILABLE,
            PredictError::Setup(_) | PredictError::Inference(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.to_string()
        }))
    }
}
