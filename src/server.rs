use std::sync::Arc;

use actix_cors::Cors;
use actix_multipart::{Field, Multipart};
use actix_web::{App, HttpResponse, HttpServer, Responder, get, middleware::Logger, post, web};
use anyhow::{Result, anyhow};
use futures_util::TryStreamExt;
use log::{debug, error, info, warn};

use crate::audio::{PcmFormat, decode_audio};
use crate::config::WorkerConfig;
use crate::dto::{PredictInput, PredictOutput};
use crate::error::PredictError;
use crate::predictor::Predictor;

pub struct AppState {
    pub predictor: Arc<Predictor>,
}

#[get("/api/v1/health")]
pub async fn health_check(data: web::Data<AppState>) -> impl Responder {
    debug!("Health check endpoint called");
    let model_loaded = data.predictor.is_ready();
    HttpResponse::Ok().json(serde_json::json!({
        "status": if model_loaded { "ok" } else { "loading" },
        "message": "Whisper worker is running",
        "model_loaded": model_loaded,
    }))
}

#[post("/api/v1/predict")]
pub async fn predict(
    data: web::Data<AppState>,
    body: web::Json<PredictInput>,
) -> Result<HttpResponse, PredictError> {
    let input = body.into_inner();
    debug!("Predict request received for model {}", input.model);

    data.predictor.validate_model(&input.model)?;
    data.predictor.ensure_ready()?;
    let bytes = input.audio_source()?.read().await?;

    let output = run_prediction(data.predictor.clone(), bytes, PcmFormat::default(), input).await?;
    Ok(HttpResponse::Ok().json(output))
}

#[post("/api/v1/transcribe")]
pub async fn transcribe_upload(
    data: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, PredictError> {
    debug!("Transcription upload received");
    data.predictor.ensure_ready()?;

    let mut audio_data: Option<Vec<u8>> = None;
    let mut pcm = PcmFormat::default();
    let mut input = PredictInput::default();

    while let Some(field) = payload
        .try_next()
        .await
        .map_err(|e| PredictError::InvalidInput(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let bytes = read_field_data(field)
            .await
            .map_err(|e| PredictError::InvalidInput(format!("Failed to read field '{name}': {e}")))?;

        match name.as_str() {
            "audio" => {
                debug!("Audio data received: {} bytes", bytes.len());
                audio_data = Some(bytes);
            }
            "options" => {
                input = serde_json::from_slice(&bytes)
                    .map_err(|e| PredictError::InvalidInput(format!("Invalid options JSON: {e}")))?;
            }
            "sample_rate" => pcm.sample_rate = parse_text_field(&name, &bytes)?,
            "channels" => pcm.channels = parse_text_field(&name, &bytes)?,
            "bit_depth" => pcm.bit_depth = parse_text_field(&name, &bytes)?,
            other => debug!("Ignoring multipart field '{other}'"),
        }
    }

    let audio_bytes = audio_data.ok_or_else(|| {
        warn!("No audio file provided in transcription upload");
        PredictError::Audio("No audio file provided".to_string())
    })?;

    data.predictor.validate_model(&input.model)?;
    let output = run_prediction(data.predictor.clone(), audio_bytes, pcm, input).await?;
    Ok(HttpResponse::Ok().json(output))
}

async fn read_field_data(mut field: Field) -> Result<Vec<u8>, actix_web::Error> {
    let mut data = Vec::new();
    while let Some(chunk) = field.try_next().await? {
        data.extend_from_slice(&chunk);
    }
    debug!("Read field data: {} bytes", data.len());
    Ok(data)
}

fn parse_text_field<T: std::str::FromStr>(name: &str, bytes: &[u8]) -> Result<T, PredictError> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|text| text.trim().parse().ok())
        .ok_or_else(|| PredictError::InvalidInput(format!("Invalid value for '{name}'")))
}

/// Decodes audio and runs the prediction on the blocking pool.
pub async fn run_prediction(
    predictor: Arc<Predictor>,
    audio_bytes: Vec<u8>,
    pcm: PcmFormat,
    input: PredictInput,
) -> Result<PredictOutput, PredictError> {
    info!(
        "Processing audio: {} bytes, transcription={}, translate={}",
        audio_bytes.len(),
        input.transcription,
        input.translate
    );

    let result = web::block(move || {
        let samples = decode_audio(&audio_bytes, pcm)?;
        predictor.predict(&samples, &input)
    })
    .await
    .map_err(|e| PredictError::Inference(format!("Worker thread failed: {e}")))?;

    match &result {
        Ok(output) => info!(
            "Prediction completed: {} segments, {} characters",
            output.segments.len(),
            output.transcription.len()
        ),
        Err(e) => error!("Prediction failed: {e}"),
    }
    result
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health_check)
        .service(predict)
        .service(transcribe_upload);
}

pub async fn run_server(host: String, port: u16, config: WorkerConfig) -> Result<()> {
    info!("Starting whisper worker");
    info!(
        "Using configuration: models_dir={:?}, use_gpu={}, cpu_threads={}",
        config.models_dir, config.use_gpu, config.cpu_threads
    );

    let predictor = Arc::new(Predictor::new());
    let setup_predictor = predictor.clone();
    web::block(move || setup_predictor.setup(&config))
        .await
        .map_err(|e| anyhow!("Setup thread failed: {e}"))??;

    let app_state = web::Data::new(AppState { predictor });

    info!("Starting HTTP server on {host}:{port}");

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .app_data(web::JsonConfig::default().limit(50 * 1024 * 1024)) // 50MB
            .app_data(
                actix_multipart::form::MultipartFormConfig::default()
                    .total_limit(100 * 1024 * 1024), // 100MB
            )
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .wrap(Logger::default())
            .configure(routes)
    })
    .bind((host.as_str(), port))?
    .run()
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::tests::ready_predictor;
    use actix_web::{http::StatusCode, test};
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use std::io::Cursor;

    fn silent_wav(seconds: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..16000 * seconds {
                writer.write_sample(0i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn state(predictor: Predictor) -> web::Data<AppState> {
        web::Data::new(AppState {
            predictor: Arc::new(predictor),
        })
    }

    #[actix_web::test]
    async fn health_reports_loading_before_setup() {
        let app = test::init_service(
            App::new()
                .app_data(state(Predictor::new()))
                .configure(routes),
        )
        .await;
        let req = test::TestRequest::get().uri("/api/v1/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["model_loaded"], false);
        assert_eq!(body["status"], "loading");
    }

    #[actix_web::test]
    async fn predict_base64_wav() {
        let (predictor, _) = ready_predictor();
        let app = test::init_service(App::new().app_data(state(predictor)).configure(routes)).await;

        let req = test::TestRequest::post()
            .uri("/api/v1/predict")
            .set_json(serde_json::json!({
                "audio_base64": STANDARD.encode(silent_wav(2)),
                "transcription": "formatted_text",
            }))
            .to_request();
        let output: PredictOutput = test::call_and_read_body_json(&app, req).await;
        assert_eq!(output.transcription, "Hola mundo");
        assert_eq!(output.segments[0].end, 2.0);
        assert_eq!(output.model, "large-v2");
    }

    #[actix_web::test]
    async fn predict_rejects_unknown_model() {
        let (predictor, model) = ready_predictor();
        let app = test::init_service(App::new().app_data(state(predictor)).configure(routes)).await;

        let req = test::TestRequest::post()
            .uri("/api/v1/predict")
            .set_json(serde_json::json!({
                "audio_base64": STANDARD.encode(silent_wav(1)),
                "model": "medium",
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("large-v2"));
        assert_eq!(model.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[actix_web::test]
    async fn predict_without_model_is_unavailable() {
        let app = test::init_service(
            App::new()
                .app_data(state(Predictor::new()))
                .configure(routes),
        )
        .await;
        let req = test::TestRequest::post()
            .uri("/api/v1/predict")
            .set_json(serde_json::json!({ "audio_base64": STANDARD.encode(silent_wav(1)) }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn unready_worker_does_not_read_audio() {
        let app = test::init_service(
            App::new()
                .app_data(state(Predictor::new()))
                .configure(routes),
        )
        .await;
        let req = test::TestRequest::post()
            .uri("/api/v1/predict")
            .set_json(serde_json::json!({ "audio_base64": "not base64!" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let req = test::TestRequest::post()
            .uri("/api/v1/predict")
            .set_json(serde_json::json!({ "audio": "/nonexistent/clip.wav" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn predict_requires_audio() {
        let (predictor, _) = ready_predictor();
        let app = test::init_service(App::new().app_data(state(predictor)).configure(routes)).await;
        let req = test::TestRequest::post()
            .uri("/api/v1/predict")
            .set_json(serde_json::json!({}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn multipart_upload_with_options() {
        let (predictor, _) = ready_predictor();
        let app = test::init_service(App::new().app_data(state(predictor)).configure(routes)).await;

        let boundary = "worker-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"audio\"; filename=\"clip.raw\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(&vec![0u8; 32000]);
        body.extend_from_slice(
            format!(
                "\r\n--{boundary}\r\nContent-Disposition: form-data; name=\"options\"\r\n\r\n\
                 {{\"transcription\": \"vtt\"}}\r\n--{boundary}--\r\n"
            )
            .as_bytes(),
        );

        let req = test::TestRequest::post()
            .uri("/api/v1/transcribe")
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            ))
            .set_payload(body)
            .to_request();
        let output: PredictOutput = test::call_and_read_body_json(&app, req).await;
        assert_eq!(
            output.transcription,
            "00:00:00.000 --> 00:00:01.000\nHola mundo\n\n"
        );
    }
}
