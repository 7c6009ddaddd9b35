//! HTTP handlers.

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    CONTENT_DISPOSITION, CONTENT_TYPE,
};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use audio_codec::WAV_CONTENT_TYPE;
use runtime::Dispatcher;
use tts_core::config::LanguageEntry;
use tts_core::{DefaultsConfig, Lang, SynthesisRequest};

use crate::error::ApiError;

/// State shared by all handlers.
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub defaults: DefaultsConfig,
    pub prometheus: Option<PrometheusHandle>,
    pub start_time: Instant,
}

/// `POST /tts` body. Everything but `text` is optional.
#[derive(Debug, Deserialize)]
pub struct TtsRequestBody {
    #[serde(default)]
    pub text: String,
    pub speaker: Option<String>,
    pub enhance_noise: Option<bool>,
    pub language: Option<String>,
    pub model: Option<String>,
}

impl TtsRequestBody {
    fn into_request(self, defaults: &DefaultsConfig) -> Result<SynthesisRequest, ApiError> {
        let mut request = SynthesisRequest::new(self.text)
            .with_speaker(self.speaker.unwrap_or_else(|| defaults.speaker.clone()))
            .with_enhance_noise(self.enhance_noise.unwrap_or(defaults.enhance_noise));

        if let Some(lang) = self.language.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
            request = request.with_lang(lang.parse::<Lang>()?);
        }
        if let Some(model) = self.model {
            request = request.with_model(model);
        }
        Ok(request)
    }
}

/// `POST /tts` success body.
#[derive(Debug, Serialize)]
pub struct TtsResponse {
    pub success: bool,
    pub filename: String,
    pub duration: f64,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_secs: u64,
    loaded_models: Vec<String>,
    active_jobs: usize,
}

#[derive(Serialize)]
struct VoicesResponse<'a> {
    default_language: Lang,
    languages: &'a [LanguageEntry],
}

/// Synthesize text and return the stored file name.
#[instrument(skip_all)]
pub async fn synthesize(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<TtsResponse>, ApiError> {
    let body = body.map_err(|e| ApiError::new(e.status(), e.body_text()))?;
    let parsed: TtsRequestBody = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {e}")))?;
    let request = parsed.into_request(&state.defaults)?;

    let artifact = state.dispatcher.submit(request).await?;
    Ok(Json(TtsResponse {
        success: true,
        filename: artifact.filename,
        duration: artifact.duration_secs,
    }))
}

/// CORS preflight for `/tts`.
pub async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Serve a stored audio file.
///
/// A segment that does not decode to UTF-8 cannot name a stored file, so it
/// gets the same 404 as any other unknown name.
#[instrument(skip(state, filename))]
pub async fn get_audio(
    State(state): State<Arc<AppState>>,
    filename: Result<Path<String>, PathRejection>,
) -> Result<Response, ApiError> {
    let Path(filename) = filename.map_err(|e| {
        debug!(error = %e, "Undecodable audio path");
        ApiError::not_found("Audio file not found")
    })?;
    let bytes = state.dispatcher.pipeline().store().load(&filename).await?;
    let disposition = HeaderValue::from_str(&format!("attachment; filename={filename}"))
        .map_err(|e| ApiError::internal(e.to_string()))?;

    debug!(filename = %filename, bytes = bytes.len(), "Serving audio");
    Ok((
        [
            (CONTENT_TYPE, HeaderValue::from_static(WAV_CONTENT_TYPE)),
            (CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// Health check handler.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let engine = state.dispatcher.pipeline().engine();
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.start_time.elapsed().as_secs(),
        loaded_models: engine.loaded_keys().iter().map(ToString::to_string).collect(),
        active_jobs: state.dispatcher.active_jobs(),
    })
}

/// The voice catalog.
pub async fn voices(State(state): State<Arc<AppState>>) -> Response {
    let catalog = state.dispatcher.pipeline().catalog();
    Json(VoicesResponse {
        default_language: catalog.default_language(),
        languages: &catalog.manifest().languages,
    })
    .into_response()
}

/// Metrics handler (Prometheus format).
pub async fn metrics(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let handle = state
        .prometheus
        .as_ref()
        .ok_or_else(|| ApiError::not_found("Metrics are disabled"))?;
    Ok((
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    )
        .into_response())
}

/// JSON 404 for unknown routes.
pub async fn not_found() -> ApiError {
    ApiError::not_found("Not Found")
}

/// Add CORS headers to every response.
pub async fn cors(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, GET, OPTIONS"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(json: &str) -> TtsRequestBody {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_body_defaults() {
        let request = body(r#"{"text": "Привет"}"#)
            .into_request(&DefaultsConfig::default())
            .unwrap();
        assert_eq!(request.speaker, "xenia");
        assert!(request.enhance_noise);
        assert!(request.lang.is_none());
        assert!(request.model_id.is_none());
    }

    #[test]
    fn test_body_all_fields() {
        let request = body(
            r#"{"text": "Hi", "speaker": "lj", "enhance_noise": false, "language": "EN", "model": "lj_v2"}"#,
        )
        .into_request(&DefaultsConfig::default())
        .unwrap();
        assert_eq!(request.lang, Some(Lang::En));
        assert_eq!(request.model_id.as_deref(), Some("lj_v2"));
        assert!(!request.enhance_noise);
    }

    #[test]
    fn test_missing_text_is_empty() {
        let request = body(r#"{"speaker": "baya"}"#)
            .into_request(&DefaultsConfig::default())
            .unwrap();
        assert!(request.text.is_empty());
    }

    #[test]
    fn test_unknown_language_is_client_error() {
        let err = body(r#"{"text": "x", "language": "fr"}"#)
            .into_request(&DefaultsConfig::default())
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
