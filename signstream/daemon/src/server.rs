//! HTTP Server
//!
//! Routes the public API onto a shared [`TranslationService`]:
//!
//! ```text
//!   GET  /                               status
//!   GET  /health                         HealthReport
//!   POST /api/v1/translate/voice-to-isl  TranslationResult
//!   GET  /avatar/stream/:stream_id       WebSocket ──> serve_connection
//!   GET  /avatar/stats                   StreamStats
//! ```
//!
//! Every error body has the shape `{ "error": { "code", "message",
//! "timestamp" } }`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};

use signstream_core::package::is_valid_stream_id;
use signstream_core::stream::serve_connection;
use signstream_core::{
    HealthReport, StreamManager, StreamStats, TranslationResult, TranslationService,
    ValidationError,
};

use crate::ws;

// ============================================================================
// State
// ============================================================================

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    service: Arc<TranslationService>,
}

impl AppState {
    /// Wrap a translation service for sharing across handlers
    pub fn new(service: TranslationService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }

    /// The translation service
    pub fn service(&self) -> &TranslationService {
        &self.service
    }

    /// The stream manager behind the service
    pub fn streams(&self) -> &StreamManager {
        self.service.streams()
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/v1/translate/voice-to-isl", post(translate))
        .route("/avatar/stream/:stream_id", get(avatar_stream))
        .route("/avatar/stats", get(stream_stats))
        .fallback(not_found)
        .with_state(state)
}

// ============================================================================
// Bodies
// ============================================================================

/// Generic status response
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// `success`
    pub status: String,
    /// Human-readable message
    pub message: String,
    /// Response time
    pub timestamp: DateTime<Utc>,
}

/// Translation request body
#[derive(Debug, Deserialize)]
pub struct VoiceInput {
    /// Text to translate
    pub audio_text: String,
}

/// Stream statistics response
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// `success`
    pub status: &'static str,
    /// Manager-wide statistics
    pub data: StreamStats,
    /// Response time
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
}

// ============================================================================
// Errors
// ============================================================================

/// Errors returned by HTTP handlers
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request body failed validation
    #[error("Input validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Request body was missing or not the expected JSON
    #[error("Invalid request body: {0}")]
    BadBody(String),

    /// WebSocket path carried a malformed stream id
    #[error("Invalid stream id: {0}")]
    InvalidStreamId(String),

    /// No route matched
    #[error("The requested endpoint was not found")]
    NotFound {
        /// Requested path
        path: String,
    },
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadBody(_) | Self::InvalidStreamId(_) => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) | Self::BadBody(_) => "VALIDATION_ERROR",
            Self::InvalidStreamId(_) => "INVALID_STREAM_ID",
            Self::NotFound { .. } => "NOT_FOUND",
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadBody(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let path = match &self {
            Self::NotFound { path } => Some(path.clone()),
            _ => None,
        };
        let body = ErrorEnvelope {
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
                timestamp: Utc::now(),
                path,
            },
        };
        (self.status(), Json(body)).into_response()
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn root() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "success".to_string(),
        message: "Voice-to-ISL Translation API is running".to_string(),
        timestamp: Utc::now(),
    })
}

async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.service().health())
}

async fn translate(
    State(state): State<AppState>,
    payload: Result<Json<VoiceInput>, JsonRejection>,
) -> Result<Json<TranslationResult>, ApiError> {
    let Json(input) = payload.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "Rejected malformed translation request");
        ApiError::from(rejection)
    })?;
    info!(text = %input.audio_text, "Starting voice-to-ISL translation");
    match state.service().translate(&input.audio_text) {
        Ok(result) => Ok(Json(result)),
        Err(e) => {
            warn!(error = %e, "Rejected translation request");
            Err(e.into())
        }
    }
}

async fn avatar_stream(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
    ConnectInfo(client): ConnectInfo<SocketAddr>,
    upgrade: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    check_stream_id(&stream_id)?;
    info!(stream_id = %stream_id, client = %client, "WebSocket connection request for avatar stream");

    let streams = state.streams().clone();
    Ok(upgrade.on_upgrade(move |socket| {
        let span = info_span!("avatar_stream", stream_id = %stream_id, client = %client);
        async move {
            let (sink, source) = ws::split(socket);
            serve_connection(streams, stream_id, Arc::new(sink), source, client.to_string()).await;
        }
        .instrument(span)
    }))
}

async fn stream_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        status: "success",
        data: state.streams().stats(),
        timestamp: Utc::now(),
    })
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound {
        path: uri.path().to_string(),
    }
}

fn check_stream_id(stream_id: &str) -> Result<(), ApiError> {
    if is_valid_stream_id(stream_id) {
        Ok(())
    } else {
        Err(ApiError::InvalidStreamId(stream_id.chars().take(64).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::extract::FromRequest;
    use axum::http::{header, Request};
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use signstream_core::{AnimationEngine, StreamConfig};

    fn state() -> AppState {
        let streams = StreamManager::new(StreamConfig::for_testing());
        AppState::new(TranslationService::new(AnimationEngine::default(), streams, 1000))
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_root_reports_running() {
        let Json(status) = root().await;
        assert_eq!(status.status, "success");
    }

    #[tokio::test]
    async fn test_translate_caches_animation() {
        let state = state();
        let input = VoiceInput {
            audio_text: "Thank you, see you later!".to_string(),
        };

        let Json(result) = translate(State(state.clone()), Ok(Json(input))).await.unwrap();
        assert_eq!(result.isl_gloss, "THANK-YOU SEE-YOU LATER");
        assert!(result.avatar_stream_url.contains(result.stream_id.as_str()));
        assert!(state.streams().artifact(result.stream_id.as_str()).is_some());

        let Json(report) = health(State(state)).await;
        assert_eq!(report.translations_processed, 1);
    }

    #[tokio::test]
    async fn test_blank_text_is_bad_request() {
        let input = VoiceInput {
            audio_text: "   ".to_string(),
        };
        let err = translate(State(state()), Ok(Json(input))).await.unwrap_err();
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .starts_with("Input validation failed"));
        assert!(body["error"]["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_malformed_body_uses_error_envelope() {
        for body in ["{}", "{\"audio_text\": 7}", "not json"] {
            let request = Request::builder()
                .method("POST")
                .uri("/api/v1/translate/voice-to-isl")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap();
            let payload = Json::<VoiceInput>::from_request(request, &()).await;
            assert!(payload.is_err(), "{body}");

            let response = translate(State(state()), payload).await.unwrap_err().into_response();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let json = body_json(response).await;
            assert_eq!(json["error"]["code"], "VALIDATION_ERROR", "{body}");
            assert!(json["error"]["message"]
                .as_str()
                .unwrap()
                .starts_with("Invalid request body"));
            assert!(json["error"]["timestamp"].is_string());
        }
    }

    #[tokio::test]
    async fn test_unknown_route_is_json_404() {
        let response = not_found(Uri::from_static("/nope")).await.into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "NOT_FOUND");
        assert_eq!(body["error"]["path"], "/nope");
    }

    #[tokio::test]
    async fn test_stats_wraps_manager_snapshot() {
        let state = state();
        state.service().translate("yes").unwrap();

        let Json(stats) = stream_stats(State(state)).await;
        assert_eq!(stats.status, "success");
        assert_eq!(stats.data.cached_animations, 1);
        assert_eq!(stats.data.active_connections, 0);
    }

    #[test]
    fn test_stream_id_shape_is_checked() {
        assert!(check_stream_id("isl_avatar_0123456789ab_1700000000").is_ok());
        assert!(matches!(
            check_stream_id("../../etc/passwd"),
            Err(ApiError::InvalidStreamId(_))
        ));
        assert!(check_stream_id(&"a".repeat(129)).is_err());
    }
}
