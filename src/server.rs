//! HTTP server for the TTS relay
//!
//! Exposes the synthesis pipeline, the sentence splitter and the meta info
//! lookup over HTTP. Uses Axum; every route is nested under a configurable
//! context path.

use std::{future::Future, sync::Arc};

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio::{net::TcpListener, sync::Semaphore};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::{
    error::TtsError,
    meta::SynthesisMetaInfo,
    pipeline::{SynthesisOutput, SynthesisPipeline, SynthesisRequest, DEFAULT_SILENCE_DURATION},
    protocol::{ErrorBody, SpeechQuery, SplitQuery, SplitResponse, SynthesisRequestBody, META_KEY_HEADER},
    splitter::SentenceSplitter,
};

/// Application state shared across all requests
#[derive(Clone)]
pub struct AppState {
    /// Synthesis pipeline
    pub pipeline: SynthesisPipeline,
    /// Splitter for raw text input
    pub splitter: Arc<SentenceSplitter>,
    /// Semaphore to limit concurrent synthesis runs
    pub tts_inflight: Arc<Semaphore>,
    /// Maximum number of concurrent synthesis runs
    pub tts_inflight_limit: usize,
    /// Gap between sentences when a request doesn't set one
    pub silence_duration: f64,
    /// Prefix every route is mounted under
    pub context_path: String,
}

impl AppState {
    /// Create a new application state
    pub fn new(pipeline: SynthesisPipeline, tts_inflight: usize) -> Self {
        let limit = tts_inflight.max(1);
        Self {
            pipeline,
            splitter: Arc::new(SentenceSplitter::default()),
            tts_inflight: Arc::new(Semaphore::new(limit)),
            tts_inflight_limit: limit,
            silence_duration: DEFAULT_SILENCE_DURATION,
            context_path: "/".to_string(),
        }
    }

    pub fn with_splitter(mut self, splitter: SentenceSplitter) -> Self {
        self.splitter = Arc::new(splitter);
        self
    }

    pub fn with_silence_duration(mut self, silence_duration: f64) -> Self {
        self.silence_duration = silence_duration;
        self
    }

    pub fn with_context_path(mut self, context_path: impl AsRef<str>) -> Self {
        self.context_path = normalize_context_path(context_path.as_ref());
        self
    }

    /// Run one synthesis request under the in-flight limit.
    async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesisOutput, TtsError> {
        let _permit = self.tts_inflight.acquire().await.map_err(|_| TtsError::EngineUnavailable {
            index: 0,
            message: "tts inflight limiter closed".to_string(),
        })?;
        let span = info_span!("synthesis", request_id = %Uuid::new_v4());
        self.pipeline.run(request).instrument(span).await
    }
}

/// `""`, `"/"` and `"/api/"` become `"/"`, `"/"` and `"/api"`.
pub fn normalize_context_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Create the Axum router with all routes
pub fn router(state: AppState) -> Router {
    let context_path = state.context_path.clone();
    let routes = Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/synthesis", post(synthesis_handler))
        .route("/v1/synthesis/meta/:key", get(meta_handler))
        .route("/v1/split_sentence", get(split_handler))
        .route("/split_sentence", get(split_handler))
        .route("/synthesis", get(speech_handler))
        .with_state(state);

    if context_path == "/" {
        routes
    } else {
        Router::new().nest(&context_path, routes)
    }
}

/// Start the server and serve requests indefinitely
pub async fn serve(
    listener: TcpListener,
    state: AppState,
) -> Result<(), Box<dyn std::error::Error>> {
    serve_with_shutdown(listener, state, std::future::pending()).await
}

/// Start the server with graceful shutdown support
pub async fn serve_with_shutdown<F>(
    listener: TcpListener,
    state: AppState,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let context_path = state.context_path.clone();
    let app = router(state);
    info!(context_path = %context_path, "starting axum server");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("server shut down gracefully");
    Ok(())
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
async fn healthz() -> &'static str {
    "ok"
}

async fn synthesis_handler(
    State(state): State<AppState>,
    body: Result<Json<SynthesisRequestBody>, JsonRejection>,
) -> Result<Response, TtsError> {
    let Json(body) = body.map_err(|e| TtsError::InvalidInput(e.body_text()))?;
    let request = SynthesisRequest::new(body.sentences)
        .with_format(body.format)
        .with_silence_duration(body.silence_duration.unwrap_or(state.silence_duration));

    let output = state.synthesize(request).await?;
    Ok(audio_response(output))
}

async fn speech_handler(
    State(state): State<AppState>,
    query: Result<Query<SpeechQuery>, QueryRejection>,
) -> Result<Response, TtsError> {
    let Query(query) = query.map_err(|e| TtsError::InvalidInput(e.body_text()))?;
    let request = SynthesisRequest::from_sentences(state.splitter.split(&query.text), query.overrides())
        .with_format(query.format)
        .with_silence_duration(state.silence_duration);

    let output = state.synthesize(request).await?;
    Ok(audio_response(output))
}

async fn meta_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<SynthesisMetaInfo>, TtsError> {
    let info = state.pipeline.recorder().retrieve(&key).await?;
    Ok(Json(info))
}

async fn split_handler(
    State(state): State<AppState>,
    query: Result<Query<SplitQuery>, QueryRejection>,
) -> Result<Json<SplitResponse>, TtsError> {
    let Query(query) = query.map_err(|e| TtsError::InvalidInput(e.body_text()))?;
    Ok(Json(SplitResponse {
        sentences: state.splitter.split(&query.text),
    }))
}

/// Audio body with its media type and, when recorded, the meta key header.
fn audio_response(output: SynthesisOutput) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(output.audio.format.media_type()),
    );
    if let Some(key) = output.meta_key.as_deref() {
        match HeaderValue::from_str(key) {
            Ok(value) => {
                headers.insert(META_KEY_HEADER, value);
            }
            Err(e) => warn!(error = %e, "meta key is not a valid header value"),
        }
    }
    (StatusCode::OK, headers, output.audio.bytes).into_response()
}

// =============================================================================
// Errors
// =============================================================================

impl TtsError {
    /// HTTP status reported for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            TtsError::EngineUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            TtsError::EngineError { .. } => StatusCode::BAD_GATEWAY,
            TtsError::EmptyInput | TtsError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            TtsError::NotFound(_) => StatusCode::NOT_FOUND,
            TtsError::FormatMismatch { .. }
            | TtsError::Encode(_)
            | TtsError::Store(_)
            | TtsError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for TtsError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "request rejected");
        }
        (status, Json(ErrorBody::new(self.to_string()))).into_response()
    }
}
