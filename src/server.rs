//! HTTP server exposing the operational API over the shared [`Engine`].
//!
//! Generalized from the teacher's `AppState`/`AppError`/route-table shape,
//! re-pointed at the hybrid retrieval engine's operations (SPEC_FULL §6).
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Liveness check |
//! | `GET`  | `/status` | Backend readiness + configuration summary |
//! | `POST` | `/ingest` | Start an ingestion job from the configured source |
//! | `POST` | `/ingest_text` | Ingest a single pasted-text document |
//! | `POST` | `/search` | Fused hybrid search |
//! | `POST` | `/query` | Fused hybrid search + LLM-grounded answer |
//! | `GET`  | `/jobs/:job_id` | Job status snapshot |
//! | `POST` | `/jobs/:job_id/cancel` | Cooperative cancellation |
//! | `GET`  | `/jobs/:job_id/events` | Server-sent progress events, ~2s ticks |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `not_ready` (400),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::engine::Engine;
use crate::errors::EngineError;
use crate::ingest::{start_ingestion, start_ingestion_with_items, synthetic_text_item};
use crate::models::{Job, SearchResultItem};

#[derive(Clone)]
struct AppState {
    engine: Arc<Engine>,
}

/// Starts the HTTP server, binding to `[server].bind` and serving until the
/// process is terminated.
pub async fn run_server(engine: Arc<Engine>) -> anyhow::Result<()> {
    let bind_addr = engine.config.server.bind.clone();
    let state = AppState { engine };

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/status", get(handle_status))
        .route("/ingest", post(handle_ingest))
        .route("/ingest_text", post(handle_ingest_text))
        .route("/search", post(handle_search))
        .route("/query", post(handle_query))
        .route("/jobs/:job_id", get(handle_job_status))
        .route("/jobs/:job_id/cancel", post(handle_cancel))
        .route("/jobs/:job_id/events", get(handle_job_events))
        .layer(cors)
        .with_state(state);

    tracing::info!(bind = %bind_addr, "server listening");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody { error: ErrorDetail { code: self.code, message: self.message } };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError { status: StatusCode::BAD_REQUEST, code: "bad_request".to_string(), message: message.into() }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError { status: StatusCode::NOT_FOUND, code: "not_found".to_string(), message: message.into() }
}

fn internal_error(message: impl Into<String>) -> AppError {
    AppError { status: StatusCode::INTERNAL_SERVER_ERROR, code: "internal".to_string(), message: message.into() }
}

/// Maps a typed engine error onto the HTTP error contract.
impl From<EngineError> for AppError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::NotReady(msg) => {
                AppError { status: StatusCode::BAD_REQUEST, code: "not_ready".to_string(), message: msg }
            }
            EngineError::ConfigInvalid(msg) => bad_request(msg),
            other => internal_error(other.to_string()),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok".to_string(), version: env!("CARGO_PKG_VERSION").to_string() })
}

// ============ GET /status ============

async fn handle_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.engine.status().await)
}

// ============ POST /ingest ============

#[derive(Deserialize, Default)]
struct IngestRequest {
    #[serde(default)]
    #[allow(dead_code)]
    paths: Option<Vec<String>>,
}

#[derive(Serialize)]
struct IngestResponse {
    job_id: String,
    status: String,
    message: String,
    estimated_time: Option<String>,
}

/// `POST /ingest` — scans the configured source and starts a background
/// ingestion job. The `paths` field is accepted for forward-compatibility
/// with per-request source overrides but is not yet wired to the connector
/// (filesystem paths come from configuration, per SPEC_FULL §6).
async fn handle_ingest(
    State(state): State<AppState>,
    Json(_req): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, AppError> {
    let job_id = start_ingestion(state.engine.clone()).await.map_err(AppError::from)?;
    let job = state.engine.registry.get(&job_id).await.map_err(AppError::from)?;
    Ok(Json(IngestResponse {
        job_id,
        status: format!("{:?}", job.status).to_lowercase(),
        message: job.message,
        estimated_time: job.estimated_time_remaining,
    }))
}

// ============ POST /ingest_text ============

#[derive(Deserialize)]
struct IngestTextRequest {
    content: String,
    #[serde(default)]
    source_name: Option<String>,
}

async fn handle_ingest_text(
    State(state): State<AppState>,
    Json(req): Json<IngestTextRequest>,
) -> Result<Json<IngestResponse>, AppError> {
    if req.content.trim().is_empty() {
        return Err(bad_request("content must not be empty"));
    }
    let item = synthetic_text_item(&req.content, req.source_name.as_deref());
    let job_id = start_ingestion_with_items(state.engine.clone(), vec![item]).await.map_err(AppError::from)?;
    let job = state.engine.registry.get(&job_id).await.map_err(AppError::from)?;
    Ok(Json(IngestResponse {
        job_id,
        status: format!("{:?}", job.status).to_lowercase(),
        message: job.message,
        estimated_time: job.estimated_time_remaining,
    }))
}

// ============ POST /search ============

fn default_top_k() -> usize {
    10
}

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default = "default_top_k")]
    top_k: usize,
    /// Accepted for API compatibility; fusion always runs across every
    /// configured backend (SPEC_FULL §4.5 has no single-modality mode).
    #[serde(default, rename = "query_type")]
    #[allow(dead_code)]
    query_type: Option<String>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchResultItem>,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let composer = state.engine.composer.read().await;
    let results = composer.search(&req.query, req.top_k).await.map_err(AppError::from)?;
    Ok(Json(SearchResponse { results }))
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default = "default_top_k")]
    top_k: usize,
}

#[derive(Serialize)]
struct QueryResponse {
    answer: String,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let composer = state.engine.composer.read().await;
    let answer = composer
        .query(&req.query, req.top_k, &state.engine.config.llm)
        .await
        .map_err(AppError::from)?;
    Ok(Json(QueryResponse { answer }))
}

// ============ GET /jobs/:job_id ============

async fn handle_job_status(
    State(state): State<AppState>,
    AxumPath(job_id): AxumPath<String>,
) -> Result<Json<Job>, AppError> {
    state
        .engine
        .registry
        .get(&job_id)
        .await
        .map(Json)
        .map_err(|_| not_found(format!("unknown job {job_id}")))
}

// ============ POST /jobs/:job_id/cancel ============

#[derive(Serialize)]
struct CancelResponse {
    ok: bool,
    message: String,
}

async fn handle_cancel(
    State(state): State<AppState>,
    AxumPath(job_id): AxumPath<String>,
) -> Result<Json<CancelResponse>, AppError> {
    let message = state
        .engine
        .registry
        .cancel(&job_id)
        .await
        .map_err(|_| not_found(format!("unknown job {job_id}")))?;
    Ok(Json(CancelResponse { ok: true, message }))
}

// ============ GET /jobs/:job_id/events ============

/// Server-sent event stream ticking every ~2s with a job snapshot, closing
/// after the first terminal status (SPEC_FULL §6 `processing_events`).
async fn handle_job_events(
    State(state): State<AppState>,
    AxumPath(job_id): AxumPath<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    state.engine.registry.get(&job_id).await.map_err(|_| not_found(format!("unknown job {job_id}")))?;

    let registry = state.engine.registry.clone();
    let stream = stream::unfold((registry, job_id, false), |(registry, job_id, done)| async move {
        if done {
            return None;
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
        match registry.snapshot(&job_id).await {
            Ok(job) => {
                let is_terminal = matches!(
                    job.status,
                    crate::models::JobStatus::Completed | crate::models::JobStatus::Failed | crate::models::JobStatus::Cancelled
                );
                let event = Event::default().json_data(&job).unwrap_or_else(|_| Event::default().data("{}"));
                Some((Ok(event), (registry, job_id, is_terminal)))
            }
            Err(_) => None,
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
