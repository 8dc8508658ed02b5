//! Admin HTTP surface
//!
//! - `GET /health`
//! - `GET /api/admin/jobs`: job list with running flag and last outcome
//! - `POST /api/admin/jobs/:name/run`: run a job now
//! - `GET /api/admin/metrics`: store metrics snapshot

use crate::jobs::JobOutcome;
use crate::scheduler::{JobScheduler, JobStatus};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use graph_store::metrics::MetricsSnapshot;
use graph_store::StoreMetrics;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Caller lacks the required authority (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Conflict (409), e.g. job already running
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<graph_common::Error> for ApiError {
    fn from(err: graph_common::Error) -> Self {
        use graph_common::Error;
        match err {
            Error::InvalidQuery(_) | Error::InvalidInput(_) => ApiError::BadRequest(err.to_string()),
            Error::InsufficientPrivilege(_) => ApiError::Forbidden(err.to_string()),
            Error::NotFound(msg) => ApiError::NotFound(msg),
            Error::Conflict(msg) => ApiError::Conflict(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<JobScheduler>,
    pub metrics: Arc<StoreMetrics>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(scheduler: Arc<JobScheduler>, metrics: Arc<StoreMetrics>) -> Self {
        Self {
            scheduler,
            metrics,
            startup_time: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    module: &'static str,
    version: &'static str,
    uptime_seconds: i64,
}

#[derive(Debug, Serialize)]
struct JobRunResponse {
    job: String,
    #[serde(flatten)]
    outcome: JobOutcome,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        module: "graph-jobs",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: (Utc::now() - state.startup_time).num_seconds(),
    })
}

async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobStatus>> {
    Json(state.scheduler.status().await)
}

async fn run_job(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult<Json<JobRunResponse>> {
    let outcome = state.scheduler.run_now(&name).await?;
    Ok(Json(JobRunResponse { job: name, outcome }))
}

async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/admin/jobs", get(list_jobs))
        .route("/api/admin/jobs/:name/run", post(run_job))
        .route("/api/admin/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
