//! HTTP API for the arbitration engine
//!
//! Endpoints:
//! - GET /health - Health check
//! - POST /turn - Process one user turn
//! - POST /session/{id}/silence - Report silence after a checking question
//! - GET /session/{id} - Session state
//! - GET /session/{id}/metrics - Monitor report for a session
//! - GET /monitor/summary - Aggregate monitor summary
//! - GET /safety/status - Catastrophic gate alert status

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::core::monitor::{GlobalSummary, MonitorReport};
use crate::core::orchestrator::Orchestrator;
use crate::error::ArbiterError;
use crate::types::{SafetyStatus, Session, TurnInput, TurnOutcome};

/// App state
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

/// Silence report request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SilenceRequest {
    pub user_id: String,
}

/// Health response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub sessions_active: usize,
}

/// Safety status response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyStatusResponse {
    pub status: SafetyStatus,
    pub recent_detections: usize,
}

/// Error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: message.into() }))
}

impl From<ArbiterError> for ApiError {
    fn from(err: ArbiterError) -> Self {
        let status = match err {
            ArbiterError::InvalidContext(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        api_error(status, err.to_string())
    }
}

/// Create the API router
pub fn create_router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = Arc::new(AppState { orchestrator });

    Router::new()
        .route("/health", get(health))
        .route("/turn", post(process_turn))
        .route("/session/:id", get(get_session))
        .route("/session/:id/silence", post(report_silence))
        .route("/session/:id/metrics", get(get_metrics))
        .route("/monitor/summary", get(monitor_summary))
        .route("/safety/status", get(safety_status))
        .with_state(state)
}

/// Health check endpoint
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        sessions_active: state.orchestrator.sessions().len().await,
    })
}

/// Process one turn
async fn process_turn(
    State(state): State<Arc<AppState>>,
    Json(input): Json<TurnInput>,
) -> Result<Json<TurnOutcome>, ApiError> {
    let outcome = state.orchestrator.process_turn(input).await?;
    Ok(Json(outcome))
}

/// Silence observed by the client after a checking question
async fn report_silence(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<SilenceRequest>,
) -> Result<Json<TurnOutcome>, ApiError> {
    let outcome = state.orchestrator.handle_silence(&req.user_id, Some(&id)).await?;
    Ok(Json(outcome))
}

/// Get session state
async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    state
        .orchestrator
        .session_snapshot(&id)
        .await
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("no session {}", id)))
}

/// Get monitor report for a session
async fn get_metrics(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MonitorReport>, ApiError> {
    state
        .orchestrator
        .metrics(&id)
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("no metrics for {}", id)))
}

async fn monitor_summary(State(state): State<Arc<AppState>>) -> Json<GlobalSummary> {
    Json(state.orchestrator.monitor_summary())
}

async fn safety_status(State(state): State<Arc<AppState>>) -> Json<SafetyStatusResponse> {
    Json(SafetyStatusResponse {
        status: state.orchestrator.safety_status(),
        recent_detections: state.orchestrator.recent_detections(),
    })
}

/// Run the API server
pub async fn run_server(addr: &str, orchestrator: Arc<Orchestrator>) -> Result<(), Box<dyn std::error::Error>> {
    let sweeper = orchestrator.spawn_sweeper();
    let router = create_router(orchestrator);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr, "api listening");
    println!("Arbiter API running on {}", addr);
    println!("  GET  /health                - Health check");
    println!("  POST /turn                  - Process a turn");
    println!("  POST /session/:id/silence   - Report silence");
    println!("  GET  /session/:id           - Session state");
    println!("  GET  /session/:id/metrics   - Monitor report");
    println!("  GET  /monitor/summary       - Aggregate monitor summary");
    println!("  GET  /safety/status         - Safety alert status");
    let served = axum::serve(listener, router).await;
    sweeper.abort();
    served?;
    Ok(())
}
