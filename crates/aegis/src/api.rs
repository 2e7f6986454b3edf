//! HTTP API for health checks, Prometheus metrics and read-only engine state

use aegis_core::{
    alerting::{Alert, AlertGroup},
    chaos::ExperimentResult,
    health::ComponentStatus,
    predictor::FailurePrediction,
    DashboardSnapshot, MonitoringEngine,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<MonitoringEngine>,
}

impl AppState {
    pub fn new(engine: Arc<MonitoringEngine>) -> Self {
        Self { engine }
    }
}

#[derive(Debug, Serialize)]
pub struct ResilienceResponse {
    pub score: f64,
    pub experiments: usize,
    pub running_experiments: usize,
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.engine.health().health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 once the engine is started
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.engine.health().readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn active_alerts(State(state): State<Arc<AppState>>) -> Json<Vec<Alert>> {
    Json(state.engine.active_alerts().await)
}

async fn escalated_alerts(State(state): State<Arc<AppState>>) -> Json<Vec<Alert>> {
    Json(state.engine.escalated_alerts().await)
}

async fn alert_groups(State(state): State<Arc<AppState>>) -> Json<Vec<AlertGroup>> {
    Json(state.engine.alert_groups())
}

/// Live predictions, most likely failure first
async fn predictions(State(state): State<Arc<AppState>>) -> Json<Vec<FailurePrediction>> {
    let mut predictions: Vec<_> = state.engine.predictions().into_values().collect();
    predictions.sort_by(|a, b| b.probability.total_cmp(&a.probability));
    Json(predictions)
}

async fn experiments(State(state): State<Arc<AppState>>) -> Json<Vec<ExperimentResult>> {
    Json(state.engine.experiment_history().await)
}

async fn resilience(State(state): State<Arc<AppState>>) -> Json<ResilienceResponse> {
    let engine = &state.engine;
    Json(ResilienceResponse {
        score: engine.resilience_score().await,
        experiments: engine.experiment_history().await.len(),
        running_experiments: engine.chaos().running_count(),
    })
}

async fn dashboard(State(state): State<Arc<AppState>>) -> Json<DashboardSnapshot> {
    let snapshot = state.engine.dashboard().borrow().clone();
    Json(snapshot)
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/alerts", get(active_alerts))
        .route("/api/alerts/escalated", get(escalated_alerts))
        .route("/api/alerts/groups", get(alert_groups))
        .route("/api/predictions", get(predictions))
        .route("/api/experiments", get(experiments))
        .route("/api/resilience", get(resilience))
        .route("/api/dashboard", get(dashboard))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
