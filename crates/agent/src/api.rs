//! HTTP API: dashboard, status, synthetic load, health checks and Prometheus metrics

use agent_lib::{
    health::{Component, ComponentStatus, HealthRegistry},
    load::{LoadError, LoadGenerator, LoadState, StressProfile, DEFAULT_CPU_WORKERS},
    observability::AgentMetrics,
    sampler::UsageSampler,
    status::{MonitorStatus, StatusBoard},
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: AgentMetrics,
    pub status: StatusBoard,
    pub sampler: Arc<dyn UsageSampler>,
    pub load: LoadGenerator,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: AgentMetrics,
        status: StatusBoard,
        sampler: Arc<dyn UsageSampler>,
        load: LoadGenerator,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            status,
            sampler,
            load,
        }
    }
}

/// JSON error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Handler error carrying the HTTP status to return
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<LoadError> for ApiError {
    fn from(e: LoadError) -> Self {
        let status = match e {
            LoadError::BallastFull { .. } => StatusCode::CONFLICT,
            LoadError::Spawn { .. } | LoadError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

/// Optional body for starting CPU load
#[derive(Debug, Default, Deserialize)]
pub struct CpuStartRequest {
    /// Capped at four workers per available core
    pub workers: Option<usize>,
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

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
        warn!(error = %e, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn status(State(state): State<Arc<AppState>>) -> Json<MonitorStatus> {
    Json(state.status.snapshot().await)
}

/// Fresh reading through the sampler, independent of the monitor loop
async fn usage(State(state): State<Arc<AppState>>) -> Response {
    match state.sampler.sample().await {
        Ok(sample) => Json(sample).into_response(),
        Err(e) => ApiError::new(StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}

async fn load_state(State(state): State<Arc<AppState>>) -> Json<LoadState> {
    Json(state.load.state())
}

async fn cpu_start(
    State(state): State<Arc<AppState>>,
    body: Option<Json<CpuStartRequest>>,
) -> Result<Json<LoadState>, ApiError> {
    let workers = body
        .and_then(|Json(req)| req.workers)
        .unwrap_or(DEFAULT_CPU_WORKERS);
    let load = state.load.clone();
    let result = run_blocking(move || load.start_cpu(workers)).await?;
    Ok(Json(track(&state, result).await?))
}

async fn cpu_stop(State(state): State<Arc<AppState>>) -> Result<Json<LoadState>, ApiError> {
    let load = state.load.clone();
    Ok(Json(run_blocking(move || load.stop_cpu()).await?))
}

async fn memory_allocate(
    State(state): State<Arc<AppState>>,
) -> Result<Json<LoadState>, ApiError> {
    let load = state.load.clone();
    let result = run_blocking(move || load.allocate_memory()).await?;
    Ok(Json(result?))
}

async fn memory_free(State(state): State<Arc<AppState>>) -> Result<Json<LoadState>, ApiError> {
    let load = state.load.clone();
    Ok(Json(run_blocking(move || load.free_memory()).await?))
}

async fn stress(
    State(state): State<Arc<AppState>>,
    body: Option<Json<StressProfile>>,
) -> Result<Json<LoadState>, ApiError> {
    let profile = body.map(|Json(p)| p).unwrap_or_default();
    let result = state.load.run_stress(&profile);
    Ok(Json(track(&state, result).await?))
}

/// Reflect load generator failures in the health registry
async fn track(
    state: &AppState,
    result: Result<LoadState, LoadError>,
) -> Result<LoadState, LoadError> {
    match &result {
        Ok(_) => {
            state
                .health_registry
                .record_success(Component::LoadGenerator)
                .await
        }
        Err(e) => {
            state
                .health_registry
                .record_failure(Component::LoadGenerator, e.to_string())
                .await
        }
    }
    result
}

/// Thread spawning and page touching stay off the async workers
async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// Minimal auto-refreshing dashboard
async fn dashboard(State(state): State<Arc<AppState>>) -> Html<String> {
    let status = state.status.snapshot().await;
    let load = state.load.state();
    Html(render_dashboard(&status, &load))
}

fn render_dashboard(status: &MonitorStatus, load: &LoadState) -> String {
    let percent = |value: Option<f64>| match value {
        Some(v) => format!("{:.1}%", v),
        None => "n/a".to_string(),
    };
    let sample = status.latest_sample;

    let mut page = String::new();
    page.push_str("<!DOCTYPE html>\n<html>\n<head>\n");
    page.push_str("<meta http-equiv=\"refresh\" content=\"5\">\n");
    page.push_str("<title>VM Monitoring Dashboard</title>\n</head>\n<body>\n");
    page.push_str("<h1>VM Monitoring Dashboard</h1>\n");
    page.push_str(&format!("<p>Status: {}</p>\n", status.label));
    page.push_str("<ul>\n");
    page.push_str(&format!(
        "<li>CPU: {}</li>\n",
        percent(sample.map(|s| s.cpu_percent))
    ));
    page.push_str(&format!(
        "<li>Memory: {}</li>\n",
        percent(sample.map(|s| s.memory_percent))
    ));
    page.push_str(&format!(
        "<li>Disk: {}</li>\n",
        percent(sample.map(|s| s.disk_percent))
    ));
    page.push_str("</ul>\n");
    page.push_str(&format!(
        "<p>High samples: {} of {} (threshold {:.0}%)</p>\n",
        status.trailing_breaches, status.consecutive_checks, status.threshold_percent
    ));
    if let Some(failure) = &status.last_failure {
        page.push_str(&format!("<p>Last failure: {}</p>\n", escape(failure)));
    }
    page.push_str(&format!(
        "<p>CPU load workers: {}, memory ballast blocks: {} of {}</p>\n",
        load.cpu_workers, load.memory_blocks, load.memory_max_blocks
    ));
    page.push_str("</body>\n</html>\n");
    page
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(dashboard))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/status", get(status))
        .route("/api/v1/usage", get(usage))
        .route("/api/v1/load", get(load_state))
        .route("/api/v1/load/cpu/start", post(cpu_start))
        .route("/api/v1/load/cpu/stop", post(cpu_stop))
        .route("/api/v1/load/memory/allocate", post(memory_allocate))
        .route("/api/v1/load/memory/free", post(memory_free))
        .route("/api/v1/load/stress", post(stress))
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
