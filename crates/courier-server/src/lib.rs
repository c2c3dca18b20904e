//! # courier-server
//!
//! Read-only HTTP surface for a running agent:
//!
//! - `GET /health` for liveness probes
//! - `GET /api/v1/status` with the poll loop's progress snapshot
//! - `GET /metrics` in Prometheus text format

pub mod metrics;

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::Json,
    routing::get,
};
use courier_config::schema::ServerConfig;
use courier_core::{CourierError, Result};
use courier_runtime::{AgentStatus, StatusHandle};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared server state.
pub struct AppState {
    pub status: StatusHandle,
    pub metrics: metrics::Metrics,
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_secs: u64,
}

/// Build the Axum router over a status handle owned by the runtime.
pub fn build_router(status: StatusHandle) -> Router {
    let state = Arc::new(AppState {
        status,
        metrics: metrics::Metrics::new(),
    });

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/v1/status", get(status_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    state.metrics.inc_http_requests();
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        uptime_secs: state.metrics.uptime_secs(),
    })
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Json<AgentStatus> {
    state.metrics.inc_http_requests();
    Json(state.status.snapshot())
}

/// Prometheus-compatible metrics endpoint.
async fn metrics_handler(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, [(header::HeaderName, &'static str); 1], String) {
    state.metrics.inc_http_requests();
    let body = state.metrics.render_prometheus(&state.status.snapshot());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// Serve until `cancel` fires.
pub async fn start_server(
    config: ServerConfig,
    status: StatusHandle,
    cancel: CancellationToken,
) -> Result<()> {
    let listen = config.listen.clone();
    let router = build_router(status);

    info!(listen = %listen, "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .map_err(|e| CourierError::Config(format!("failed to bind {listen}: {e}")))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| CourierError::Transport(format!("server error: {e}")))?;

    info!("HTTP server stopped");
    Ok(())
}
