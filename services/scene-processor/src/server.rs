//! HTTP server for workflow task invocations.
//!
//! Provides endpoints for:
//! - Per-site pipeline invocation (`POST /invoke`)
//! - Cross-site rollup (`POST /rollup`)
//! - Liveness and Prometheus metrics

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use fulfillment::Pipeline;
use metrics_exporter_prometheus::PrometheusHandle;
use scene_common::{SceneError, TaskInput};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

/// Shared state for request handlers.
pub struct AppState {
    pub pipeline: Pipeline,
    pub prometheus: PrometheusHandle,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    kind: &'static str,
}

fn error_response(err: SceneError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!(kind = err.kind(), error = %err, "Invocation failed");
    }
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            kind: err.kind(),
        }),
    )
        .into_response()
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/invoke", post(invoke_handler))
        .route("/rollup", post(rollup_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Run the invocation server until the process exits.
pub async fn run_server(state: Arc<AppState>, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "Listening");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn invoke_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(input): Json<TaskInput>,
) -> Response {
    match state.pipeline.invoke(&input).await {
        Ok(output) => (StatusCode::OK, Json(output)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn rollup_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(input): Json<TaskInput>,
) -> Response {
    match state.pipeline.rollup(&input).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn metrics_handler(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, state.prometheus.render())
}
