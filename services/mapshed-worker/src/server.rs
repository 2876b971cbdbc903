//! HTTP status API.
//!
//! - `GET /health`
//! - `GET /jobs/:id` job record for polling clients
//! - `GET /metrics` Prometheus exposition

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use uuid::Uuid;

use storage::JobStore;

pub struct ServerState {
    pub jobs: Arc<dyn JobStore>,
    pub prometheus: Option<PrometheusHandle>,
}

pub fn create_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/jobs/:id", get(job_handler))
        .route("/metrics", get(metrics_handler))
        .layer(Extension(state))
        .layer(CorsLayer::permissive())
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({"status": "ok", "service": "mapshed-worker"}))
}

async fn job_handler(
    Extension(state): Extension<Arc<ServerState>>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.jobs.get(id).await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("job {} not found", id)})),
        )
            .into_response(),
        Err(e) => {
            warn!(job_id = %id, error = %e, "Job lookup failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(e.to_envelope())).into_response()
        }
    }
}

async fn metrics_handler(Extension(state): Extension<Arc<ServerState>>) -> Response {
    match &state.prometheus {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics exporter not installed").into_response(),
    }
}

pub async fn run_server(state: Arc<ServerState>, port: u16) -> anyhow::Result<()> {
    let app = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    info!(port = port, "Starting job status server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
