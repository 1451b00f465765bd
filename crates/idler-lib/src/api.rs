//! Probe and scrape endpoints served next to the reconcile loop

use crate::health::HealthRegistry;
use crate::observability::ControllerMetrics;
use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const TEXT_PLAIN: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Handles shared by the endpoints
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: ControllerMetrics,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, metrics: ControllerMetrics) -> Self {
        Self {
            health_registry,
            metrics,
        }
    }
}

/// Liveness. Collaborator failures show up as `degraded` in the body but
/// never fail the probe, since the loop keeps running through them.
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.health_registry.health().await)
}

/// Readiness flips once the startup gateway check has passed
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;
    let code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(readiness))
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(text) => (StatusCode::OK, [("content-type", TEXT_PLAIN)], text),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", TEXT_PLAIN)],
                String::new(),
            )
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Bind `0.0.0.0:{port}` and serve until the listener fails
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    use anyhow::Context;

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind health and metrics server on {addr}"))?;

    info!(addr = %addr, "Health and metrics server listening");
    axum::serve(listener, create_router(state))
        .await
        .context("Health and metrics server failed")
}

/// Run [`serve`] in the background. A bind or serve failure is logged; the
/// reconcile loop is not affected.
pub fn spawn_server(port: u16, state: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = serve(port, state).await {
            error!(error = %format!("{e:#}"), port = port, "Health and metrics server stopped");
        }
    })
}
