//! HTTP readiness endpoint
//!
//! `GET /readyz` answers 503 until the flow has connected its modules and 200 afterwards.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;

use metricflow_engine::Flow;

async fn readyz(State(flow): State<Arc<Flow>>) -> (StatusCode, &'static str) {
    if flow.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

pub fn router(flow: Arc<Flow>) -> Router {
    Router::new().route("/readyz", get(readyz)).with_state(flow)
}

/// Bind the endpoint on all interfaces and serve it in the background
pub async fn serve(flow: Arc<Flow>, port: u16) -> Result<SocketAddr> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind readiness endpoint on port {port}"))?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router(flow)).await {
            tracing::error!(target: "readiness", error = %e, "Readiness endpoint stopped");
        }
    });

    Ok(addr)
}
