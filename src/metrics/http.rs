//! HTTP server exposing the Prometheus `/metrics` endpoint.
//!
//! A standalone axum router on its own tokio task, independent of the
//! client-facing listener.

use axum::{routing::get, Router};
use std::net::SocketAddr;

async fn metrics_handler() -> String {
    super::gather_metrics()
}

/// Binds `0.0.0.0:port` and serves `/metrics` until the process exits.
/// Spawned as a background task from `main`; a bind failure is logged and
/// the task simply ends rather than taking the whole process down, since
/// losing metrics scraping isn't a reason to refuse player connections.
pub async fn run_http_server(port: u16) {
    let app = Router::new().route("/metrics", get(metrics_handler));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "metrics HTTP server listening");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, %addr, "failed to bind metrics HTTP server");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "metrics HTTP server error");
    }
}
