//! Liveness endpoint for container orchestration
//!
//! `GET /health` answers `ok`. Other methods on `/health` get 405, other
//! paths 404. The endpoint reports process liveness only; it does not
//! check the remote API.

use std::net::SocketAddr;

use axum::{
    Router,
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::any,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::HealthConfig;

/// Build the health router
pub fn router() -> Router {
    Router::new()
        .route("/health", any(health_handler))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
}

async fn health_handler(method: Method) -> Response {
    if method == Method::GET {
        (StatusCode::OK, "ok").into_response()
    } else {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::ALLOW, "GET")],
            "method not allowed",
        )
            .into_response()
    }
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "not found")
}

/// Bind and serve the health endpoint in the background
///
/// Bind failures are logged and the endpoint is skipped; the MCP server
/// keeps running without it. Returns the bound address on success.
pub async fn spawn(config: &HealthConfig) -> Option<SocketAddr> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %addr, error = %e, "Failed to bind health endpoint");
            return None;
        }
    };
    let local = listener.local_addr().ok();
    info!(addr = %addr, "Health endpoint listening");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router()).await {
            error!(error = %e, "Health endpoint stopped");
        }
    });
    local
}
