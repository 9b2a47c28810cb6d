//! Health check endpoint.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Open WebSocket subscriptions
    pub connections: usize,
    /// Threads with at least one subscriber
    pub threads: usize,
}

/// Create health routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/", get(root))
}

/// Health check handler.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        connections: state.conn_manager.connection_count(),
        threads: state.conn_manager.channel_count(),
    })
}

/// Root handler.
async fn root() -> &'static str {
    "Threadline Comment Server"
}
