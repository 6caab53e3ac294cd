//! Built-in routes served behind the middleware stack.

use axum::{response::IntoResponse, routing::get, Json, Router};
use serde_json::json;

/// Routes mounted by the `slidegate` binary.
pub fn default_routes() -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/ping", get(ping_handler))
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn ping_handler() -> impl IntoResponse {
    Json(json!({ "message": "pong" }))
}
