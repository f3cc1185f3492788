use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::AppState;
use crate::metrics;

/// Health check endpoint - returns server status
pub async fn health_handler(State(state): State<AppState>) -> Response {
    let metrics = state.metrics.snapshot();

    let Ok(snapshot) = state.coordinator().snapshot().await else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "stopped",
                "connections": metrics.connections.active,
                "uptime_secs": metrics.uptime_secs,
            })),
        )
            .into_response();
    };

    let status = if metrics.errors.websocket == 0 {
        "healthy"
    } else {
        "degraded"
    };

    Json(metrics::HealthStatus {
        status: status.to_string(),
        agents: metrics::AgentHealth {
            total: snapshot.agents.len() as u64,
            idle: snapshot.idle_agents() as u64,
        },
        customers_waiting: snapshot.queue.len() as u64,
        connections: metrics.connections.active,
        uptime_secs: metrics.uptime_secs,
    })
    .into_response()
}

/// Metrics endpoint - connection counters plus coordinator routing stats
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut snapshot = state.metrics.snapshot();
    snapshot.routing = state.coordinator().snapshot().await.ok().map(|s| s.stats);
    Json(snapshot)
}

/// Liveness probe - returns 200 if the server is running
pub async fn health_live_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "alive" }))
}

/// Queue and pairing table as the coordinator currently sees them
pub async fn status_handler(State(state): State<AppState>) -> Response {
    match state.coordinator().snapshot().await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}
