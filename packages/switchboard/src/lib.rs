// Library interface for the switchboard server
// Exposes the router and state so the binary and integration tests share one wiring

pub mod client;
pub mod config;
pub mod handlers;
pub mod metrics;
pub mod ws_transport;

use axum::{Router, routing::get};
use std::sync::Arc;
use switchboard_core::{Coordinator, CoordinatorHandle, Intake, SequentialIds};
use tower_http::trace::{MakeSpan, TraceLayer};
use uuid::Uuid;

use crate::config::CoordinatorFileConfig;
use crate::metrics::ServerMetrics;

#[derive(Clone)]
pub struct AppState {
    pub intake: Intake,
    /// Server metrics for observability
    pub metrics: Arc<ServerMetrics>,
}

impl AppState {
    /// Spawn a coordinator on the current runtime and wire an intake to it.
    pub fn start(config: &CoordinatorFileConfig) -> Self {
        let coordinator = Coordinator::spawn(config.runtime());
        let intake = Intake::new(
            coordinator,
            Arc::new(SequentialIds::new()),
            config.outbound_capacity,
        );
        Self {
            intake,
            metrics: Arc::new(ServerMetrics::new()),
        }
    }

    pub fn coordinator(&self) -> &CoordinatorHandle {
        self.intake.coordinator()
    }
}

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::connect::connect_handler))
        .route("/connect", get(handlers::connect::connect_handler))
        .route("/health", get(handlers::health::health_handler))
        .route("/health/live", get(handlers::health::health_live_handler))
        .route("/metrics", get(handlers::health::metrics_handler))
        .route("/api/status", get(handlers::health::status_handler))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .with_state(state)
}
