//! API Router configuration

use super::calls_handler::{get_call, get_confbridge, health_check};
use super::metrics_handler::metrics_handler;
use super::ws_handler::ws_handler;
use super::AppState;
use crate::infrastructure::messaging::EventBroadcaster;
use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the API router
pub fn build_router(
    state: AppState,
    prometheus_handle: PrometheusHandle,
    event_broadcaster: Arc<EventBroadcaster>,
) -> Router {
    let health_routes = Router::new().route("/health", get(health_check));

    let lookup_routes = Router::new()
        .route("/calls/:call_id", get(get_call))
        .route("/confbridges/:confbridge_id", get(get_confbridge));

    // Metrics route (separate state)
    let metrics_routes = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(prometheus_handle);

    // WebSocket route (separate state)
    let ws_routes = Router::new()
        .route("/events", get(ws_handler))
        .with_state(event_broadcaster);

    Router::new()
        .merge(health_routes)
        .merge(lookup_routes)
        .with_state(state)
        .merge(metrics_routes)
        .merge(ws_routes)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
