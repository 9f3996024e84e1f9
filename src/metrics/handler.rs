//! # Metrics HTTP Handlers
//!
//! Axum handler for the Prometheus scrape endpoint.

use crate::gateway::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse};
use std::sync::Arc;

/// Handler for GET /metrics endpoint (Prometheus text format).
///
/// Always returns 200 with the correct Content-Type for Prometheus scrapers,
/// even if no metrics have been recorded yet (returns empty text).
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // Gauges derived from live state are refreshed at scrape time
    metrics::gauge!("voltwatch_subscribers")
        .set(state.lifecycle.relay().subscriber_count() as f64);
    let connected = if state.lifecycle.link_state().is_connected() {
        1.0
    } else {
        0.0
    };
    metrics::gauge!("voltwatch_upstream_connected").set(connected);

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics_handle.render(),
    )
}
