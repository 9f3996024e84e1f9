//! Health check endpoint handler.

use crate::gateway::AppState;
use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub upstream: UpstreamHealth,
    pub subscribers: usize,
    pub uptime_seconds: u64,
}

/// Upstream link summary.
#[derive(Debug, Serialize)]
pub struct UpstreamHealth {
    pub state: String,
    /// Successful connects since start
    pub generation: u64,
    pub url: String,
}

/// GET /health - Return relay health status.
pub async fn handle(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let lifecycle = &state.lifecycle;
    let link = lifecycle.link_state();

    let status = if lifecycle.is_shutting_down() {
        "shutting_down"
    } else if link.is_connected() {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        upstream: UpstreamHealth {
            state: link.as_str().to_string(),
            generation: lifecycle.upstream().generation(),
            url: lifecycle.upstream().url().to_string(),
        },
        subscribers: lifecycle.relay().subscriber_count(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}
