//! # Connection Upgrade Gateway
//!
//! HTTP surface of the relay.
//!
//! ## Endpoints
//!
//! - `GET <server.ws_path>` - WebSocket upgrade for dashboards (default `/api/websocket`)
//! - `GET /health` - Upstream link state and subscriber count
//! - `GET /metrics` - Prometheus text format metrics
//!
//! ## Example
//!
//! ```no_run
//! use voltwatch::config::VoltwatchConfig;
//! use voltwatch::gateway::{create_router, AppState};
//! use voltwatch::lifecycle::LifecycleController;
//! use std::net::SocketAddr;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(VoltwatchConfig::default());
//! let lifecycle = Arc::new(LifecycleController::new(&config));
//! let state = Arc::new(AppState::new(lifecycle, config));
//!
//! let app = create_router(state);
//!
//! // ConnectInfo is what lets the gateway spot repeated upgrades
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod health;
mod upgrade;
pub mod websocket;

pub use error::GatewayError;
pub use health::{HealthResponse, UpstreamHealth};
pub use upgrade::UpgradeGuard;
pub use websocket::websocket_handler;

use crate::config::VoltwatchConfig;
use crate::lifecycle::LifecycleController;
use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub lifecycle: Arc<LifecycleController>,
    pub config: Arc<VoltwatchConfig>,
    /// Connections that already went through an upgrade
    pub upgrades: UpgradeGuard,
    /// Server startup time for uptime tracking
    pub start_time: Instant,
    /// Prometheus handle for rendering metrics
    pub metrics_handle: PrometheusHandle,
}

impl AppState {
    pub fn new(lifecycle: Arc<LifecycleController>, config: Arc<VoltwatchConfig>) -> Self {
        // Safe to call more than once: later calls get a detached handle
        let metrics_handle = crate::metrics::setup_metrics().unwrap_or_else(|e| {
            tracing::debug!("Metrics already initialized, creating new handle: {}", e);
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .build_recorder()
                .handle()
        });

        Self {
            lifecycle,
            config,
            upgrades: UpgradeGuard::new(),
            start_time: Instant::now(),
            metrics_handle,
        }
    }
}

/// Create the router with all endpoints configured.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.server.ws_path, get(websocket::websocket_handler))
        .route("/health", get(health::handle))
        .route("/metrics", get(crate::metrics::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
