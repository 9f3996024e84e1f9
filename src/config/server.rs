//! Server configuration

use serde::{Deserialize, Serialize};

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Path of the WebSocket gateway endpoint
    pub ws_path: String,
    /// Upper bound on waiting for the upstream link to close at shutdown
    pub shutdown_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            ws_path: "/api/websocket".to_string(),
            shutdown_timeout_seconds: 5,
        }
    }
}
