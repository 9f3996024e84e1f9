//! Configuration module for Voltwatch
//!
//! Provides layered configuration loading from files, environment variables, and defaults.
//!
//! # Configuration Precedence
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`VOLTWATCH_*`)
//! 3. Configuration file (TOML)
//! 4. Default values (lowest priority)
//!
//! # Example
//!
//! ```rust
//! use voltwatch::config::VoltwatchConfig;
//!
//! // Load defaults
//! let config = VoltwatchConfig::default();
//! assert_eq!(config.server.port, 3000);
//!
//! // Parse from TOML
//! let toml = r#"
//! [upstream]
//! url = "ws://127.0.0.1:9001/ws"
//! "#;
//! let config: VoltwatchConfig = toml::from_str(toml).unwrap();
//! assert_eq!(config.upstream.url, "ws://127.0.0.1:9001/ws");
//! ```

pub mod error;
pub mod logging;
pub mod relay;
pub mod server;
pub mod upstream;

pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};
pub use relay::RelayConfig;
pub use server::ServerConfig;
pub use upstream::UpstreamConfig;

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Unified configuration for the relay server.
///
/// # Example
///
/// ```rust
/// use voltwatch::config::VoltwatchConfig;
///
/// let config = VoltwatchConfig::default();
/// assert_eq!(config.server.ws_path, "/api/websocket");
/// assert_eq!(config.upstream.reconnect_delay_ms, 5000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct VoltwatchConfig {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Upstream telemetry feed
    pub upstream: UpstreamConfig,
    /// Fan-out settings
    pub relay: RelayConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl VoltwatchConfig {
    /// Load configuration from a TOML file
    ///
    /// If path is None, returns default configuration.
    /// If path doesn't exist, returns NotFound error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.to_path_buf()));
                }
                let content = std::fs::read_to_string(p)?;
                toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supports VOLTWATCH_* environment variables for common settings.
    /// Invalid values are silently ignored (defaults are kept).
    pub fn with_env_overrides(mut self) -> Self {
        // Server settings
        if let Ok(port) = std::env::var("VOLTWATCH_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
        if let Ok(host) = std::env::var("VOLTWATCH_HOST") {
            self.server.host = host;
        }

        // Logging settings
        if let Ok(level) = std::env::var("VOLTWATCH_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("VOLTWATCH_LOG_FORMAT") {
            if let Ok(f) = format.parse() {
                self.logging.format = f;
            }
        }

        // Upstream feed
        if let Ok(url) = std::env::var("VOLTWATCH_UPSTREAM_URL") {
            self.upstream.url = url;
        }
        if let Ok(delay) = std::env::var("VOLTWATCH_RECONNECT_DELAY_MS") {
            if let Ok(d) = delay.parse() {
                self.upstream.reconnect_delay_ms = d;
            }
        }

        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation {
                field: "server.port".to_string(),
                message: "port must be non-zero".to_string(),
            });
        }
        if !self.server.ws_path.starts_with('/') {
            return Err(ConfigError::Validation {
                field: "server.ws_path".to_string(),
                message: "path must start with '/'".to_string(),
            });
        }
        if matches!(self.server.ws_path.as_str(), "/health" | "/metrics") {
            return Err(ConfigError::Validation {
                field: "server.ws_path".to_string(),
                message: format!("'{}' is reserved", self.server.ws_path),
            });
        }

        // Only plain ws:// is supported, the build carries no TLS stack
        if !self.upstream.url.starts_with("ws://") {
            return Err(ConfigError::Validation {
                field: "upstream.url".to_string(),
                message: format!("expected a ws:// URL, got '{}'", self.upstream.url),
            });
        }
        if self.upstream.reconnect_delay_ms == 0 {
            return Err(ConfigError::Validation {
                field: "upstream.reconnect_delay_ms".to_string(),
                message: "reconnect delay must be non-zero".to_string(),
            });
        }
        if self.upstream.connect_timeout_seconds == 0 {
            return Err(ConfigError::Validation {
                field: "upstream.connect_timeout_seconds".to_string(),
                message: "connect timeout must be non-zero".to_string(),
            });
        }

        if self.relay.subscriber_buffer == 0 {
            return Err(ConfigError::Validation {
                field: "relay.subscriber_buffer".to_string(),
                message: "buffer must hold at least one payload".to_string(),
            });
        }

        Ok(())
    }
}
