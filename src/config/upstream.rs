//! Upstream telemetry feed configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where the relay pulls telemetry from and how it reconnects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// WebSocket URL of the backend telemetry feed
    pub url: String,
    /// Fixed delay between a disconnect and the next connection attempt
    pub reconnect_delay_ms: u64,
    /// Upper bound on a single connection attempt
    pub connect_timeout_seconds: u64,
    /// Connect at process start instead of on the first gateway request
    pub connect_on_start: bool,
}

impl UpstreamConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "ws://oriontecno.com/ws".to_string(),
            reconnect_delay_ms: 5000,
            connect_timeout_seconds: 10,
            connect_on_start: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_config_defaults() {
        let config = UpstreamConfig::default();
        assert_eq!(config.url, "ws://oriontecno.com/ws");
        assert_eq!(config.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert!(config.connect_on_start);
    }

    #[test]
    fn test_upstream_config_partial_toml() {
        let config: UpstreamConfig = toml::from_str("reconnect_delay_ms = 250").unwrap();
        assert_eq!(config.reconnect_delay(), Duration::from_millis(250));
        assert_eq!(config.url, "ws://oriontecno.com/ws"); // default
    }
}
