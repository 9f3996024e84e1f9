//! Voltwatch - WebSocket relay for a power-quality dashboard
//!
//! Keeps a single connection to the backend telemetry feed and fans every
//! frame it receives out to the dashboards connected through the gateway.
//!
//! - [`upstream`] owns the outbound link and its fixed-delay reconnect
//! - [`relay`] holds the subscriber registry and broadcasts payloads
//! - [`gateway`] admits dashboards over HTTP upgrade
//! - [`lifecycle`] starts the link once and tears everything down on shutdown

pub mod cli;
pub mod config;
pub mod gateway;
pub mod lifecycle;
pub mod logging;
pub mod metrics;
pub mod relay;
pub mod upstream;
