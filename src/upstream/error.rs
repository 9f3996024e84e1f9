//! Error types for the upstream connector.

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Ways the upstream telemetry feed can be unavailable.
///
/// None of these reach subscribers. They are logged and followed by a
/// reconnect after the fixed delay.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Handshake or TCP connect failed
    #[error("connect failed: {0}")]
    Connect(#[source] tungstenite::Error),

    /// Connect attempt exceeded the configured timeout
    #[error("connect timed out after {0}s")]
    ConnectTimeout(u64),

    /// Peer closed the link
    #[error("link closed by upstream{}", .reason.as_deref().map(|r| format!(": {}", r)).unwrap_or_default())]
    Closed { reason: Option<String> },

    /// Read failed on an open link
    #[error("transport error: {0}")]
    Transport(#[source] tungstenite::Error),
}
