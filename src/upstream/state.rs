//! Upstream link state machine.

/// Lifecycle of the single upstream link.
///
/// ```text
/// Uninitialized -> Connecting -> Connected -> Disconnected -> Connecting -> ...
///                                     any state -> Shutdown (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Nothing has asked for the upstream yet
    Uninitialized,
    /// A connection attempt is in flight
    Connecting,
    /// Link is open; `generation` counts successful connects since start
    Connected { generation: u64 },
    /// Link dropped, waiting out the reconnect delay
    Disconnected,
    /// Process is shutting down, no further attempts
    Shutdown,
}

impl LinkState {
    pub fn is_connected(&self) -> bool {
        matches!(self, LinkState::Connected { .. })
    }

    pub fn is_shutdown(&self) -> bool {
        matches!(self, LinkState::Shutdown)
    }

    /// Short lowercase label for logs and the health endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Uninitialized => "uninitialized",
            LinkState::Connecting => "connecting",
            LinkState::Connected { .. } => "connected",
            LinkState::Disconnected => "disconnected",
            LinkState::Shutdown => "shutdown",
        }
    }
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
