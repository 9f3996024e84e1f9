//! Per-connection upgrade marker.

use dashmap::DashSet;
use std::net::SocketAddr;

/// Remembers which TCP connections already went through a WebSocket upgrade.
///
/// A peer socket address names exactly one live TCP connection, so it is used
/// as the per-connection marker. The mark is held for as long as the upgraded
/// connection lives.
#[derive(Debug, Default)]
pub struct UpgradeGuard {
    upgraded: DashSet<SocketAddr>,
}

impl UpgradeGuard {
    pub fn new() -> Self {
        Self {
            upgraded: DashSet::new(),
        }
    }

    /// Mark a connection as upgraded. Returns `false` if it already was.
    pub fn mark(&self, peer: SocketAddr) -> bool {
        self.upgraded.insert(peer)
    }

    /// Clear the mark once the connection is gone or the handshake failed.
    pub fn release(&self, peer: SocketAddr) {
        self.upgraded.remove(&peer);
    }

    pub fn is_marked(&self, peer: SocketAddr) -> bool {
        self.upgraded.contains(&peer)
    }

    pub fn len(&self) -> usize {
        self.upgraded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upgraded.is_empty()
    }
}
