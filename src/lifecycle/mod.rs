//! Process-wide relay lifecycle.
//!
//! One [`LifecycleController`] is built at startup and shared with the gateway
//! through `AppState`. It owns the relay, the upstream connector and the
//! cancellation token that ends both.

use crate::config::VoltwatchConfig;
use crate::relay::Relay;
use crate::upstream::{LinkState, UpstreamConnector};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// What a shutdown actually tore down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Subscribers closed and removed
    pub subscribers_closed: usize,
    /// Upstream supervisor finished within the timeout
    pub upstream_stopped: bool,
}

/// Owner of the relay, the upstream link and shutdown.
pub struct LifecycleController {
    relay: Arc<Relay>,
    upstream: Arc<UpstreamConnector>,
    cancel_token: CancellationToken,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    shutting_down: AtomicBool,
    shutdown_timeout: Duration,
}

impl LifecycleController {
    /// Build the controller. Nothing connects until [`ensure_started`](Self::ensure_started).
    pub fn new(config: &VoltwatchConfig) -> Self {
        let relay = Arc::new(Relay::new(config.relay.subscriber_buffer));
        let upstream = Arc::new(UpstreamConnector::new(
            config.upstream.clone(),
            Arc::clone(&relay),
        ));

        Self {
            relay,
            upstream,
            cancel_token: CancellationToken::new(),
            supervisor: Mutex::new(None),
            shutting_down: AtomicBool::new(false),
            shutdown_timeout: Duration::from_secs(config.server.shutdown_timeout_seconds),
        }
    }

    /// Start the upstream connector if it is not running yet.
    ///
    /// Moves `Uninitialized -> Connecting` on the first call; every later
    /// call, and any call after shutdown began, does nothing.
    pub fn ensure_started(&self) {
        // Checked under the slot lock so shutdown always sees a started supervisor
        let mut slot = match self.supervisor.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if self.is_shutting_down() {
            return;
        }
        if let Some(handle) = self.upstream.start(self.cancel_token.clone()) {
            *slot = Some(handle);
        }
    }

    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    pub fn upstream(&self) -> &Arc<UpstreamConnector> {
        &self.upstream
    }

    pub fn link_state(&self) -> LinkState {
        self.upstream.state()
    }

    pub fn watch_link_state(&self) -> watch::Receiver<LinkState> {
        self.upstream.watch_state()
    }

    /// Token cancelled when shutdown begins.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Close every subscriber and the upstream link. No reconnect follows.
    ///
    /// Safe to call more than once; later calls report nothing closed.
    pub async fn shutdown(&self) -> ShutdownReport {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return ShutdownReport::default();
        }

        tracing::info!(
            subscribers = self.relay.subscriber_count(),
            "Closing relay connections"
        );
        self.cancel_token.cancel();

        let subscribers_closed = self.relay.close_all();

        let handle = match self.supervisor.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let upstream_stopped = match handle {
            Some(handle) => match tokio::time::timeout(self.shutdown_timeout, handle).await {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Upstream connector task failed");
                    false
                }
                Err(_) => {
                    tracing::warn!(
                        timeout_seconds = self.shutdown_timeout.as_secs(),
                        "Upstream connector did not stop in time"
                    );
                    false
                }
            },
            // Never started, nothing to wait for
            None => {
                self.upstream.mark_shutdown();
                true
            }
        };

        tracing::info!(subscribers_closed, upstream_stopped, "Relay shut down");
        ShutdownReport {
            subscribers_closed,
            upstream_stopped,
        }
    }
}
