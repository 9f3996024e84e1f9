//! Upstream connector.
//!
//! Owns the one outbound WebSocket link to the backend telemetry feed. A single
//! supervisor task connects, pumps every data frame into the [`Relay`], and on
//! any close or error waits a fixed delay before trying again. Because the
//! reconnect timer lives inside that one loop, there is never more than one
//! attempt in flight and a stale timer cannot race a fresh link.

mod error;
mod state;

pub use error::UpstreamError;
pub use state::LinkState;

use crate::config::UpstreamConfig;
use crate::relay::{Payload, Relay};
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

type UpstreamLink = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How a pumped link came to an end.
enum LinkEnd {
    Shutdown,
    Lost(UpstreamError),
}

/// Background service that keeps the upstream link alive.
pub struct UpstreamConnector {
    config: UpstreamConfig,
    relay: Arc<Relay>,
    state: watch::Sender<LinkState>,
    /// Successful connects since start
    generation: AtomicU64,
    started: AtomicBool,
}

impl UpstreamConnector {
    pub fn new(config: UpstreamConfig, relay: Arc<Relay>) -> Self {
        let (state, _) = watch::channel(LinkState::Uninitialized);
        Self {
            config,
            relay,
            state,
            generation: AtomicU64::new(0),
            started: AtomicBool::new(false),
        }
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Start the supervisor task.
    ///
    /// Idempotent: only the first call spawns anything. Calls made outside a
    /// Tokio runtime, or after `cancel` already fired, are no-ops as well.
    /// Returns the supervisor's handle when this call started it.
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        if tokio::runtime::Handle::try_current().is_err() {
            tracing::debug!("No async runtime available, upstream connect skipped");
            return None;
        }
        if cancel.is_cancelled() {
            return None;
        }
        if self.started.swap(true, Ordering::AcqRel) {
            return None;
        }

        self.set_state(LinkState::Connecting);
        let connector = Arc::clone(self);
        Some(tokio::spawn(async move { connector.run(cancel).await }))
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!(
            url = %self.config.url,
            reconnect_delay_ms = self.config.reconnect_delay_ms,
            "Upstream connector started"
        );

        loop {
            self.set_state(LinkState::Connecting);

            let attempt = tokio::select! {
                _ = cancel.cancelled() => break,
                attempt = self.open_link() => attempt,
            };

            match attempt {
                Ok(link) => {
                    let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
                    self.set_state(LinkState::Connected { generation });
                    metrics::counter!("voltwatch_upstream_connects_total").increment(1);
                    metrics::gauge!("voltwatch_upstream_connected").set(1.0);
                    tracing::info!(
                        url = %self.config.url,
                        generation,
                        "Connected to upstream telemetry feed"
                    );

                    let end = self.pump(link, &cancel).await;
                    metrics::gauge!("voltwatch_upstream_connected").set(0.0);

                    match end {
                        LinkEnd::Shutdown => break,
                        LinkEnd::Lost(e) => {
                            metrics::counter!("voltwatch_upstream_disconnects_total").increment(1);
                            tracing::warn!(generation, error = %e, "Upstream link lost");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        url = %self.config.url,
                        error = %e,
                        "Upstream connection attempt failed"
                    );
                }
            }

            self.set_state(LinkState::Disconnected);
            tracing::info!(
                delay_ms = self.config.reconnect_delay_ms,
                "Reconnecting to upstream after delay"
            );

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.reconnect_delay()) => {}
            }
        }

        self.set_state(LinkState::Shutdown);
        tracing::info!("Upstream connector stopped");
    }

    async fn open_link(&self) -> Result<UpstreamLink, UpstreamError> {
        let started = Instant::now();
        let connect = connect_async(self.config.url.as_str());
        match tokio::time::timeout(self.config.connect_timeout(), connect).await {
            Ok(Ok((link, _response))) => {
                metrics::histogram!("voltwatch_upstream_connect_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                Ok(link)
            }
            Ok(Err(e)) => Err(UpstreamError::Connect(e)),
            Err(_) => Err(UpstreamError::ConnectTimeout(
                self.config.connect_timeout_seconds,
            )),
        }
    }

    /// Forward frames from an open link until it ends or shutdown fires.
    async fn pump(&self, mut link: UpstreamLink, cancel: &CancellationToken) -> LinkEnd {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    if let Err(e) = link.close(None).await {
                        tracing::debug!(error = %e, "Upstream close handshake failed");
                    }
                    return LinkEnd::Shutdown;
                }
                frame = link.next() => match frame {
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|r| !r.is_empty());
                        return LinkEnd::Lost(UpstreamError::Closed { reason });
                    }
                    Some(Ok(message)) => {
                        if let Some(payload) = Payload::from_upstream(message) {
                            self.relay.broadcast(&payload);
                        }
                    }
                    Some(Err(e)) => return LinkEnd::Lost(UpstreamError::Transport(e)),
                    None => return LinkEnd::Lost(UpstreamError::Closed { reason: None }),
                }
            }
        }
    }

    /// Record the terminal state for a connector that was never started.
    pub(crate) fn mark_shutdown(&self) {
        self.set_state(LinkState::Shutdown);
    }

    fn set_state(&self, next: LinkState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!(from = %previous, to = %next, "Upstream link state changed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn unreachable_config() -> UpstreamConfig {
        UpstreamConfig {
            // Port 9 (discard) on loopback is closed on any test machine
            url: "ws://127.0.0.1:9/ws".to_string(),
            reconnect_delay_ms: 50,
            connect_timeout_seconds: 1,
            connect_on_start: true,
        }
    }

    #[test]
    fn test_new_connector_is_uninitialized() {
        let connector = UpstreamConnector::new(unreachable_config(), Arc::new(Relay::new(4)));
        assert_eq!(connector.state(), LinkState::Uninitialized);
        assert_eq!(connector.generation(), 0);
        assert!(!connector.is_started());
    }

    #[test]
    fn test_start_outside_runtime_is_noop() {
        let connector = Arc::new(UpstreamConnector::new(
            unreachable_config(),
            Arc::new(Relay::new(4)),
        ));
        assert!(connector.start(CancellationToken::new()).is_none());
        assert!(!connector.is_started());
        assert_eq!(connector.state(), LinkState::Uninitialized);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let connector = Arc::new(UpstreamConnector::new(
            unreachable_config(),
            Arc::new(Relay::new(4)),
        ));
        let cancel = CancellationToken::new();

        let first = connector.start(cancel.clone());
        let second = connector.start(cancel.clone());

        assert!(first.is_some());
        assert!(second.is_none());
        assert!(connector.is_started());

        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(2), first.unwrap()).await;
        assert!(result.is_ok());
        assert_eq!(connector.state(), LinkState::Shutdown);
    }

    #[tokio::test]
    async fn test_start_after_cancel_is_noop() {
        let connector = Arc::new(UpstreamConnector::new(
            unreachable_config(),
            Arc::new(Relay::new(4)),
        ));
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(connector.start(cancel).is_none());
        assert_eq!(connector.state(), LinkState::Uninitialized);
    }

    #[tokio::test]
    async fn test_failed_connect_goes_disconnected_and_retries() {
        let connector = Arc::new(UpstreamConnector::new(
            unreachable_config(),
            Arc::new(Relay::new(4)),
        ));
        let mut states = connector.watch_state();
        let cancel = CancellationToken::new();
        let handle = connector.start(cancel.clone()).unwrap();

        // Refused connect -> Disconnected -> (delay) -> Connecting again.
        let wait = async {
            states
                .wait_for(|s| *s == LinkState::Disconnected)
                .await
                .unwrap();
            states.wait_for(|s| *s == LinkState::Connecting).await.unwrap();
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .expect("connector did not retry");

        assert_eq!(connector.generation(), 0);

        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(connector.state(), LinkState::Shutdown);
    }
}
