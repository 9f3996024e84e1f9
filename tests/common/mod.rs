//! Shared test utilities for Voltwatch integration tests.
//!
//! Provides a mock upstream telemetry feed, a relay server bound to an
//! ephemeral port, and dashboard client helpers.

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, connect_async, MaybeTlsStream, WebSocketStream};
use voltwatch::cli::serve::{build_app, serve_until};
use voltwatch::config::VoltwatchConfig;
use voltwatch::gateway::AppState;
use voltwatch::lifecycle::ShutdownReport;
use voltwatch::upstream::LinkState;

// =============================================================================
// Well-Known Test Constants
// =============================================================================

/// Upper bound for anything a test waits on
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Sample reading as the backend feed publishes it
pub const VOLT_READING: &str = r#"{"volt":[120,121,119,0]}"#;

pub type DashboardClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Mock Upstream
// =============================================================================

/// One accepted connection from the relay to the mock feed.
pub struct MockLink {
    ws: WebSocketStream<TcpStream>,
    pub accepted_at: Instant,
}

impl MockLink {
    pub async fn send_text(&mut self, text: &str) {
        self.ws.send(Message::text(text)).await.unwrap();
    }

    pub async fn send_binary(&mut self, bytes: Vec<u8>) {
        self.ws.send(Message::binary(bytes)).await.unwrap();
    }

    /// Close the link from the feed side.
    pub async fn close(mut self) {
        self.ws.close(None).await.unwrap();
        // Drain until the relay acknowledges or drops the socket
        let _ = tokio::time::timeout(TEST_TIMEOUT, async {
            while let Some(Ok(_)) = self.ws.next().await {}
        })
        .await;
    }

    /// Drop the TCP connection without a close handshake.
    pub fn drop_connection(self) {
        drop(self.ws);
    }

    /// True once the relay sends a close frame or drops the connection.
    pub async fn closed_by_relay(&mut self) -> bool {
        let wait = async {
            loop {
                match self.ws.next().await {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return true,
                    Some(Ok(_)) => continue,
                }
            }
        };
        tokio::time::timeout(TEST_TIMEOUT, wait)
            .await
            .unwrap_or(false)
    }
}

/// A WebSocket server standing in for the backend telemetry feed.
pub struct MockUpstream {
    addr: SocketAddr,
    links: mpsc::UnboundedReceiver<MockLink>,
    task: JoinHandle<()>,
}

impl MockUpstream {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, links) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let accepted_at = Instant::now();
                if let Ok(ws) = accept_async(stream).await {
                    if tx.send(MockLink { ws, accepted_at }).is_err() {
                        break;
                    }
                }
            }
        });

        Self { addr, links, task }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Wait for the relay to open its next link.
    pub async fn next_link(&mut self) -> MockLink {
        tokio::time::timeout(TEST_TIMEOUT, self.links.recv())
            .await
            .expect("relay did not connect to the mock upstream")
            .expect("mock upstream stopped")
    }

    /// The next link if one shows up within `within`.
    pub async fn try_next_link(&mut self, within: Duration) -> Option<MockLink> {
        tokio::time::timeout(within, self.links.recv())
            .await
            .ok()
            .flatten()
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// =============================================================================
// Relay Server
// =============================================================================

/// Config pointing at `upstream_url` with a short reconnect delay.
pub fn relay_config(upstream_url: &str, reconnect_delay_ms: u64) -> VoltwatchConfig {
    let mut config = VoltwatchConfig::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.shutdown_timeout_seconds = 2;
    config.upstream.url = upstream_url.to_string();
    config.upstream.reconnect_delay_ms = reconnect_delay_ms;
    config.upstream.connect_timeout_seconds = 2;
    config
}

/// A relay served on an ephemeral port until [`shutdown`](Self::shutdown).
pub struct RelayServer {
    pub addr: SocketAddr,
    pub state: Arc<AppState>,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<std::io::Result<ShutdownReport>>,
}

impl RelayServer {
    pub async fn start(config: VoltwatchConfig) -> Self {
        let connect_on_start = config.upstream.connect_on_start;
        let (app, state) = build_app(config);
        if connect_on_start {
            state.lifecycle.ensure_started();
        }

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(serve_until(listener, app, Arc::clone(&state), async move {
            let _ = stopped.await;
        }));

        Self {
            addr,
            state,
            stop: Some(stop),
            handle,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}{}", self.addr, self.state.config.server.ws_path)
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lifecycle.relay().subscriber_count()
    }

    pub fn link_state(&self) -> LinkState {
        self.state.lifecycle.link_state()
    }

    /// Wait until the upstream link reports `generation`.
    pub async fn wait_for_generation(&self, generation: u64) {
        let mut states = self.state.lifecycle.watch_link_state();
        tokio::time::timeout(
            TEST_TIMEOUT,
            states.wait_for(|s| *s == LinkState::Connected { generation }),
        )
        .await
        .expect("upstream link did not connect")
        .unwrap();
    }

    pub async fn wait_for_subscribers(&self, count: usize) {
        wait_until("subscriber count", || self.subscriber_count() == count).await;
    }

    /// Fire the shutdown signal and wait for the server to stop.
    pub async fn shutdown(mut self) -> ShutdownReport {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        tokio::time::timeout(TEST_TIMEOUT, &mut self.handle)
            .await
            .expect("relay did not stop")
            .unwrap()
            .unwrap()
    }
}

// =============================================================================
// Dashboard Clients
// =============================================================================

pub async fn connect_dashboard(url: &str) -> DashboardClient {
    let (client, _response) = tokio::time::timeout(TEST_TIMEOUT, connect_async(url))
        .await
        .expect("dashboard connect timed out")
        .unwrap();
    client
}

/// Next data frame delivered to a dashboard.
pub async fn next_frame(client: &mut DashboardClient) -> Message {
    let wait = async {
        loop {
            match client.next().await {
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(message)) => return message,
                other => panic!("dashboard stream ended: {:?}", other),
            }
        }
    };
    tokio::time::timeout(TEST_TIMEOUT, wait)
        .await
        .expect("no frame delivered to dashboard")
}

/// True if nothing arrives on the dashboard within `within`.
pub async fn stays_silent(client: &mut DashboardClient, within: Duration) -> bool {
    tokio::time::timeout(within, client.next()).await.is_err()
}

/// True once the relay closes the dashboard connection.
pub async fn closed_by_relay(client: &mut DashboardClient) -> bool {
    let wait = async {
        loop {
            match client.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return true,
                Some(Ok(_)) => continue,
            }
        }
    };
    tokio::time::timeout(TEST_TIMEOUT, wait)
        .await
        .unwrap_or(false)
}

/// Poll `condition` until it holds, panicking after [`TEST_TIMEOUT`].
pub async fn wait_until<F: Fn() -> bool>(what: &str, condition: F) {
    let deadline = Instant::now() + TEST_TIMEOUT;
    while !condition() {
        if Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
