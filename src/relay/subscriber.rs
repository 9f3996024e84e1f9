//! A single admitted dashboard connection.

use super::error::{RelayError, SendFailureReason};
use super::payload::Payload;
use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Identity of one admission. A new admission always gets a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Readiness of a subscriber transport, mirroring the WebSocket ready states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ReadyState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }
}

/// Ready state shared between the registry entry and the connection task.
#[derive(Debug)]
struct SharedState(AtomicU8);

impl SharedState {
    fn new(state: ReadyState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn get(&self) -> ReadyState {
        ReadyState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: ReadyState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move to `Closing` unless the transport already reached `Closed`.
    fn begin_close(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                match ReadyState::from_u8(current) {
                    ReadyState::Connecting | ReadyState::Open => Some(ReadyState::Closing as u8),
                    ReadyState::Closing | ReadyState::Closed => None,
                }
            });
    }
}

/// Registry-side handle for one dashboard connection.
///
/// Holds the sending half of a bounded FIFO queue. The connection task owns
/// the matching [`SubscriberStream`] and writes whatever arrives to the socket.
#[derive(Debug)]
pub struct Subscriber {
    id: SubscriberId,
    peer: Option<SocketAddr>,
    admitted_at: DateTime<Utc>,
    state: Arc<SharedState>,
    outbound: mpsc::Sender<Payload>,
    closed: CancellationToken,
}

impl Subscriber {
    /// Create a subscriber in the `Open` state together with its stream.
    pub fn open(peer: Option<SocketAddr>, buffer: usize) -> (Self, SubscriberStream) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let state = Arc::new(SharedState::new(ReadyState::Open));
        let closed = CancellationToken::new();
        let id = SubscriberId::new();

        let subscriber = Self {
            id,
            peer,
            admitted_at: Utc::now(),
            state: Arc::clone(&state),
            outbound: tx,
            closed: closed.clone(),
        };
        let stream = SubscriberStream {
            id,
            state,
            inbound: rx,
            closed,
        };
        (subscriber, stream)
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn admitted_at(&self) -> DateTime<Utc> {
        self.admitted_at
    }

    /// Time since admission.
    pub fn connected_for(&self) -> chrono::Duration {
        Utc::now() - self.admitted_at
    }

    pub fn ready_state(&self) -> ReadyState {
        self.state.get()
    }

    pub fn is_open(&self) -> bool {
        self.ready_state() == ReadyState::Open
    }

    /// Queue a payload without waiting.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::SendFailure` when the queue is full or the
    /// connection task has gone away.
    pub fn send(&self, payload: &Payload) -> Result<(), RelayError> {
        self.outbound
            .try_send(payload.clone())
            .map_err(|e| RelayError::SendFailure {
                subscriber: self.id,
                reason: match e {
                    mpsc::error::TrySendError::Full(_) => SendFailureReason::BufferFull,
                    mpsc::error::TrySendError::Closed(_) => SendFailureReason::TransportClosed,
                },
            })
    }

    /// Ask the connection task to send a close frame and stop.
    pub fn close(&self) {
        self.state.begin_close();
        self.closed.cancel();
    }
}

/// Connection-side half of a subscriber: the ordered payload queue.
#[derive(Debug)]
pub struct SubscriberStream {
    id: SubscriberId,
    state: Arc<SharedState>,
    inbound: mpsc::Receiver<Payload>,
    closed: CancellationToken,
}

impl SubscriberStream {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next queued payload.
    ///
    /// After a close request, payloads queued before the close are still
    /// handed out, then `None`. Also `None` once the subscriber was dropped
    /// from the registry and its queue is empty.
    pub async fn recv(&mut self) -> Option<Payload> {
        tokio::select! {
            biased;
            payload = self.inbound.recv() => payload,
            _ = self.closed.cancelled() => None,
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<Payload> {
        self.inbound.try_recv().ok()
    }

    /// True once [`Subscriber::close`] was called.
    pub fn is_close_requested(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub fn ready_state(&self) -> ReadyState {
        self.state.get()
    }

    /// Record that the peer started the closing handshake.
    pub fn mark_closing(&self) {
        self.state.begin_close();
    }

    #[cfg(test)]
    pub(super) fn close_inbound(&mut self) {
        self.inbound.close();
    }

    /// Record that the transport is fully closed.
    pub fn mark_closed(&self) {
        self.state.set(ReadyState::Closed);
    }
}

impl Drop for SubscriberStream {
    fn drop(&mut self) {
        self.state.set(ReadyState::Closed);
    }
}
