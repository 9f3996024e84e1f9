//! Fan-out relay.
//!
//! Duplicates every upstream message to all admitted dashboard connections.
//! Delivery is best effort and at most once per subscriber per message:
//! a subscriber that cannot take a message is closed and dropped on the spot,
//! it never gets a retry. Per-subscriber order follows upstream arrival order
//! because broadcasts run one at a time and every subscriber queue is FIFO.

mod error;
mod payload;
mod registry;
mod subscriber;


pub use error::*;
pub use payload::Payload;
pub use registry::SubscriberRegistry;
pub use subscriber::{ReadyState, Subscriber, SubscriberId, SubscriberStream};

use std::net::SocketAddr;
use std::sync::Arc;

/// Per-broadcast delivery counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Subscribers that accepted the payload
    pub delivered: usize,
    /// Subscribers passed over because they were not open
    pub skipped: usize,
    /// Subscribers closed and removed because the send failed
    pub pruned: usize,
}

/// The fan-out relay: subscriber registry plus broadcast logic.
///
/// # Examples
///
/// ```
/// use voltwatch::relay::{Payload, Relay};
///
/// let relay = Relay::new(16);
/// let (_a, mut stream_a) = relay.admit(None);
/// let (_b, mut stream_b) = relay.admit(None);
///
/// let outcome = relay.broadcast(&Payload::text(r#"{"volt":[120,121,119,0]}"#));
/// assert_eq!(outcome.delivered, 2);
/// assert_eq!(stream_a.try_recv(), Some(Payload::text(r#"{"volt":[120,121,119,0]}"#)));
/// assert_eq!(stream_b.try_recv(), Some(Payload::text(r#"{"volt":[120,121,119,0]}"#)));
/// ```
#[derive(Debug)]
pub struct Relay {
    registry: SubscriberRegistry,
    subscriber_buffer: usize,
}

impl Relay {
    /// Create a relay whose subscribers each queue up to `subscriber_buffer`
    /// undelivered payloads before being treated as failed.
    pub fn new(subscriber_buffer: usize) -> Self {
        Self {
            registry: SubscriberRegistry::new(),
            subscriber_buffer,
        }
    }

    /// Admit a new subscriber and return its registry handle and stream.
    pub fn admit(&self, peer: Option<SocketAddr>) -> (Arc<Subscriber>, SubscriberStream) {
        let (subscriber, stream) = Subscriber::open(peer, self.subscriber_buffer);
        let subscriber = self.registry.insert(subscriber);
        tracing::debug!(
            subscriber_id = %subscriber.id(),
            subscribers = self.registry.len(),
            "Subscriber added to registry"
        );
        (subscriber, stream)
    }

    /// Drop a subscriber from the registry. Safe to call more than once.
    pub fn remove(&self, id: SubscriberId) -> bool {
        let removed = self.registry.remove(id).is_some();
        if removed {
            tracing::debug!(
                subscriber_id = %id,
                subscribers = self.registry.len(),
                "Subscriber removed from registry"
            );
        }
        removed
    }

    /// Push one payload to every open subscriber.
    pub fn broadcast(&self, payload: &Payload) -> BroadcastOutcome {
        let mut outcome = BroadcastOutcome::default();
        metrics::counter!("voltwatch_upstream_messages_total").increment(1);

        for subscriber in self.registry.snapshot() {
            if !subscriber.is_open() {
                outcome.skipped += 1;
                continue;
            }

            match subscriber.send(payload) {
                Ok(()) => outcome.delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        subscriber_id = %subscriber.id(),
                        peer = ?subscriber.peer(),
                        error = %e,
                        "Error sending data to subscriber, dropping it"
                    );
                    subscriber.close();
                    self.registry.remove(subscriber.id());
                    outcome.pruned += 1;
                }
            }
        }

        metrics::counter!("voltwatch_deliveries_total").increment(outcome.delivered as u64);
        if outcome.pruned > 0 {
            metrics::counter!("voltwatch_send_failures_total").increment(outcome.pruned as u64);
        }

        tracing::trace!(
            bytes = payload.len(),
            delivered = outcome.delivered,
            skipped = outcome.skipped,
            pruned = outcome.pruned,
            "Broadcast complete"
        );
        outcome
    }

    /// Close every subscriber and empty the registry. Returns how many were closed.
    pub fn close_all(&self) -> usize {
        let drained = self.registry.drain();
        for subscriber in &drained {
            subscriber.close();
        }
        drained.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    pub fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }
}
