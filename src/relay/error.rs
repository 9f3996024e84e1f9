//! Error types for the fan-out relay.

use super::SubscriberId;
use thiserror::Error;

/// Why a payload could not be handed to a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFailureReason {
    /// The subscriber's outbound queue is full (slow consumer)
    BufferFull,
    /// The connection task is gone
    TransportClosed,
}

impl std::fmt::Display for SendFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendFailureReason::BufferFull => write!(f, "outbound buffer full"),
            SendFailureReason::TransportClosed => write!(f, "transport closed"),
        }
    }
}

/// Errors raised by relay operations.
#[derive(Debug, Clone, Error)]
pub enum RelayError {
    #[error("send to subscriber {subscriber} failed: {reason}")]
    SendFailure {
        subscriber: SubscriberId,
        reason: SendFailureReason,
    },
}
