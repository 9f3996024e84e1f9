//! Opaque message bodies passed from the upstream feed to subscribers.

use std::sync::Arc;
use tokio_tungstenite::tungstenite::Message;

/// A single upstream message, carried through the relay without inspection.
///
/// The frame kind (text or binary) is kept so that a dashboard receives the
/// same kind of frame the telemetry backend sent. Bodies are reference-counted
/// so fanning out to many subscribers does not copy the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(Arc<str>),
    Binary(Arc<[u8]>),
}

impl Payload {
    pub fn text(body: impl Into<Arc<str>>) -> Self {
        Payload::Text(body.into())
    }

    pub fn binary(body: impl Into<Arc<[u8]>>) -> Self {
        Payload::Binary(body.into())
    }

    /// Convert an upstream frame into a payload.
    ///
    /// Returns `None` for control frames (ping, pong, close, raw frames),
    /// which are never relayed.
    pub fn from_upstream(message: Message) -> Option<Self> {
        match message {
            Message::Text(text) => Some(Payload::Text(Arc::from(text.as_str()))),
            Message::Binary(bytes) => Some(Payload::Binary(Arc::from(&bytes[..]))),
            Message::Ping(_) | Message::Pong(_) | Message::Close(_) | Message::Frame(_) => None,
        }
    }

    /// Size of the body in bytes.
    pub fn len(&self) -> usize {
        match self {
            Payload::Text(text) => text.len(),
            Payload::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Payload::Text(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_frame_kept_verbatim() {
        let body = r#"{"volt":[120,121,119,0]}"#;
        let payload = Payload::from_upstream(Message::text(body)).unwrap();
        assert_eq!(payload, Payload::text(body));
        assert!(payload.is_text());
        assert_eq!(payload.len(), body.len());
    }

    #[test]
    fn test_binary_frame_kept_verbatim() {
        let payload = Payload::from_upstream(Message::binary(vec![0u8, 1, 2, 255])).unwrap();
        assert_eq!(payload, Payload::binary(vec![0u8, 1, 2, 255]));
        assert!(!payload.is_text());
    }

    #[test]
    fn test_control_frames_are_not_relayed() {
        assert!(Payload::from_upstream(Message::Ping(Default::default())).is_none());
        assert!(Payload::from_upstream(Message::Pong(Default::default())).is_none());
        assert!(Payload::from_upstream(Message::Close(None)).is_none());
    }

    #[test]
    fn test_empty_payload() {
        assert!(Payload::text("").is_empty());
        assert!(!Payload::binary(vec![1u8]).is_empty());
    }
}
