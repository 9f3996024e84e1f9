//! WebSocket gateway for dashboard subscribers

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{Sink, SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::gateway::{AppState, GatewayError};
use crate::relay::{Payload, SubscriberStream};

/// Handles dashboard requests on the gateway path.
///
/// Every call makes sure the upstream connector is running. A plain request
/// gets an empty `200 OK`; an upgrade request is admitted as a subscriber,
/// once per underlying connection.
pub async fn websocket_handler(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    state.lifecycle.ensure_started();

    if state.lifecycle.is_shutting_down() {
        return GatewayError::ShuttingDown.into_response();
    }

    let Some(ws) = ws else {
        return StatusCode::OK.into_response();
    };

    let peer = connect_info.map(|ConnectInfo(addr)| addr);
    if let Some(addr) = peer {
        if !state.upgrades.mark(addr) {
            tracing::warn!(peer = %addr, "Ignoring repeated upgrade on an upgraded connection");
            return GatewayError::DoubleUpgrade(addr).into_response();
        }
    }

    let failed = Arc::clone(&state);
    ws.on_failed_upgrade(move |e| {
        tracing::warn!(peer = ?peer, error = %e, "WebSocket handshake failed");
        if let Some(addr) = peer {
            failed.upgrades.release(addr);
        }
    })
    .on_upgrade(move |socket| handle_socket(socket, state, peer))
}

/// Runs one admitted subscriber until either side closes.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, peer: Option<SocketAddr>) {
    let relay = Arc::clone(state.lifecycle.relay());
    let (subscriber, stream) = relay.admit(peer);
    let subscriber_id = subscriber.id();
    let admitted_at = subscriber.admitted_at();

    // Shutdown may have drained the registry while the handshake was running
    if state.lifecycle.is_shutting_down() {
        subscriber.close();
        relay.remove(subscriber_id);
    }
    drop(subscriber);

    tracing::info!(
        subscriber_id = %subscriber_id,
        peer = ?peer,
        subscribers = relay.subscriber_count(),
        "Dashboard subscriber connected"
    );

    let (sender, mut receiver) = socket.split();
    let mut send_task = tokio::spawn(forward_payloads(stream, sender));

    // Dashboards only listen; drain their frames to notice close and errors
    let mut recv_task = tokio::spawn(async move {
        while let Some(frame) = receiver.next().await {
            match frame? {
                Message::Close(_) => break,
                _ => {
                    // axum answers pings itself, anything else is ignored
                }
            }
        }
        Ok::<(), axum::Error>(())
    });

    let outcome = tokio::select! {
        result = &mut send_task => {
            recv_task.abort();
            result
        }
        result = &mut recv_task => {
            send_task.abort();
            result
        }
    };

    relay.remove(subscriber_id);
    if let Some(addr) = peer {
        state.upgrades.release(addr);
    }

    let connected_for_ms = (chrono::Utc::now() - admitted_at).num_milliseconds();
    match outcome {
        Ok(Ok(())) => tracing::info!(
            subscriber_id = %subscriber_id,
            connected_for_ms,
            subscribers = relay.subscriber_count(),
            "Dashboard subscriber disconnected"
        ),
        Ok(Err(e)) => tracing::warn!(
            subscriber_id = %subscriber_id,
            connected_for_ms,
            error = %e,
            "WebSocket error, subscriber removed"
        ),
        Err(e) => tracing::error!(
            subscriber_id = %subscriber_id,
            error = %e,
            "Subscriber connection task failed"
        ),
    }
}

/// Writes queued payloads to the socket, then a close frame once the relay
/// closes the subscriber.
async fn forward_payloads<S>(mut stream: SubscriberStream, mut sender: S) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    while let Some(payload) = stream.recv().await {
        sender.send(to_message(payload)).await?;
    }

    if stream.is_close_requested() {
        stream.mark_closing();
        sender.send(Message::Close(None)).await?;
    }
    stream.mark_closed();
    Ok(())
}

/// Payloads keep their frame kind on the way out.
fn to_message(payload: Payload) -> Message {
    match payload {
        Payload::Text(text) => Message::Text(text.to_string()),
        Payload::Binary(bytes) => Message::Binary(bytes.to_vec()),
    }
}
