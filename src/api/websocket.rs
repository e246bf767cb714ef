//! Event websocket
//!
//! Forwards every broadcast event batch to the client, pings on an interval
//! and drops clients that stay silent past the idle timeout.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;

use super::{AppState, WsSettings};
use crate::events::EventBroadcaster;

/// WebSocket upgrade handler
pub async fn events_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let broadcaster = state.broadcaster.clone();
    let settings = state.ws.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, broadcaster, settings))
}

/// Outgoing message type for WebSocket
enum OutgoingMessage {
    Text(String),
    Ping,
    Pong(Vec<u8>),
}

async fn handle_socket(socket: WebSocket, broadcaster: EventBroadcaster, settings: WsSettings) {
    use futures_util::{SinkExt, StreamExt};

    tracing::info!("🔌 New event subscriber");

    let (mut sender, mut receiver) = socket.split();
    let mut rx = broadcaster.subscribe();

    // Channel for outgoing messages
    let (out_tx, mut out_rx) = tokio::sync::mpsc::channel::<OutgoingMessage>(32);

    let send_task = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let result = match msg {
                OutgoingMessage::Text(text) => sender.send(Message::Text(text)).await,
                OutgoingMessage::Ping => sender.send(Message::Ping(Vec::new())).await,
                OutgoingMessage::Pong(data) => sender.send(Message::Pong(data)).await,
            };
            if result.is_err() {
                break;
            }
        }
    });

    let mut ping = tokio::time::interval(settings.ping_interval);
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            batch = rx.recv() => {
                match batch {
                    Ok(msg) => {
                        if out_tx.send(OutgoingMessage::Text(msg)).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Event subscriber lagging, batches dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            _ = ping.tick() => {
                if last_seen.elapsed() > settings.idle_timeout {
                    tracing::info!("Event subscriber timed out");
                    break;
                }
                if out_tx.send(OutgoingMessage::Ping).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Ping(data))) => {
                        last_seen = Instant::now();
                        if out_tx.send(OutgoingMessage::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(Message::Text(text))) => {
                        last_seen = Instant::now();
                        tracing::debug!("Received WebSocket message: {}", text);
                    }
                    Some(Ok(_)) => last_seen = Instant::now(),
                }
            }
        }
    }

    send_task.abort();
    tracing::info!("🔌 Event subscriber disconnected");
}
