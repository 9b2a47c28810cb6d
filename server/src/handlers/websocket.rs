//! WebSocket handler for live thread notifications.
//!
//! A connection subscribes to one thread when it is opened. Notifications
//! for that thread are pushed by the comment handlers through the
//! [`ConnectionManager`]; the only client message is a keep-alive ping.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::websocket::{ClientMessage, ConnectionManager, ServerMessage};

/// Handle an established WebSocket connection.
///
/// This function:
/// 1. Registers the connection under the thread's channel
/// 2. Spawns a task to forward outgoing messages
/// 3. Answers pings until the client goes away
/// 4. Cleans up on disconnect
pub async fn handle_websocket_connection(
    socket: WebSocket,
    conn_manager: Arc<ConnectionManager>,
    channel: String,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let conn_id = conn_manager.register(channel.clone(), tx);

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(text) => {
                    if let Err(e) = ws_sender.send(Message::Text(text.into())).await {
                        tracing::warn!("Failed to send WebSocket message: {}", e);
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize WebSocket message: {}", e);
                }
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let response = process_message(&text);
                conn_manager.send_to(&conn_id, response);
            }
            Ok(Message::Binary(_)) => {
                tracing::warn!("Binary messages not supported");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                tracing::debug!(conn_id = %conn_id, "WebSocket close frame received");
                break;
            }
            Err(e) => {
                tracing::warn!(conn_id = %conn_id, "WebSocket error: {}", e);
                break;
            }
        }
    }

    conn_manager.unregister(&conn_id);
    send_task.abort();

    tracing::info!(
        conn_id = %conn_id,
        channel = %channel,
        active_connections = conn_manager.connection_count(),
        "WebSocket client disconnected"
    );
}

/// Answer a client message.
pub fn process_message(text: &str) -> ServerMessage {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Ping) => ServerMessage::pong(),
        Err(e) => ServerMessage::error(format!("Invalid message format: {}", e)),
    }
}
