//! WebSocket message protocol definitions.
//!
//! All messages are JSON objects discriminated by `type`. Thread
//! notifications go out in the exact shape the engine's push handler parses.

use serde::{Deserialize, Serialize};
use threadline_engine::Notification;

/// Messages sent from client to server.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Keep-alive ping.
    Ping,
}

/// Connection-level replies that are not thread notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Control {
    /// Response to ping.
    Pong,
    /// Error message.
    Error { message: String },
}

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// A change in the subscribed thread.
    Notification(Notification),
    Control(Control),
}

impl ServerMessage {
    pub fn pong() -> Self {
        ServerMessage::Control(Control::Pong)
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Control(Control::Error {
            message: message.into(),
        })
    }
}

impl From<Notification> for ServerMessage {
    fn from(notification: Notification) -> Self {
        ServerMessage::Notification(notification)
    }
}
