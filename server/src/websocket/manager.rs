//! WebSocket connection manager.
//!
//! Tracks active WebSocket connections grouped by the thread channel they
//! subscribed to, and fans notifications out to every subscriber.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use super::ServerMessage;

/// Sender for WebSocket messages.
pub type MessageSender = mpsc::UnboundedSender<ServerMessage>;

/// A single WebSocket connection.
#[derive(Debug)]
pub struct Connection {
    /// Unique identifier for this connection
    pub id: String,
    /// Thread channel, e.g. `comments_listing_7`
    pub channel: String,
    /// Channel to send messages to this connection
    pub sender: MessageSender,
}

/// Manages active WebSocket connections.
///
/// Thread-safe and can be shared across handlers via `Arc`.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    /// All active connections, keyed by connection ID.
    connections: DashMap<String, Connection>,
    /// Connection IDs per thread channel.
    by_channel: DashMap<String, Vec<String>>,
}

impl ConnectionManager {
    /// Create a new connection manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new connection manager wrapped in Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a new connection subscribed to `channel`.
    ///
    /// Returns the connection ID.
    pub fn register(&self, channel: String, sender: MessageSender) -> String {
        let conn_id = uuid::Uuid::new_v4().to_string();

        let connection = Connection {
            id: conn_id.clone(),
            channel: channel.clone(),
            sender,
        };

        self.connections.insert(conn_id.clone(), connection);
        self.by_channel
            .entry(channel.clone())
            .or_default()
            .push(conn_id.clone());

        tracing::info!(conn_id = %conn_id, channel = %channel, "WebSocket connection registered");

        conn_id
    }

    /// Unregister a connection.
    pub fn unregister(&self, conn_id: &str) {
        if let Some((_, conn)) = self.connections.remove(conn_id) {
            if let Some(mut conn_ids) = self.by_channel.get_mut(&conn.channel) {
                conn_ids.retain(|id| id != conn_id);
                if conn_ids.is_empty() {
                    drop(conn_ids);
                    self.by_channel.remove(&conn.channel);
                }
            }

            tracing::info!(conn_id = %conn.id, channel = %conn.channel, "WebSocket connection unregistered");
        }
    }

    /// Send a message to every subscriber of `channel`.
    ///
    /// Returns the number of connections that received the message.
    pub fn broadcast(&self, channel: &str, message: ServerMessage) -> usize {
        // Snapshot the ids so no index shard lock is held while sending.
        let conn_ids = match self.by_channel.get(channel) {
            Some(ids) => ids.clone(),
            None => return 0,
        };

        let sent_count = conn_ids
            .iter()
            .filter(|id| self.send_to(id, message.clone()))
            .count();

        tracing::debug!(channel = %channel, recipients = sent_count, "Broadcast notification");

        sent_count
    }

    /// Send a message to a specific connection.
    pub fn send_to(&self, conn_id: &str, message: ServerMessage) -> bool {
        match self.connections.get(conn_id) {
            Some(conn) => conn.sender.send(message).is_ok(),
            None => false,
        }
    }

    /// Get the number of active connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Get the number of threads with at least one subscriber.
    pub fn channel_count(&self) -> usize {
        self.by_channel.len()
    }
}
