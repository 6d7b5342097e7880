//! Registry of live WebSocket connections.

use axum::extract::ws::Message;
use inbox_types::BroadcastMessage;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Unique connection identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to one client channel.
///
/// Frames pushed through [`Connection::send`] are drained by the socket
/// writer in order. A send fails once the writer has gone away.
#[derive(Clone, Debug)]
pub struct Connection {
    id: ConnectionId,
    sender: UnboundedSender<Message>,
}

impl Connection {
    /// Create a connection and the receiving half its socket writer drains.
    pub fn open() -> (Self, UnboundedReceiver<Message>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let connection = Self {
            id: ConnectionId::new(),
            sender,
        };
        (connection, receiver)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn send(&self, frame: Message) -> bool {
        self.sender.send(frame).is_ok()
    }

    /// Serialize and send a single message to this connection only.
    pub fn send_message(&self, message: &BroadcastMessage) -> bool {
        match encode(message) {
            Some(frame) => self.send(frame),
            None => false,
        }
    }
}

fn encode(message: &BroadcastMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(text) => Some(Message::Text(text)),
        Err(e) => {
            tracing::error!("Failed to serialize {} message: {}", message.type_name(), e);
            None
        }
    }
}

/// Set of currently connected clients.
///
/// Cheap to clone; all clones share the same set.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<ConnectionId, Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, connection: Connection) {
        let id = connection.id();
        self.inner.write().await.insert(id, connection);
        tracing::debug!(connection_id = %id, "Connection registered");
    }

    /// Remove a connection. Unknown ids are ignored.
    pub async fn unregister(&self, id: ConnectionId) {
        if self.inner.write().await.remove(&id).is_some() {
            tracing::debug!(connection_id = %id, "Connection unregistered");
        }
    }

    /// Send `message` to every connection registered at call time.
    ///
    /// Connections whose send fails are dropped from the set. Returns the
    /// number of connections the message was handed to.
    pub async fn broadcast(&self, message: &BroadcastMessage) -> usize {
        let Some(frame) = encode(message) else {
            return 0;
        };

        let recipients: Vec<Connection> = self.inner.read().await.values().cloned().collect();
        if recipients.is_empty() {
            return 0;
        }

        let mut failed = Vec::new();
        for connection in &recipients {
            if !connection.send(frame.clone()) {
                failed.push(connection.id());
            }
        }

        if !failed.is_empty() {
            let mut guard = self.inner.write().await;
            for id in &failed {
                guard.remove(id);
                tracing::debug!(connection_id = %id, "Dropped connection after failed send");
            }
        }

        let delivered = recipients.len() - failed.len();
        tracing::trace!(
            message_type = message.type_name(),
            delivered,
            dropped = failed.len(),
            "Broadcast complete"
        );
        delivered
    }

    #[cfg(test)]
    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.inner.read().await.contains_key(&id)
    }

    /// Number of connected clients.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
