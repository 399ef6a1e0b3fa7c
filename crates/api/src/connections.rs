//! Live viewer connection registry and fan-out.
//!
//! Each websocket connection registers an outbound channel under a random id
//! for its whole lifetime. Broadcasts serialize the event envelope once and
//! deliver best-effort: a dead connection is logged and skipped, never
//! unregistered here (disconnects are driven by the socket task).

use std::sync::Arc;

use axum::extract::ws::Message;
use dashmap::DashMap;
use rand::{Rng, distr::Alphanumeric};
use shared::api::WsEvent;
use tokio::sync::mpsc;

/// Length of generated connection ids.
const ID_LEN: usize = 13;

/// Registry of live connections keyed by connection id.
///
/// Cloning is cheap; all clones share the same map.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<DashMap<String, mpsc::UnboundedSender<Message>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn generate_id() -> String {
        rand::rng()
            .sample_iter(Alphanumeric)
            .take(ID_LEN)
            .map(char::from)
            .collect()
    }

    /// Register a connection under a fresh id, regenerating until the id does
    /// not collide with a currently registered one.
    pub fn register(&self, sender: mpsc::UnboundedSender<Message>) -> String {
        let mut id = Self::generate_id();
        while self.connections.contains_key(&id) {
            id = Self::generate_id();
        }
        self.connections.insert(id.clone(), sender);
        id
    }

    /// Register a connection under a caller-chosen id.
    pub fn register_with_id(&self, id: impl Into<String>, sender: mpsc::UnboundedSender<Message>) {
        self.connections.insert(id.into(), sender);
    }

    pub fn unregister(&self, id: &str) {
        self.connections.remove(id);
    }

    /// Send an event to a single connection. A missing id is not an error;
    /// the viewer may have disconnected in the meantime.
    pub fn send_to(&self, id: &str, event: &WsEvent) {
        let Some(sender) = self.connections.get(id) else {
            tracing::warn!(id, "no connection registered for id");
            return;
        };
        let message = match serde_json::to_string(event) {
            Ok(message) => message,
            Err(error) => {
                tracing::error!(%error, "failed to serialize event");
                return;
            }
        };
        if sender.send(Message::Text(message.into())).is_err() {
            tracing::warn!(id, "failed to send message to connection");
        }
    }

    /// Broadcast an event to every registered connection. The envelope is
    /// serialized once; a failed send never aborts delivery to the rest.
    pub fn broadcast(&self, event: &WsEvent) {
        let message = match serde_json::to_string(event) {
            Ok(message) => message,
            Err(error) => {
                tracing::error!(%error, "failed to serialize broadcast event");
                return;
            }
        };
        for entry in self.connections.iter() {
            if entry
                .value()
                .send(Message::Text(message.clone().into()))
                .is_err()
            {
                tracing::warn!(id = %entry.key(), "failed to send message to connection");
            }
        }
    }
}
