use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

use parley_types::events::GatewayEvent;

/// Per-connection outbound channels: connection id -> sender feeding that
/// connection's WebSocket task. Delivery to a connection that has already
/// gone away is a soft failure local to that one id — it never aborts the
/// rest of a fan-out.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RwLock<HashMap<Uuid, mpsc::UnboundedSender<GatewayEvent>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel for a connection. Returns the receiving half for
    /// the connection's send task.
    pub async fn register(&self, connection_id: Uuid) -> mpsc::UnboundedReceiver<GatewayEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.write().await.insert(connection_id, tx);
        rx
    }

    pub async fn unregister(&self, connection_id: Uuid) {
        self.inner.write().await.remove(&connection_id);
    }

    /// Send a targeted event to one connection. Returns false if the
    /// connection is unknown or its channel already closed.
    pub async fn send_to(&self, connection_id: Uuid, event: GatewayEvent) -> bool {
        let channels = self.inner.read().await;
        match channels.get(&connection_id) {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Fan an event out to a set of connections, skipping dead ones.
    pub async fn send_to_each(&self, connection_ids: &[Uuid], event: &GatewayEvent) {
        let channels = self.inner.read().await;
        for connection_id in connection_ids {
            if let Some(tx) = channels.get(connection_id) {
                if tx.send(event.clone()).is_err() {
                    debug!("Connection {} channel closed, skipping", connection_id);
                }
            } else {
                debug!("Connection {} has no live channel, skipping", connection_id);
            }
        }
    }
}
