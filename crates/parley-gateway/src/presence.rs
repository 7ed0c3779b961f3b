use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

/// Tracks which connection ids are currently open for each username.
/// Multiple entries per username are expected (one per tab/device).
/// Purely in-memory: a process restart clears everything, and the registry
/// is rebuilt as connections arrive.
///
/// An explicit, constructed component — cloned into the hub rather than
/// reached through a global, so tests can substitute their own instance.
#[derive(Clone, Default)]
pub struct PresenceTracker {
    inner: Arc<RwLock<HashMap<String, Vec<Uuid>>>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `username` has `connection_id` open.
    pub async fn register(&self, username: &str, connection_id: Uuid) {
        let mut map = self.inner.write().await;
        map.entry(username.to_string()).or_default().push(connection_id);
    }

    /// Remove exactly the given entry. An unknown pair is a no-op —
    /// disconnect races are expected, not errors.
    pub async fn unregister(&self, username: &str, connection_id: Uuid) {
        let mut map = self.inner.write().await;
        if let Some(conns) = map.get_mut(username) {
            conns.retain(|c| *c != connection_id);
            if conns.is_empty() {
                map.remove(username);
            }
        }
    }

    /// Connection ids for a user, in registration order. Possibly empty.
    pub async fn connections_for(&self, username: &str) -> Vec<Uuid> {
        let map = self.inner.read().await;
        map.get(username).cloned().unwrap_or_default()
    }

    pub async fn is_online(&self, username: &str) -> bool {
        let map = self.inner.read().await;
        map.contains_key(username)
    }
}
