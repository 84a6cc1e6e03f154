//! Registry of open control sessions.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::connection::ControlConnection;

/// Open control connections indexed by ID.
#[derive(Default)]
pub struct SessionTracker {
    connections: RwLock<HashMap<String, Arc<ControlConnection>>>,
}

impl SessionTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. The returned guard unregisters it on drop.
    pub fn register(self: &Arc<Self>, connection: Arc<ControlConnection>) -> SessionGuard {
        let id = connection.id.clone();
        let _ = self.connections.write().insert(id.clone(), connection);
        SessionGuard {
            tracker: Arc::clone(self),
            id,
        }
    }

    /// Remove a connection by ID.
    pub fn remove(&self, id: &str) -> Option<Arc<ControlConnection>> {
        self.connections.write().remove(id)
    }

    /// Look up a connection.
    pub fn get(&self, id: &str) -> Option<Arc<ControlConnection>> {
        self.connections.read().get(id).cloned()
    }

    /// Number of open connections.
    pub fn count(&self) -> usize {
        self.connections.read().len()
    }
}

/// Unregisters a session when its connection task ends, however it ends.
pub struct SessionGuard {
    tracker: Arc<SessionTracker>,
    id: String,
}

impl SessionGuard {
    /// ID of the guarded session.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.tracker.remove(&self.id).is_some() {
            debug!(session_id = %self.id, open = self.tracker.count(), "control session released");
        }
    }
}
