//! Connection registry: live client connections by id

use dashmap::DashMap;
use std::sync::Arc;

use super::transport::ConnectionTransport;

/// Tracks live client connections by `pc_id`
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<String, Arc<dyn ConnectionTransport>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a connection, replacing any existing entry for `id`
    pub fn put(&self, id: impl Into<String>, connection: Arc<dyn ConnectionTransport>) {
        self.connections.insert(id.into(), connection);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn ConnectionTransport>> {
        self.connections.get(id).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, id: &str) -> Option<Arc<dyn ConnectionTransport>> {
        self.connections.remove(id).map(|(_, connection)| connection)
    }

    /// Remove the entry for `id` only if it still holds `connection`
    pub fn remove_if_same(&self, id: &str, connection: &Arc<dyn ConnectionTransport>) -> bool {
        self.connections
            .remove_if(id, |_, current| {
                std::ptr::addr_eq(Arc::as_ptr(current), Arc::as_ptr(connection))
            })
            .is_some()
    }

    /// Snapshot of every registered connection at call time
    pub fn all(&self) -> Vec<Arc<dyn ConnectionTransport>> {
        self.connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn clear(&self) {
        self.connections.clear();
    }
}
