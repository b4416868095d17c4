//! Connection Registry: which driver is using which transport connection.
//!
//! Purely in-memory and process-local. It is never consulted to decide whether
//! a driver is on route; the durable session row is the only source of truth.

use dashmap::DashMap;
use std::sync::Arc;

/// Shared map of connection id -> driver id. Cloning shares the same map.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    bindings: Arc<DashMap<String, i64>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a connection to a driver, replacing any previous binding of that connection.
    pub fn bind(&self, connection_id: &str, driver_id: i64) {
        if let Some(previous) = self.bindings.insert(connection_id.to_string(), driver_id) {
            if previous != driver_id {
                tracing::debug!(
                    connection_id = %connection_id,
                    previous_driver_id = previous,
                    driver_id,
                    "Connection rebound to another driver"
                );
            }
        }
    }

    /// Remove a binding. Returns the driver it pointed to, if any.
    pub fn unbind(&self, connection_id: &str) -> Option<i64> {
        self.bindings
            .remove(connection_id)
            .map(|(_, driver_id)| driver_id)
    }

    pub fn driver_for(&self, connection_id: &str) -> Option<i64> {
        self.bindings.get(connection_id).map(|entry| *entry.value())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_lookup_unbind() {
        let registry = ConnectionRegistry::new();
        registry.bind("conn-a", 5);
        registry.bind("conn-b", 5);

        assert_eq!(registry.driver_for("conn-a"), Some(5));
        assert_eq!(registry.driver_for("conn-b"), Some(5));
        assert_eq!(registry.len(), 2);

        assert_eq!(registry.unbind("conn-a"), Some(5));
        assert_eq!(registry.driver_for("conn-a"), None);
        assert_eq!(registry.unbind("conn-a"), None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn rebinding_replaces_driver() {
        let registry = ConnectionRegistry::new();
        registry.bind("conn-a", 1);
        registry.bind("conn-a", 2);
        assert_eq!(registry.driver_for("conn-a"), Some(2));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn clones_share_bindings() {
        let registry = ConnectionRegistry::new();
        let handle = registry.clone();
        handle.bind("conn-a", 9);
        assert_eq!(registry.driver_for("conn-a"), Some(9));
        assert!(!registry.is_empty());
    }
}
