pub mod actor;
pub mod broadcast;
pub mod handler;
pub mod protocol;

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Type alias for the sender half of a WebSocket connection's channel.
/// Other parts of the system can clone this to push messages to a specific client.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;

/// Observer registry: every open WebSocket connection, keyed by connection id.
/// Drivers and passengers alike receive broadcasts.
/// Arc<DashMap<ConnectionId, ConnectionSender>>
pub type ObserverRegistry = Arc<DashMap<String, ConnectionSender>>;

/// Create a new empty observer registry.
pub fn new_observer_registry() -> ObserverRegistry {
    Arc::new(DashMap::new())
}
