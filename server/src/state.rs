use std::sync::Arc;

use crate::config::WsConfig;
use crate::store::FleetStore;
use crate::tracking::connections::ConnectionRegistry;
use crate::tracking::relay::BroadcastRelay;
use crate::tracking::roster::RosterQuery;
use crate::tracking::session::RouteSessionManager;
use crate::ws::new_observer_registry;

/// Shared application state passed to all handlers via axum State extractor.
/// Built once at startup; the registries inside live exactly as long as the server.
#[derive(Clone)]
pub struct AppState {
    /// Route session state machine (owns the connection registry and the relay)
    pub sessions: Arc<RouteSessionManager>,
    /// Read-only snapshots of active sessions
    pub roster: RosterQuery,
    /// HS256 key used to verify identity tokens
    pub jwt_secret: Vec<u8>,
    /// WebSocket keepalive settings
    pub ws: WsConfig,
}

impl AppState {
    pub fn new(store: Arc<dyn FleetStore>, jwt_secret: Vec<u8>, ws: WsConfig) -> Self {
        let relay = BroadcastRelay::new(new_observer_registry());
        let sessions = Arc::new(RouteSessionManager::new(
            store.clone(),
            ConnectionRegistry::new(),
            relay,
        ));

        Self {
            sessions,
            roster: RosterQuery::new(store),
            jwt_secret,
            ws,
        }
    }
}
