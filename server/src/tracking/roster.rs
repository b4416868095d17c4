//! Roster Query and the read-only REST endpoints over route state.
//!
//! Every call reads the store directly; there is no cache, so a snapshot is
//! only as stale as the read itself.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::middleware::Claims;
use crate::db::models::{ArchivedRoute, FleetStats, PositionSample, RosterEntry};
use crate::state::AppState;
use crate::store::{FleetStore, StoreError};

#[derive(Clone)]
pub struct RosterQuery {
    store: Arc<dyn FleetStore>,
}

impl RosterQuery {
    pub fn new(store: Arc<dyn FleetStore>) -> Self {
        Self { store }
    }

    /// Point-in-time list of active sessions joined with vehicle and driver data.
    pub async fn active_sessions(&self) -> Result<Vec<RosterEntry>, StoreError> {
        self.store.active_roster().await
    }

    pub async fn fleet_stats(&self) -> Result<FleetStats, StoreError> {
        self.store.fleet_stats().await
    }
}

fn internal_error(e: StoreError) -> StatusCode {
    tracing::error!(error = %e, "Route query failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

/// GET /api/routes/active: Roster of active sessions. Public (passenger clients).
pub async fn list_active_routes(
    State(state): State<AppState>,
) -> Result<Json<Vec<RosterEntry>>, StatusCode> {
    let roster = state.roster.active_sessions().await.map_err(internal_error)?;
    Ok(Json(roster))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub driver_id: Option<i64>,
    pub limit: Option<u32>,
}

/// GET /api/routes/history?driver_id=&limit=: Archived routes, newest first. JWT auth required.
pub async fn list_route_history(
    State(state): State<AppState>,
    _claims: Claims,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ArchivedRoute>>, StatusCode> {
    let routes = state
        .sessions
        .history()
        .archived_routes(query.driver_id, query.limit)
        .await
        .map_err(internal_error)?;
    Ok(Json(routes))
}

/// GET /api/routes/{session_id}/positions: Position trail of a session. JWT auth required.
pub async fn get_route_positions(
    State(state): State<AppState>,
    _claims: Claims,
    Path(session_id): Path<i64>,
) -> Result<Json<Vec<PositionSample>>, StatusCode> {
    let trail = state
        .sessions
        .history()
        .trail(session_id)
        .await
        .map_err(internal_error)?;
    Ok(Json(trail))
}

/// GET /api/fleet/stats: Fleet counters including vehicles currently on route. JWT auth required.
pub async fn get_fleet_stats(
    State(state): State<AppState>,
    _claims: Claims,
) -> Result<Json<FleetStats>, StatusCode> {
    let stats = state.roster.fleet_stats().await.map_err(internal_error)?;
    Ok(Json(stats))
}
