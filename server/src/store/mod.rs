//! Durable record store seam.
//!
//! The tracking core only talks to storage through [`FleetStore`]. Every method
//! is a suspension point; implementations must not require callers to hold any
//! in-process lock across them. Each method touches at most one row of
//! session state, so a cancelled caller never leaves a torn write behind.

pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db::models::{
    ArchivedRoute, Driver, FleetStats, PositionFix, PositionSample, RosterEntry, RouteSession,
    Vehicle,
};

pub use sqlite::SqliteStore;

/// Errors surfaced by a [`FleetStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The one-active-session-per-driver constraint rejected a write.
    #[error("an active route session already exists for driver {0}")]
    Conflict(i64),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database lock poisoned")]
    Poisoned,

    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[async_trait]
pub trait FleetStore: Send + Sync {
    async fn find_driver(&self, driver_id: i64) -> Result<Option<Driver>, StoreError>;

    async fn find_vehicle(&self, vehicle_id: i64) -> Result<Option<Vehicle>, StoreError>;

    async fn find_active_session(&self, driver_id: i64)
        -> Result<Option<RouteSession>, StoreError>;

    /// Flip every active session of `driver_id` to inactive and return the rows
    /// that were changed.
    async fn deactivate_driver_sessions(
        &self,
        driver_id: i64,
    ) -> Result<Vec<RouteSession>, StoreError>;

    /// Insert a new active session with a zeroed position.
    /// Returns [`StoreError::Conflict`] if the driver already has one.
    async fn create_session(
        &self,
        driver_id: i64,
        vehicle_id: i64,
        started_at: DateTime<Utc>,
    ) -> Result<RouteSession, StoreError>;

    /// Overwrite the latest position of a session that is still active.
    /// Returns false if the session is no longer active.
    async fn update_position(
        &self,
        session_id: i64,
        fix: &PositionFix,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Flip one session to inactive. Returns false if it already was.
    async fn deactivate_session(&self, session_id: i64) -> Result<bool, StoreError>;

    /// Append a history sample. `None` when the session is no longer active.
    async fn append_sample(
        &self,
        session_id: i64,
        fix: &PositionFix,
        recorded_at: DateTime<Utc>,
    ) -> Result<Option<PositionSample>, StoreError>;

    async fn archive_route(
        &self,
        session: &RouteSession,
        ended_at: DateTime<Utc>,
    ) -> Result<ArchivedRoute, StoreError>;

    async fn active_roster(&self) -> Result<Vec<RosterEntry>, StoreError>;

    async fn samples_for_session(&self, session_id: i64)
        -> Result<Vec<PositionSample>, StoreError>;

    /// Archived routes, newest first, optionally for a single driver.
    async fn archived_routes(
        &self,
        driver_id: Option<i64>,
        limit: u32,
    ) -> Result<Vec<ArchivedRoute>, StoreError>;

    async fn fleet_stats(&self) -> Result<FleetStats, StoreError>;
}
