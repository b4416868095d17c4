//! History Store Adapter: the append-only write path for position samples and
//! archived routes, plus the matching history reads.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::db::models::{ArchivedRoute, PositionFix, PositionSample, RouteSession};
use crate::store::{FleetStore, StoreError};

pub const DEFAULT_HISTORY_LIMIT: u32 = 50;
pub const MAX_HISTORY_LIMIT: u32 = 500;

#[derive(Clone)]
pub struct HistoryRecorder {
    store: Arc<dyn FleetStore>,
}

impl HistoryRecorder {
    pub fn new(store: Arc<dyn FleetStore>) -> Self {
        Self { store }
    }

    /// Append to the trail of a still-active session; `None` once it has ended.
    pub async fn record_sample(
        &self,
        session_id: i64,
        fix: &PositionFix,
        recorded_at: DateTime<Utc>,
    ) -> Result<Option<PositionSample>, StoreError> {
        self.store.append_sample(session_id, fix, recorded_at).await
    }

    /// Write the archive row for a session that just stopped being active.
    pub async fn archive(
        &self,
        session: &RouteSession,
        ended_at: DateTime<Utc>,
    ) -> Result<ArchivedRoute, StoreError> {
        let archived = self.store.archive_route(session, ended_at).await?;
        tracing::info!(
            driver_id = session.driver_id,
            session_id = session.id,
            archive_id = archived.id,
            "Route archived"
        );
        Ok(archived)
    }

    /// Position trail of one session in acceptance order.
    pub async fn trail(&self, session_id: i64) -> Result<Vec<PositionSample>, StoreError> {
        self.store.samples_for_session(session_id).await
    }

    /// Archived routes, newest first. `limit` defaults to 50 and is capped at 500.
    pub async fn archived_routes(
        &self,
        driver_id: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<ArchivedRoute>, StoreError> {
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        self.store.archived_routes(driver_id, limit).await
    }
}
