//! Route Session Manager.
//!
//! Per driver there are two states: no active session row, or exactly one.
//! The store's partial unique index on active sessions is what enforces
//! "exactly one"; this manager clears stale rows before creating a new one and
//! re-runs that sequence once if a concurrent start wins the race.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::connections::ConnectionRegistry;
use super::history::HistoryRecorder;
use super::relay::BroadcastRelay;
use super::SessionError;
use crate::db::models::{ArchivedRoute, PositionFix, RouteSession};
use crate::store::{FleetStore, StoreError};

/// Clear-then-create attempts before a start conflict is surfaced.
const START_ATTEMPTS: usize = 2;

/// A position that was persisted and handed to the relay.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedPosition {
    pub driver_id: i64,
    pub session_id: i64,
    pub fix: PositionFix,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PositionOutcome {
    Applied(AcceptedPosition),
    /// No active session to attach the position to.
    Discarded,
}

impl PositionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FinalizeOutcome {
    /// `archive` is None when the session was deactivated but the archive write failed.
    Finalized {
        session: RouteSession,
        archive: Option<ArchivedRoute>,
    },
    NotActive,
}

impl FinalizeOutcome {
    pub fn finalized(&self) -> bool {
        matches!(self, Self::Finalized { .. })
    }
}

pub struct RouteSessionManager {
    store: Arc<dyn FleetStore>,
    history: HistoryRecorder,
    connections: ConnectionRegistry,
    relay: BroadcastRelay,
}

impl RouteSessionManager {
    pub fn new(
        store: Arc<dyn FleetStore>,
        connections: ConnectionRegistry,
        relay: BroadcastRelay,
    ) -> Self {
        Self {
            history: HistoryRecorder::new(store.clone()),
            store,
            connections,
            relay,
        }
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    pub fn relay(&self) -> &BroadcastRelay {
        &self.relay
    }

    pub fn history(&self) -> &HistoryRecorder {
        &self.history
    }

    /// Open a new route for `driver_id`, superseding any session it left active.
    pub async fn start_session(
        &self,
        driver_id: i64,
        vehicle_id: i64,
        connection_id: &str,
    ) -> Result<RouteSession, SessionError> {
        check_driver_id(driver_id)?;

        let driver = self
            .store
            .find_driver(driver_id)
            .await?
            .ok_or(SessionError::UnknownDriver(driver_id))?;
        if !driver.active {
            return Err(SessionError::InactiveDriver(driver_id));
        }

        let vehicle = self
            .store
            .find_vehicle(vehicle_id)
            .await?
            .ok_or(SessionError::UnknownVehicle(vehicle_id))?;
        if !vehicle.active {
            return Err(SessionError::InactiveVehicle(vehicle_id));
        }

        let mut attempt = 1;
        let session = loop {
            self.supersede_active(driver_id).await?;

            match self.store.create_session(driver_id, vehicle_id, Utc::now()).await {
                Ok(session) => break session,
                Err(StoreError::Conflict(_)) if attempt < START_ATTEMPTS => {
                    tracing::warn!(
                        driver_id,
                        attempt,
                        "Concurrent route start detected, clearing and retrying"
                    );
                    attempt += 1;
                }
                Err(StoreError::Conflict(_)) => return Err(SessionError::Conflict(driver_id)),
                Err(e) => return Err(e.into()),
            }
        };

        self.connections.bind(connection_id, driver_id);

        tracing::info!(
            driver_id,
            vehicle_id,
            session_id = session.id,
            connection_id = %connection_id,
            "Route session started"
        );

        Ok(session)
    }

    /// Deactivate and archive whatever the driver left active.
    async fn supersede_active(&self, driver_id: i64) -> Result<(), SessionError> {
        let stale = self.store.deactivate_driver_sessions(driver_id).await?;
        if stale.is_empty() {
            return Ok(());
        }

        let ended_at = Utc::now();
        for session in &stale {
            tracing::info!(
                driver_id,
                session_id = session.id,
                "Superseding stale route session"
            );
            if let Err(e) = self.history.archive(session, ended_at).await {
                tracing::error!(
                    driver_id,
                    session_id = session.id,
                    error = %e,
                    "Failed to archive superseded route session"
                );
            }
        }
        Ok(())
    }

    /// Attach a position to the driver's active session and broadcast it.
    pub async fn record_position(
        &self,
        driver_id: i64,
        fix: PositionFix,
    ) -> Result<PositionOutcome, SessionError> {
        check_driver_id(driver_id)?;
        validate_fix(&fix)?;

        let Some(session) = self.store.find_active_session(driver_id).await? else {
            tracing::debug!(driver_id, "Position discarded: no active route session");
            return Ok(PositionOutcome::Discarded);
        };

        let recorded_at = Utc::now();
        if !self.store.update_position(session.id, &fix, recorded_at).await? {
            // Finalized between the lookup and the write
            tracing::debug!(
                driver_id,
                session_id = session.id,
                "Position discarded: route session ended concurrently"
            );
            return Ok(PositionOutcome::Discarded);
        }
        if self
            .history
            .record_sample(session.id, &fix, recorded_at)
            .await?
            .is_none()
        {
            // Finalized between the position write and the sample append
            tracing::debug!(
                driver_id,
                session_id = session.id,
                "Position discarded: route session ended before sampling"
            );
            return Ok(PositionOutcome::Discarded);
        }

        // A finalize from another connection landing after this point can still
        // put its RouteEnded ahead of this broadcast. A driver's own requests are
        // serial on one connection, so that only happens with an admin finalize.
        let accepted = AcceptedPosition {
            driver_id,
            session_id: session.id,
            fix,
            recorded_at,
        };
        let observers = self.relay.publish_position(&accepted);
        tracing::trace!(driver_id, session_id = session.id, observers, "Position relayed");

        Ok(PositionOutcome::Applied(accepted))
    }

    /// End the driver's active route. Idempotent.
    pub async fn finalize_session(&self, driver_id: i64) -> Result<FinalizeOutcome, SessionError> {
        check_driver_id(driver_id)?;

        let Some(session) = self.store.find_active_session(driver_id).await? else {
            tracing::info!(driver_id, "Finalize requested with no active route session");
            return Ok(FinalizeOutcome::NotActive);
        };

        if !self.store.deactivate_session(session.id).await? {
            tracing::info!(
                driver_id,
                session_id = session.id,
                "Route session already ended concurrently"
            );
            return Ok(FinalizeOutcome::NotActive);
        }

        let ended_at = Utc::now();
        let archive = match self.history.archive(&session, ended_at).await {
            Ok(archive) => Some(archive),
            Err(e) => {
                // The session stays inactive regardless
                tracing::error!(
                    driver_id,
                    session_id = session.id,
                    error = %e,
                    "Failed to archive finalized route session"
                );
                None
            }
        };

        self.relay.publish_route_ended(driver_id, ended_at);

        tracing::info!(driver_id, session_id = session.id, "Route session finalized");

        Ok(FinalizeOutcome::Finalized {
            session: RouteSession {
                active: false,
                ..session
            },
            archive,
        })
    }

    /// Forget a closed transport connection. The driver's session is left
    /// untouched; a reconnecting driver supersedes it on the next start.
    pub fn remove_connection(&self, connection_id: &str) -> Option<i64> {
        let driver_id = self.connections.unbind(connection_id)?;
        tracing::info!(
            driver_id,
            connection_id = %connection_id,
            "Driver connection removed; route session left as is"
        );
        Some(driver_id)
    }
}

fn check_driver_id(driver_id: i64) -> Result<(), SessionError> {
    if driver_id <= 0 {
        return Err(SessionError::InvalidDriverId(driver_id));
    }
    Ok(())
}

/// Reject coordinates outside WGS84 ranges and negative or non-finite motion values.
pub fn validate_fix(fix: &PositionFix) -> Result<(), SessionError> {
    if !(-90.0..=90.0).contains(&fix.latitude) {
        return Err(SessionError::InvalidPosition(format!(
            "latitude {} out of range",
            fix.latitude
        )));
    }
    if !(-180.0..=180.0).contains(&fix.longitude) {
        return Err(SessionError::InvalidPosition(format!(
            "longitude {} out of range",
            fix.longitude
        )));
    }
    if let Some(speed) = fix.speed {
        if !speed.is_finite() || speed < 0.0 {
            return Err(SessionError::InvalidPosition(format!("speed {speed} invalid")));
        }
    }
    if let Some(heading) = fix.heading {
        if !(0.0..=360.0).contains(&heading) {
            return Err(SessionError::InvalidPosition(format!(
                "heading {heading} out of range"
            )));
        }
    }
    Ok(())
}
