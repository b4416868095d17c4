//! SQLite-backed [`FleetStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{FleetStore, StoreError};
use crate::db::models::{
    ArchivedRoute, Driver, DriverSummary, FleetStats, NewDriver, NewVehicle, PositionFix,
    PositionSample, RosterEntry, RouteSession, Vehicle, VehicleSummary,
};
use crate::db::DbPool;

const SESSION_COLUMNS: &str =
    "id, driver_id, vehicle_id, active, started_at, latitude, longitude, speed, heading, updated_at";

const SAMPLE_COLUMNS: &str = "id, session_id, latitude, longitude, speed, heading, recorded_at";

const ARCHIVE_COLUMNS: &str = "id, session_id, driver_id, vehicle_id, started_at, ended_at";

/// [`FleetStore`] over the shared rusqlite connection.
/// Every call runs on the blocking pool and holds the connection lock only
/// for the duration of its own statements.
#[derive(Clone)]
pub struct SqliteStore {
    db: DbPool,
}

impl SqliteStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Poisoned)?;
            f(&conn)
        })
        .await?
    }

    // --- Registry provisioning (registry service and tests) ---

    pub async fn register_vehicle(&self, vehicle: NewVehicle) -> Result<Vehicle, StoreError> {
        self.run(move |conn| {
            let now = Utc::now();
            conn.execute(
                "INSERT INTO vehicles (number, route_label, plate, capacity, active, created_at)
                 VALUES (?1, ?2, ?3, ?4, 1, ?5)",
                params![vehicle.number, vehicle.route_label, vehicle.plate, vehicle.capacity, now],
            )?;
            Ok(Vehicle {
                id: conn.last_insert_rowid(),
                number: vehicle.number,
                route_label: vehicle.route_label,
                plate: vehicle.plate,
                capacity: vehicle.capacity,
                active: true,
                created_at: now,
            })
        })
        .await
    }

    pub async fn register_driver(&self, driver: NewDriver) -> Result<Driver, StoreError> {
        self.run(move |conn| {
            let now = Utc::now();
            conn.execute(
                "INSERT INTO drivers (first_name, last_name, email, active, assigned_vehicle_id, created_at)
                 VALUES (?1, ?2, ?3, 1, ?4, ?5)",
                params![
                    driver.first_name,
                    driver.last_name,
                    driver.email,
                    driver.assigned_vehicle_id,
                    now
                ],
            )?;
            Ok(Driver {
                id: conn.last_insert_rowid(),
                first_name: driver.first_name,
                last_name: driver.last_name,
                email: driver.email,
                active: true,
                assigned_vehicle_id: driver.assigned_vehicle_id,
                created_at: now,
            })
        })
        .await
    }

    pub async fn set_driver_active(&self, driver_id: i64, active: bool) -> Result<bool, StoreError> {
        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE drivers SET active = ?2 WHERE id = ?1",
                params![driver_id, active],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    /// Every session ever opened by a driver, oldest first.
    pub async fn sessions_for_driver(&self, driver_id: i64) -> Result<Vec<RouteSession>, StoreError> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM route_sessions WHERE driver_id = ?1 ORDER BY id"
            ))?;
            let sessions = stmt
                .query_map(params![driver_id], session_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(sessions)
        })
        .await
    }
}

#[async_trait]
impl FleetStore for SqliteStore {
    async fn find_driver(&self, driver_id: i64) -> Result<Option<Driver>, StoreError> {
        self.run(move |conn| {
            let driver = conn
                .query_row(
                    "SELECT id, first_name, last_name, email, active, assigned_vehicle_id, created_at
                     FROM drivers WHERE id = ?1",
                    params![driver_id],
                    |row| {
                        Ok(Driver {
                            id: row.get(0)?,
                            first_name: row.get(1)?,
                            last_name: row.get(2)?,
                            email: row.get(3)?,
                            active: row.get(4)?,
                            assigned_vehicle_id: row.get(5)?,
                            created_at: row.get(6)?,
                        })
                    },
                )
                .optional()?;
            Ok(driver)
        })
        .await
    }

    async fn find_vehicle(&self, vehicle_id: i64) -> Result<Option<Vehicle>, StoreError> {
        self.run(move |conn| {
            let vehicle = conn
                .query_row(
                    "SELECT id, number, route_label, plate, capacity, active, created_at
                     FROM vehicles WHERE id = ?1",
                    params![vehicle_id],
                    |row| {
                        Ok(Vehicle {
                            id: row.get(0)?,
                            number: row.get(1)?,
                            route_label: row.get(2)?,
                            plate: row.get(3)?,
                            capacity: row.get(4)?,
                            active: row.get(5)?,
                            created_at: row.get(6)?,
                        })
                    },
                )
                .optional()?;
            Ok(vehicle)
        })
        .await
    }

    async fn find_active_session(
        &self,
        driver_id: i64,
    ) -> Result<Option<RouteSession>, StoreError> {
        self.run(move |conn| {
            let session = conn
                .query_row(
                    &format!(
                        "SELECT {SESSION_COLUMNS} FROM route_sessions
                         WHERE driver_id = ?1 AND active = 1"
                    ),
                    params![driver_id],
                    session_from_row,
                )
                .optional()?;
            Ok(session)
        })
        .await
    }

    async fn deactivate_driver_sessions(
        &self,
        driver_id: i64,
    ) -> Result<Vec<RouteSession>, StoreError> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "UPDATE route_sessions SET active = 0
                 WHERE driver_id = ?1 AND active = 1
                 RETURNING {SESSION_COLUMNS}"
            ))?;
            let cleared = stmt
                .query_map(params![driver_id], session_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(cleared)
        })
        .await
    }

    async fn create_session(
        &self,
        driver_id: i64,
        vehicle_id: i64,
        started_at: DateTime<Utc>,
    ) -> Result<RouteSession, StoreError> {
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO route_sessions
                    (driver_id, vehicle_id, active, started_at, latitude, longitude, updated_at)
                 VALUES (?1, ?2, 1, ?3, 0, 0, ?3)",
                params![driver_id, vehicle_id, started_at],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Conflict(driver_id)
                } else {
                    StoreError::Sqlite(e)
                }
            })?;

            Ok(RouteSession {
                id: conn.last_insert_rowid(),
                driver_id,
                vehicle_id,
                active: true,
                started_at,
                latitude: 0.0,
                longitude: 0.0,
                speed: None,
                heading: None,
                updated_at: started_at,
            })
        })
        .await
    }

    async fn update_position(
        &self,
        session_id: i64,
        fix: &PositionFix,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let fix = *fix;
        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE route_sessions
                 SET latitude = ?2, longitude = ?3, speed = ?4, heading = ?5, updated_at = ?6
                 WHERE id = ?1 AND active = 1",
                params![session_id, fix.latitude, fix.longitude, fix.speed, fix.heading, at],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    async fn deactivate_session(&self, session_id: i64) -> Result<bool, StoreError> {
        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE route_sessions SET active = 0 WHERE id = ?1 AND active = 1",
                params![session_id],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    async fn append_sample(
        &self,
        session_id: i64,
        fix: &PositionFix,
        recorded_at: DateTime<Utc>,
    ) -> Result<Option<PositionSample>, StoreError> {
        let fix = *fix;
        self.run(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO position_samples
                    (session_id, latitude, longitude, speed, heading, recorded_at)
                 SELECT ?1, ?2, ?3, ?4, ?5, ?6
                 WHERE EXISTS (SELECT 1 FROM route_sessions WHERE id = ?1 AND active = 1)",
                params![session_id, fix.latitude, fix.longitude, fix.speed, fix.heading, recorded_at],
            )?;
            if inserted == 0 {
                return Ok(None);
            }
            Ok(Some(PositionSample {
                id: conn.last_insert_rowid(),
                session_id,
                latitude: fix.latitude,
                longitude: fix.longitude,
                speed: fix.speed,
                heading: fix.heading,
                recorded_at,
            }))
        })
        .await
    }

    async fn archive_route(
        &self,
        session: &RouteSession,
        ended_at: DateTime<Utc>,
    ) -> Result<ArchivedRoute, StoreError> {
        let (session_id, driver_id, vehicle_id, started_at) =
            (session.id, session.driver_id, session.vehicle_id, session.started_at);
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO archived_routes (session_id, driver_id, vehicle_id, started_at, ended_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![session_id, driver_id, vehicle_id, started_at, ended_at],
            )?;
            Ok(ArchivedRoute {
                id: conn.last_insert_rowid(),
                session_id,
                driver_id,
                vehicle_id,
                started_at,
                ended_at,
            })
        })
        .await
    }

    async fn active_roster(&self) -> Result<Vec<RosterEntry>, StoreError> {
        self.run(|conn| {
            let mut stmt = conn.prepare(
                "SELECT s.id, s.driver_id, s.vehicle_id, s.active, s.started_at,
                        s.latitude, s.longitude, s.speed, s.heading, s.updated_at,
                        v.number, v.route_label, v.plate, v.capacity,
                        d.first_name, d.last_name
                 FROM route_sessions s
                 JOIN vehicles v ON v.id = s.vehicle_id
                 JOIN drivers d ON d.id = s.driver_id
                 WHERE s.active = 1
                 ORDER BY s.started_at, s.id",
            )?;
            let roster = stmt
                .query_map([], |row| {
                    Ok(RosterEntry {
                        session: session_from_row(row)?,
                        vehicle: VehicleSummary {
                            number: row.get(10)?,
                            route_label: row.get(11)?,
                            plate: row.get(12)?,
                            capacity: row.get(13)?,
                        },
                        driver: DriverSummary {
                            first_name: row.get(14)?,
                            last_name: row.get(15)?,
                        },
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(roster)
        })
        .await
    }

    async fn samples_for_session(
        &self,
        session_id: i64,
    ) -> Result<Vec<PositionSample>, StoreError> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SAMPLE_COLUMNS} FROM position_samples WHERE session_id = ?1 ORDER BY id"
            ))?;
            let samples = stmt
                .query_map(params![session_id], |row| {
                    Ok(PositionSample {
                        id: row.get(0)?,
                        session_id: row.get(1)?,
                        latitude: row.get(2)?,
                        longitude: row.get(3)?,
                        speed: row.get(4)?,
                        heading: row.get(5)?,
                        recorded_at: row.get(6)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(samples)
        })
        .await
    }

    async fn archived_routes(
        &self,
        driver_id: Option<i64>,
        limit: u32,
    ) -> Result<Vec<ArchivedRoute>, StoreError> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ARCHIVE_COLUMNS} FROM archived_routes
                 WHERE (?1 IS NULL OR driver_id = ?1)
                 ORDER BY ended_at DESC, id DESC
                 LIMIT ?2"
            ))?;
            let routes = stmt
                .query_map(params![driver_id, limit], |row| {
                    Ok(ArchivedRoute {
                        id: row.get(0)?,
                        session_id: row.get(1)?,
                        driver_id: row.get(2)?,
                        vehicle_id: row.get(3)?,
                        started_at: row.get(4)?,
                        ended_at: row.get(5)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(routes)
        })
        .await
    }

    async fn fleet_stats(&self) -> Result<FleetStats, StoreError> {
        self.run(|conn| {
            let count = |sql: &str| -> Result<u64, rusqlite::Error> {
                conn.query_row(sql, [], |row| row.get::<_, i64>(0))
                    .map(|n| n as u64)
            };
            Ok(FleetStats {
                total_drivers: count("SELECT COUNT(*) FROM drivers")?,
                active_drivers: count("SELECT COUNT(*) FROM drivers WHERE active = 1")?,
                total_vehicles: count("SELECT COUNT(*) FROM vehicles")?,
                active_vehicles: count("SELECT COUNT(*) FROM vehicles WHERE active = 1")?,
                vehicles_on_route: count(
                    "SELECT COUNT(DISTINCT vehicle_id) FROM route_sessions WHERE active = 1",
                )?,
            })
        })
        .await
    }
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<RouteSession> {
    Ok(RouteSession {
        id: row.get(0)?,
        driver_id: row.get(1)?,
        vehicle_id: row.get(2)?,
        active: row.get(3)?,
        started_at: row.get(4)?,
        latitude: row.get(5)?,
        longitude: row.get(6)?,
        speed: row.get(7)?,
        heading: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn store_with_fleet() -> (SqliteStore, Driver, Vehicle) {
        let store = SqliteStore::new(db::open_in_memory().unwrap());
        let vehicle = store
            .register_vehicle(NewVehicle {
                number: "12".to_string(),
                route_label: "Centro - Hospital".to_string(),
                plate: "SJB-1234".to_string(),
                capacity: Some(40),
            })
            .await
            .unwrap();
        let driver = store
            .register_driver(NewDriver {
                first_name: "Ana".to_string(),
                last_name: "Mora".to_string(),
                email: "ana@example.com".to_string(),
                assigned_vehicle_id: Some(vehicle.id),
            })
            .await
            .unwrap();
        (store, driver, vehicle)
    }

    #[tokio::test]
    async fn second_active_session_is_a_conflict() {
        let (store, driver, vehicle) = store_with_fleet().await;
        store
            .create_session(driver.id, vehicle.id, Utc::now())
            .await
            .unwrap();

        let err = store
            .create_session(driver.id, vehicle.id, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(id) if id == driver.id));
    }

    #[tokio::test]
    async fn deactivate_returns_cleared_rows_once() {
        let (store, driver, vehicle) = store_with_fleet().await;
        let session = store
            .create_session(driver.id, vehicle.id, Utc::now())
            .await
            .unwrap();

        let cleared = store.deactivate_driver_sessions(driver.id).await.unwrap();
        assert_eq!(cleared.len(), 1);
        assert_eq!(cleared[0].id, session.id);
        assert!(!cleared[0].active);

        assert!(store.deactivate_driver_sessions(driver.id).await.unwrap().is_empty());
        assert!(store.find_active_session(driver.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn inactive_session_rejects_position_and_second_deactivation() {
        let (store, driver, vehicle) = store_with_fleet().await;
        let session = store
            .create_session(driver.id, vehicle.id, Utc::now())
            .await
            .unwrap();

        assert!(store.deactivate_session(session.id).await.unwrap());
        assert!(!store.deactivate_session(session.id).await.unwrap());
        assert!(!store
            .update_position(session.id, &PositionFix::new(9.93, -84.08), Utc::now())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn roster_joins_vehicle_and_driver() {
        let (store, driver, vehicle) = store_with_fleet().await;
        let session = store
            .create_session(driver.id, vehicle.id, Utc::now())
            .await
            .unwrap();
        let fix = PositionFix {
            latitude: 9.93,
            longitude: -84.08,
            speed: Some(32.5),
            heading: Some(270.0),
        };
        assert!(store.update_position(session.id, &fix, Utc::now()).await.unwrap());

        let roster = store.active_roster().await.unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].session.id, session.id);
        assert_eq!(roster[0].session.latitude, 9.93);
        assert_eq!(roster[0].session.speed, Some(32.5));
        assert_eq!(roster[0].vehicle.plate, "SJB-1234");
        assert_eq!(roster[0].driver.first_name, "Ana");
    }

    #[tokio::test]
    async fn archived_routes_filter_by_driver_newest_first() {
        let (store, driver, vehicle) = store_with_fleet().await;
        let session = store
            .create_session(driver.id, vehicle.id, Utc::now())
            .await
            .unwrap();
        let first = store
            .archive_route(&session, Utc::now())
            .await
            .unwrap();
        let second = store
            .archive_route(&session, Utc::now() + chrono::Duration::seconds(5))
            .await
            .unwrap();

        let routes = store.archived_routes(Some(driver.id), 10).await.unwrap();
        assert_eq!(
            routes.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![second.id, first.id]
        );
        assert!(store.archived_routes(Some(driver.id + 100), 10).await.unwrap().is_empty());
        assert_eq!(store.archived_routes(None, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stats_count_vehicles_on_route() {
        let (store, driver, vehicle) = store_with_fleet().await;
        store
            .create_session(driver.id, vehicle.id, Utc::now())
            .await
            .unwrap();

        let stats = store.fleet_stats().await.unwrap();
        assert_eq!(
            stats,
            FleetStats {
                total_drivers: 1,
                active_drivers: 1,
                total_vehicles: 1,
                active_vehicles: 1,
                vehicles_on_route: 1,
            }
        );
    }
}
