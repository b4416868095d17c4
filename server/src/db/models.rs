//! Database row types for all tables.
//! These correspond 1:1 to the SQLite schema defined in migrations.rs.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Vehicle record from the fleet registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Vehicle {
    pub id: i64,
    pub number: String,
    pub route_label: String,
    pub plate: String,
    pub capacity: Option<i64>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Driver record from the fleet registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Driver {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub active: bool,
    pub assigned_vehicle_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Input for provisioning a vehicle row.
#[derive(Debug, Clone)]
pub struct NewVehicle {
    pub number: String,
    pub route_label: String,
    pub plate: String,
    pub capacity: Option<i64>,
}

/// Input for provisioning a driver row.
#[derive(Debug, Clone)]
pub struct NewDriver {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub assigned_vehicle_id: Option<i64>,
}

/// A driver's live route. At most one row per driver has `active = true`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteSession {
    pub id: i64,
    pub driver_id: i64,
    pub vehicle_id: i64,
    pub active: bool,
    pub started_at: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

/// A single position report as submitted by a driver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionFix {
    pub latitude: f64,
    pub longitude: f64,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
}

impl PositionFix {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            speed: None,
            heading: None,
        }
    }
}

/// Append-only history row for an accepted position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionSample {
    pub id: i64,
    pub session_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

/// Summary written once a session stops being active.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchivedRoute {
    pub id: i64,
    pub session_id: i64,
    pub driver_id: i64,
    pub vehicle_id: i64,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

/// Vehicle fields joined into a roster entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleSummary {
    pub number: String,
    pub route_label: String,
    pub plate: String,
    pub capacity: Option<i64>,
}

/// Driver fields joined into a roster entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverSummary {
    pub first_name: String,
    pub last_name: String,
}

/// One active session with its descriptive registry data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RosterEntry {
    #[serde(flatten)]
    pub session: RouteSession,
    pub vehicle: VehicleSummary,
    pub driver: DriverSummary,
}

/// Fleet-wide counters for dashboards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FleetStats {
    pub total_drivers: u64,
    pub active_drivers: u64,
    pub total_vehicles: u64,
    pub active_vehicles: u64,
    pub vehicles_on_route: u64,
}
