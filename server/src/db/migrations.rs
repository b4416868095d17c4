use rusqlite_migration::{Migrations, M};

/// Define all schema migrations.
/// Uses SQLite user_version pragma for tracking, no migration table needed.
pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        M::up(
            "-- Migration 1: Fleet registry (owned by the registry service, read-only here)

CREATE TABLE vehicles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    number TEXT NOT NULL,
    route_label TEXT NOT NULL,
    plate TEXT NOT NULL UNIQUE,
    capacity INTEGER,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

CREATE TABLE drivers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    active INTEGER NOT NULL DEFAULT 1,
    assigned_vehicle_id INTEGER,
    created_at TEXT NOT NULL,
    FOREIGN KEY (assigned_vehicle_id) REFERENCES vehicles(id)
);
",
        ),
        M::up(
            "-- Migration 2: Live route sessions and position history

CREATE TABLE route_sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    driver_id INTEGER NOT NULL,
    vehicle_id INTEGER NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    started_at TEXT NOT NULL,
    latitude REAL NOT NULL DEFAULT 0,
    longitude REAL NOT NULL DEFAULT 0,
    speed REAL,
    heading REAL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (driver_id) REFERENCES drivers(id),
    FOREIGN KEY (vehicle_id) REFERENCES vehicles(id)
);

-- At most one active session per driver, enforced by the store itself
CREATE UNIQUE INDEX idx_route_sessions_one_active
    ON route_sessions(driver_id) WHERE active = 1;
CREATE INDEX idx_route_sessions_active ON route_sessions(active);

CREATE TABLE position_samples (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id INTEGER NOT NULL,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    speed REAL,
    heading REAL,
    recorded_at TEXT NOT NULL,
    FOREIGN KEY (session_id) REFERENCES route_sessions(id)
);

CREATE INDEX idx_position_samples_session ON position_samples(session_id, id);

CREATE TABLE archived_routes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id INTEGER NOT NULL,
    driver_id INTEGER NOT NULL,
    vehicle_id INTEGER NOT NULL,
    started_at TEXT NOT NULL,
    ended_at TEXT NOT NULL,
    FOREIGN KEY (session_id) REFERENCES route_sessions(id)
);

CREATE INDEX idx_archived_routes_driver ON archived_routes(driver_id, ended_at);
",
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_valid() {
        assert!(migrations().validate().is_ok());
    }
}
