// Generated protobuf types from proto/fleetwatch.proto via prost-build.
// The module hierarchy must match the protobuf package path:
//   fleetwatch.ws -> proto::fleetwatch::ws
// Field tags must never be reused; the same file is handed to client teams.

use chrono::{DateTime, Utc};

use crate::db::models::{RosterEntry, RouteSession as RouteSessionRow};

pub mod fleetwatch {
    pub mod ws {
        include!(concat!(env!("OUT_DIR"), "/fleetwatch.ws.rs"));
    }
}

// Re-export for convenient access
pub use fleetwatch::ws;

fn millis(at: &DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

impl From<&RouteSessionRow> for ws::RouteSession {
    fn from(session: &RouteSessionRow) -> Self {
        Self {
            id: session.id,
            driver_id: session.driver_id,
            vehicle_id: session.vehicle_id,
            active: session.active,
            started_at_ms: millis(&session.started_at),
            latitude: session.latitude,
            longitude: session.longitude,
            speed: session.speed,
            heading: session.heading,
            updated_at_ms: millis(&session.updated_at),
        }
    }
}

impl From<&RosterEntry> for ws::ActiveRoute {
    fn from(entry: &RosterEntry) -> Self {
        Self {
            session: Some(ws::RouteSession::from(&entry.session)),
            vehicle_number: entry.vehicle.number.clone(),
            route_label: entry.vehicle.route_label.clone(),
            plate: entry.vehicle.plate.clone(),
            capacity: entry.vehicle.capacity,
            driver_first_name: entry.driver.first_name.clone(),
            driver_last_name: entry.driver.last_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ws::{envelope::Payload, Envelope, StartRouteRequest};
    use super::*;
    use chrono::TimeZone;
    use prost::Message;

    #[test]
    fn envelope_payload_uses_schema_tags() {
        let frame = Envelope {
            request_id: String::new(),
            payload: Some(Payload::StartRouteRequest(StartRouteRequest {
                driver_id: 3,
                vehicle_id: 4,
            })),
        }
        .encode_to_vec();

        // Field 10, length-delimited; then driver_id (1) and vehicle_id (2) as varints
        assert_eq!(frame, vec![0x52, 0x04, 0x08, 0x03, 0x10, 0x04]);
    }

    #[test]
    fn session_row_converts_to_millisecond_timestamps() {
        let started = Utc.with_ymd_and_hms(2024, 5, 1, 7, 30, 0).unwrap();
        let row = RouteSessionRow {
            id: 9,
            driver_id: 2,
            vehicle_id: 5,
            active: true,
            started_at: started,
            latitude: 19.4,
            longitude: -99.1,
            speed: None,
            heading: Some(180.0),
            updated_at: started + chrono::Duration::milliseconds(1500),
        };

        let wire = ws::RouteSession::from(&row);
        assert_eq!(wire.started_at_ms, started.timestamp_millis());
        assert_eq!(wire.updated_at_ms - wire.started_at_ms, 1500);
        assert_eq!(wire.speed, None);
        assert_eq!(wire.heading, Some(180.0));
    }
}
