//! Broadcast Relay: best-effort fan-out of accepted positions and route
//! lifecycle events to every connected observer.
//!
//! Delivery is at-most-once with no buffering for observers that are not
//! connected. Each observer has its own FIFO channel and publishing happens
//! synchronously in acceptance order, so a single driver's stream is never
//! reordered for any observer. There is no cross-driver ordering.

use chrono::{DateTime, Utc};

use crate::proto::ws::{envelope::Payload, Envelope, PositionBroadcast, RouteEnded};
use crate::tracking::session::AcceptedPosition;
use crate::ws::broadcast::broadcast_to_all;
use crate::ws::{ConnectionSender, ObserverRegistry};

#[derive(Clone)]
pub struct BroadcastRelay {
    observers: ObserverRegistry,
}

impl BroadcastRelay {
    pub fn new(observers: ObserverRegistry) -> Self {
        Self { observers }
    }

    /// Start delivering broadcasts to a connection.
    pub fn subscribe(&self, connection_id: &str, tx: ConnectionSender) {
        self.observers.insert(connection_id.to_string(), tx);
        tracing::debug!(
            connection_id = %connection_id,
            observers = self.observers.len(),
            "Observer subscribed"
        );
    }

    pub fn unsubscribe(&self, connection_id: &str) {
        self.observers.remove(connection_id);
        tracing::debug!(
            connection_id = %connection_id,
            observers = self.observers.len(),
            "Observer unsubscribed"
        );
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Fan out an accepted position. Returns how many observers it was handed to.
    pub fn publish_position(&self, position: &AcceptedPosition) -> usize {
        let envelope = Envelope {
            request_id: String::new(),
            payload: Some(Payload::PositionBroadcast(PositionBroadcast {
                driver_id: position.driver_id,
                latitude: position.fix.latitude,
                longitude: position.fix.longitude,
                speed: position.fix.speed,
                heading: position.fix.heading,
                timestamp_ms: position.recorded_at.timestamp_millis(),
            })),
        };
        broadcast_to_all(&self.observers, &envelope)
    }

    /// Announce that a driver's route is over.
    pub fn publish_route_ended(&self, driver_id: i64, ended_at: DateTime<Utc>) -> usize {
        let envelope = Envelope {
            request_id: String::new(),
            payload: Some(Payload::RouteEnded(RouteEnded {
                driver_id,
                timestamp_ms: ended_at.timestamp_millis(),
            })),
        };
        broadcast_to_all(&self.observers, &envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::PositionFix;
    use crate::ws::new_observer_registry;
    use axum::extract::ws::Message;
    use prost::Message as ProstMessage;
    use tokio::sync::mpsc;

    fn decode(msg: Message) -> Envelope {
        match msg {
            Message::Binary(data) => Envelope::decode(data).unwrap(),
            other => panic!("expected binary frame, got {other:?}"),
        }
    }

    fn accepted(driver_id: i64, latitude: f64) -> AcceptedPosition {
        AcceptedPosition {
            driver_id,
            session_id: 1,
            fix: PositionFix::new(latitude, -84.0),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn every_observer_receives_each_event_in_order() {
        let relay = BroadcastRelay::new(new_observer_registry());
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        relay.subscribe("a", tx_a);
        relay.subscribe("b", tx_b);

        assert_eq!(relay.publish_position(&accepted(7, 10.0)), 2);
        assert_eq!(relay.publish_position(&accepted(7, 10.1)), 2);
        assert_eq!(relay.publish_route_ended(7, Utc::now()), 2);

        for rx in [&mut rx_a, &mut rx_b] {
            let mut seen = Vec::new();
            while let Ok(msg) = rx.try_recv() {
                seen.push(decode(msg).payload.unwrap());
            }
            assert_eq!(seen.len(), 3);
            match (&seen[0], &seen[1], &seen[2]) {
                (
                    Payload::PositionBroadcast(first),
                    Payload::PositionBroadcast(second),
                    Payload::RouteEnded(ended),
                ) => {
                    assert_eq!(first.latitude, 10.0);
                    assert_eq!(second.latitude, 10.1);
                    assert_eq!(ended.driver_id, 7);
                }
                other => panic!("unexpected sequence {other:?}"),
            }
        }
    }

    #[test]
    fn closed_observer_does_not_block_others() {
        let relay = BroadcastRelay::new(new_observer_registry());
        let (tx_gone, rx_gone) = mpsc::unbounded_channel();
        let (tx_live, mut rx_live) = mpsc::unbounded_channel();
        relay.subscribe("gone", tx_gone);
        relay.subscribe("live", tx_live);
        drop(rx_gone);

        assert_eq!(relay.publish_position(&accepted(3, 9.9)), 1);
        assert!(rx_live.try_recv().is_ok());
    }

    #[test]
    fn unsubscribed_observer_misses_later_events() {
        let relay = BroadcastRelay::new(new_observer_registry());
        let (tx, mut rx) = mpsc::unbounded_channel();
        relay.subscribe("a", tx);
        relay.unsubscribe("a");

        assert_eq!(relay.observer_count(), 0);
        assert_eq!(relay.publish_route_ended(1, Utc::now()), 0);
        assert!(rx.try_recv().is_err());
    }
}
