use axum::extract::ws::Message;
use prost::Message as ProstMessage;

use super::{ConnectionSender, ObserverRegistry};
use crate::proto::ws::Envelope;

/// Encode an envelope into a binary WebSocket frame.
pub fn encode_frame(envelope: &Envelope) -> Option<Message> {
    let mut buf = Vec::with_capacity(envelope.encoded_len());
    envelope.encode(&mut buf).ok()?;
    Some(Message::Binary(buf.into()))
}

/// Broadcast a protobuf envelope to every registered observer.
/// Best effort: observers whose channel is closed are skipped, nothing is retried.
/// Returns the number of observers the frame was handed to.
pub fn broadcast_to_all(registry: &ObserverRegistry, envelope: &Envelope) -> usize {
    let Some(msg) = encode_frame(envelope) else {
        return 0;
    };

    let mut delivered = 0;
    for entry in registry.iter() {
        if entry.value().send(msg.clone()).is_ok() {
            delivered += 1;
        }
    }
    delivered
}

/// Send a protobuf envelope to a single connection.
pub fn send_envelope(tx: &ConnectionSender, envelope: &Envelope) {
    if let Some(msg) = encode_frame(envelope) {
        let _ = tx.send(msg);
    }
}
