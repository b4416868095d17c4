use prost::Message as ProstMessage;

use crate::auth::middleware::{Claims, IdentityError};
use crate::db::models::PositionFix;
use crate::proto::ws::{
    envelope::Payload, ActiveRoute, Envelope, ErrorResponse, FinalizeRouteRequest,
    FinalizeRouteResponse, ListActiveResponse, PositionUpdateRequest, PositionUpdateResponse,
    RouteSession, StartRouteRequest, StartRouteResponse,
};
use crate::state::AppState;
use crate::tracking::session::FinalizeOutcome;
use crate::tracking::SessionError;
use crate::ws::actor::ConnectionContext;
use crate::ws::broadcast::send_envelope;
use crate::ws::ConnectionSender;

/// Handle an incoming binary (protobuf) message.
/// Decodes the Envelope, dispatches based on payload type, sends response.
pub async fn handle_binary_message(
    data: &[u8],
    tx: &ConnectionSender,
    state: &AppState,
    ctx: &ConnectionContext,
) {
    let envelope = match Envelope::decode(data) {
        Ok(env) => env,
        Err(e) => {
            tracing::warn!(
                connection_id = %ctx.connection_id,
                error = %e,
                "Failed to decode protobuf Envelope"
            );
            send_error(tx, "", 400, "Invalid protobuf message");
            return;
        }
    };

    let request_id = envelope.request_id.clone();

    match envelope.payload {
        Some(payload) => {
            dispatch_payload(payload, &request_id, tx, state, ctx).await;
        }
        None => {
            send_error(tx, &request_id, 400, "Empty payload");
        }
    }
}

/// Dispatch a decoded payload to the appropriate handler.
async fn dispatch_payload(
    payload: Payload,
    request_id: &str,
    tx: &ConnectionSender,
    state: &AppState,
    ctx: &ConnectionContext,
) {
    match payload {
        Payload::StartRouteRequest(req) => {
            handle_start_route(req, request_id, tx, state, ctx).await;
        }
        Payload::PositionUpdateRequest(req) => {
            handle_position_update(req, request_id, tx, state, ctx).await;
        }
        Payload::FinalizeRouteRequest(req) => {
            handle_finalize_route(req, request_id, tx, state, ctx).await;
        }
        Payload::ListActiveRequest(_) => {
            handle_list_active(request_id, tx, state).await;
        }
        _ => {
            tracing::debug!(
                connection_id = %ctx.connection_id,
                request_id = %request_id,
                "Unhandled payload type"
            );
            send_error(tx, request_id, 501, "Payload type not supported");
        }
    }
}

/// Resolve which driver this connection may act for.
/// Sends the error response itself and returns None when it may not.
fn authorize_driver(
    requested: i64,
    request_id: &str,
    tx: &ConnectionSender,
    ctx: &ConnectionContext,
) -> Option<i64> {
    let Some(claims) = ctx.claims.as_ref() else {
        send_error(tx, request_id, 401, "Authentication required");
        return None;
    };
    match Claims::acting_driver(claims, requested) {
        Ok(driver_id) => Some(driver_id),
        Err(IdentityError::Missing) => {
            send_error(tx, request_id, 401, "Token does not identify a driver");
            None
        }
        Err(IdentityError::Mismatch) => {
            tracing::warn!(
                connection_id = %ctx.connection_id,
                subject = %claims.sub,
                requested,
                "Driver attempted to act for another driver"
            );
            send_error(tx, request_id, 403, "Not permitted to act for this driver");
            None
        }
    }
}

async fn handle_start_route(
    req: StartRouteRequest,
    request_id: &str,
    tx: &ConnectionSender,
    state: &AppState,
    ctx: &ConnectionContext,
) {
    let Some(driver_id) = authorize_driver(req.driver_id, request_id, tx, ctx) else {
        return;
    };

    match state
        .sessions
        .start_session(driver_id, req.vehicle_id, &ctx.connection_id)
        .await
    {
        Ok(session) => {
            let response = Envelope {
                request_id: request_id.to_string(),
                payload: Some(Payload::StartRouteResponse(StartRouteResponse {
                    session: Some(RouteSession::from(&session)),
                })),
            };
            send_envelope(tx, &response);
        }
        Err(e) => send_session_error(tx, request_id, ctx, &e),
    }
}

async fn handle_position_update(
    req: PositionUpdateRequest,
    request_id: &str,
    tx: &ConnectionSender,
    state: &AppState,
    ctx: &ConnectionContext,
) {
    let Some(driver_id) = authorize_driver(req.driver_id, request_id, tx, ctx) else {
        return;
    };

    let fix = PositionFix {
        latitude: req.latitude,
        longitude: req.longitude,
        speed: req.speed,
        heading: req.heading,
    };

    match state.sessions.record_position(driver_id, fix).await {
        Ok(outcome) => {
            let response = Envelope {
                request_id: request_id.to_string(),
                payload: Some(Payload::PositionUpdateResponse(PositionUpdateResponse {
                    accepted: outcome.is_applied(),
                })),
            };
            send_envelope(tx, &response);
        }
        Err(e) => send_session_error(tx, request_id, ctx, &e),
    }
}

async fn handle_finalize_route(
    req: FinalizeRouteRequest,
    request_id: &str,
    tx: &ConnectionSender,
    state: &AppState,
    ctx: &ConnectionContext,
) {
    let Some(driver_id) = authorize_driver(req.driver_id, request_id, tx, ctx) else {
        return;
    };

    match state.sessions.finalize_session(driver_id).await {
        Ok(outcome) => {
            if let FinalizeOutcome::Finalized { archive: None, .. } = &outcome {
                tracing::warn!(driver_id, "Route finalized without an archive record");
            }
            let response = Envelope {
                request_id: request_id.to_string(),
                payload: Some(Payload::FinalizeRouteResponse(FinalizeRouteResponse {
                    finalized: outcome.finalized(),
                })),
            };
            send_envelope(tx, &response);
        }
        Err(e) => send_session_error(tx, request_id, ctx, &e),
    }
}

/// Snapshot of every active route, available to observers as well.
async fn handle_list_active(request_id: &str, tx: &ConnectionSender, state: &AppState) {
    match state.roster.active_sessions().await {
        Ok(entries) => {
            let response = Envelope {
                request_id: request_id.to_string(),
                payload: Some(Payload::ListActiveResponse(ListActiveResponse {
                    routes: entries.iter().map(ActiveRoute::from).collect(),
                })),
            };
            send_envelope(tx, &response);
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to load active routes");
            send_error(tx, request_id, 500, "Storage failure");
        }
    }
}

fn send_session_error(
    tx: &ConnectionSender,
    request_id: &str,
    ctx: &ConnectionContext,
    err: &SessionError,
) {
    let code = err.code();
    if code >= 500 {
        tracing::error!(
            connection_id = %ctx.connection_id,
            request_id = %request_id,
            error = %err,
            "Route session operation failed"
        );
        send_error(tx, request_id, code, "Storage failure");
    } else {
        tracing::debug!(
            connection_id = %ctx.connection_id,
            request_id = %request_id,
            error = %err,
            "Route session request rejected"
        );
        send_error(tx, request_id, code, &err.to_string());
    }
}

/// Send an error response envelope.
fn send_error(tx: &ConnectionSender, request_id: &str, code: u32, message: &str) {
    let envelope = Envelope {
        request_id: request_id.to_string(),
        payload: Some(Payload::Error(ErrorResponse {
            code,
            message: message.to_string(),
            request_id: request_id.to_string(),
        })),
    };
    send_envelope(tx, &envelope);
}
