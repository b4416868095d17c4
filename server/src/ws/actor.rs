use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, timeout};
use uuid::Uuid;

use crate::auth::middleware::Claims;
use crate::config::WsConfig;
use crate::state::AppState;
use crate::ws::{protocol, ConnectionSender};

/// Identity of one open WebSocket connection.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub connection_id: String,
    /// None for anonymous observers
    pub claims: Option<Claims>,
}

/// Run the actor-per-connection pattern for a WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from an mpsc channel
/// - Reader task: processes incoming messages one at a time, dispatches to protocol handlers
///
/// The mpsc sender is registered with the broadcast relay, so every connection
/// is an observer. Closing the connection unregisters it and drops its driver
/// binding, but never ends a route session.
pub async fn run_connection(socket: WebSocket, state: AppState, claims: Option<Claims>) {
    let ctx = ConnectionContext {
        connection_id: Uuid::now_v7().to_string(),
        claims,
    };
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    let relay = state.sessions.relay().clone();
    relay.subscribe(&ctx.connection_id, tx.clone());

    tracing::info!(
        connection_id = %ctx.connection_id,
        driver_id = ?ctx.claims.as_ref().and_then(|c| c.driver_id),
        "WebSocket actor started"
    );

    // Spawn writer task: forwards mpsc messages to WebSocket sink
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    let (pong_tx, pong_rx) = mpsc::unbounded_channel::<()>();
    // Fires when the peer stopped answering pings
    let (dead_tx, mut dead_rx) = oneshot::channel::<()>();
    let keepalive_handle = tokio::spawn(keepalive_task(
        tx.clone(),
        pong_rx,
        dead_tx,
        state.ws.clone(),
        ctx.connection_id.clone(),
    ));

    // Reader loop: one request at a time keeps a driver's updates in order
    loop {
        let next = tokio::select! {
            next = ws_receiver.next() => next,
            _ = &mut dead_rx => {
                tracing::info!(connection_id = %ctx.connection_id, "Peer unresponsive, dropping connection");
                break;
            }
        };

        match next {
            Some(Ok(msg)) => match msg {
                Message::Binary(data) => {
                    protocol::handle_binary_message(&data, &tx, &state, &ctx).await;
                }
                Message::Text(text) => {
                    // We use binary protobuf, but handle text gracefully
                    tracing::debug!(
                        connection_id = %ctx.connection_id,
                        "Received text message (expected binary protobuf): {}",
                        text.chars().take(100).collect::<String>()
                    );
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(
                        connection_id = %ctx.connection_id,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    connection_id = %ctx.connection_id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                tracing::info!(connection_id = %ctx.connection_id, "WebSocket stream ended");
                break;
            }
        }
    }

    writer_handle.abort();
    keepalive_handle.abort();

    relay.unsubscribe(&ctx.connection_id);
    state.sessions.remove_connection(&ctx.connection_id);

    tracing::info!(
        connection_id = %ctx.connection_id,
        "WebSocket actor stopped"
    );
}

/// Writer task: receives messages from mpsc channel and forwards them to the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            break;
        }
    }
}

/// Ping on a fixed interval. When a pong does not arrive in time, queue a close
/// frame and tell the reader loop to stop waiting on the peer.
async fn keepalive_task(
    tx: ConnectionSender,
    mut pong_rx: mpsc::UnboundedReceiver<()>,
    dead_tx: oneshot::Sender<()>,
    settings: WsConfig,
    connection_id: String,
) {
    let mut ticker = interval(Duration::from_secs(settings.ping_interval_secs.max(1)));
    let pong_timeout = Duration::from_secs(settings.pong_timeout_secs.max(1));
    // First tick fires immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;

        if tx.send(Message::Ping(vec![0x66, 0x77].into())).is_err() {
            break;
        }

        if !matches!(timeout(pong_timeout, pong_rx.recv()).await, Ok(Some(()))) {
            tracing::warn!(connection_id = %connection_id, "Pong timeout, closing connection");
            let _ = tx.send(Message::Close(Some(CloseFrame {
                code: 1001,
                reason: "Pong timeout".into(),
            })));
            let _ = dead_tx.send(());
            break;
        }
    }
}
