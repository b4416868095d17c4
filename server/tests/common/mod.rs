//! Shared helpers for integration tests: an in-process server on a random port.
#![allow(dead_code)]

use futures_util::StreamExt;
use prost::Message as ProstMessage;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use fleetwatch_server::auth::jwt;
use fleetwatch_server::auth::middleware::Role;
use fleetwatch_server::config::WsConfig;
use fleetwatch_server::db::models::{NewDriver, NewVehicle};
use fleetwatch_server::proto::ws::Envelope;
use fleetwatch_server::state::AppState;
use fleetwatch_server::store::{FleetStore, SqliteStore};

pub type WsRead = futures_util::stream::SplitStream<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
>;

pub const TEST_SECRET: &[u8] = b"integration-test-secret-0123456789";

pub struct TestServer {
    pub base_url: String,
    pub addr: SocketAddr,
    /// Same database the server uses, for provisioning and assertions
    pub store: SqliteStore,
    /// Shared with the running router, for registry assertions
    pub state: AppState,
    _tmp_dir: tempfile::TempDir,
}

impl TestServer {
    pub fn ws_url(&self, token: Option<&str>) -> String {
        match token {
            Some(token) => format!("ws://{}/ws?token={}", self.addr, token),
            None => format!("ws://{}/ws", self.addr),
        }
    }

    /// Register one vehicle and one active driver; returns (driver_id, vehicle_id).
    pub async fn seed_driver(&self, email: &str, plate: &str) -> (i64, i64) {
        let vehicle = self
            .store
            .register_vehicle(NewVehicle {
                number: "7".into(),
                route_label: "Centro - Terminal".into(),
                plate: plate.into(),
                capacity: Some(30),
            })
            .await
            .expect("Failed to register vehicle");
        let driver = self
            .store
            .register_driver(NewDriver {
                first_name: "Luis".into(),
                last_name: "Mora".into(),
                email: email.into(),
                assigned_vehicle_id: Some(vehicle.id),
            })
            .await
            .expect("Failed to register driver");
        (driver.id, vehicle.id)
    }
}

/// Start the server on a random port.
pub async fn start_test_server() -> TestServer {
    start_test_server_with(WsConfig::default()).await
}

/// Start the server on a random port with custom keepalive settings.
pub async fn start_test_server_with(ws: WsConfig) -> TestServer {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = fleetwatch_server::db::init_db(&data_dir).expect("Failed to init DB");
    let store = SqliteStore::new(db);
    let state = AppState::new(
        Arc::new(store.clone()) as Arc<dyn FleetStore>,
        TEST_SECRET.to_vec(),
        ws,
    );

    let app = fleetwatch_server::routes::build_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestServer {
        base_url: format!("http://{}", addr),
        addr,
        store,
        state,
        _tmp_dir: tmp_dir,
    }
}

pub fn driver_token(driver_id: i64) -> String {
    jwt::issue_access_token(
        TEST_SECRET,
        &format!("driver-{driver_id}"),
        Role::Driver,
        Some(driver_id),
        3600,
    )
    .expect("Failed to issue token")
}

pub fn admin_token() -> String {
    jwt::issue_access_token(TEST_SECRET, "dispatcher", Role::Admin, None, 3600)
        .expect("Failed to issue token")
}

pub fn frame(envelope: &Envelope) -> Message {
    Message::Binary(envelope.encode_to_vec().into())
}

/// Next binary envelope on the stream, skipping control frames.
pub async fn next_envelope(read: &mut WsRead) -> Envelope {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
            .await
            .expect("Expected a message within timeout")
            .expect("Stream ended")
            .expect("WebSocket error");
        match msg {
            Message::Binary(data) => {
                return Envelope::decode(data.as_ref()).expect("Failed to decode Envelope")
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("Expected binary message, got: {:?}", other),
        }
    }
}

/// Next envelope answering `request_id`, skipping broadcasts in between.
pub async fn next_response(read: &mut WsRead, request_id: &str) -> Envelope {
    loop {
        let env = next_envelope(read).await;
        if env.request_id == request_id {
            return env;
        }
    }
}
