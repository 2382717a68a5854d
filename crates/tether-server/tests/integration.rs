//! End-to-end tests using a real `WebSocket` client against scripted
//! upstream sessions.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use tether_server::access::AccessGate;
use tether_server::config::ServerConfig;
use tether_server::registry::SessionRegistry;
use tether_server::server::{ServerHandle, TetherServer};
use tether_upstream::SessionFactory;
use tether_upstream::scripted::{ScriptedController, ScriptedFactory};

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

struct TestServer {
    url: String,
    server: TetherServer,
    handle: ServerHandle,
    factory: Arc<ScriptedFactory>,
}

async fn boot_with(gate: AccessGate, reclaim_interval: Duration) -> TestServer {
    let factory = Arc::new(ScriptedFactory::default());
    let registry = Arc::new(SessionRegistry::new(
        Arc::clone(&factory) as Arc<dyn SessionFactory>,
        gate,
    ));
    let config = ServerConfig {
        reclaim_interval,
        ..ServerConfig::default()
    };
    let server = TetherServer::new(config, registry);
    let handle = server.listen().await.unwrap();
    TestServer {
        url: format!("ws://{}/ws", handle.addr),
        server,
        handle,
        factory,
    }
}

async fn boot() -> TestServer {
    boot_with(AccessGate::disabled(), Duration::from_secs(3600)).await
}

async fn connect(url: &str) -> (WsStream, String) {
    let (mut ws, _) = connect_async(url).await.unwrap();
    let connected = next_frame(&mut ws).await;
    assert_eq!(connected["event"], "connected");
    let id = connected["data"]["clientId"].as_str().unwrap().to_string();
    (ws, id)
}

async fn send(ws: &mut WsStream, frame: Value) {
    ws.send(Message::Text(frame.to_string().into())).await.unwrap();
}

async fn next_frame(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Read frames until one named `event` arrives.
async fn next_named(ws: &mut WsStream, event: &str) -> Value {
    loop {
        let frame = next_frame(ws).await;
        if frame["event"] == event {
            return frame;
        }
    }
}

/// Assert nothing arrives for a short while.
async fn assert_silent(ws: &mut WsStream) {
    if let Ok(Some(Ok(Message::Text(text)))) =
        timeout(Duration::from_millis(200), ws.next()).await
    {
        panic!("unexpected frame: {}", text.as_str());
    }
}

async fn controller(factory: &ScriptedFactory, key: &str) -> ScriptedController {
    timeout(TIMEOUT, async {
        loop {
            if let Some(ctl) = factory.controller(key) {
                return ctl;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("group never created")
}

async fn wait_until(cond: impl Fn() -> bool) {
    timeout(TIMEOUT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached");
}

#[tokio::test]
async fn connect_receives_client_id() {
    let t = boot().await;
    let (_ws, id) = connect(&t.url).await;
    assert!(id.starts_with("client_"));
    wait_until(|| t.server.registry().client_count() == 1).await;
}

#[tokio::test]
async fn subscribe_then_ready_delivers_init_and_events() {
    let t = boot().await;
    let (mut ws, _) = connect(&t.url).await;
    send(&mut ws, json!({"event": "init", "data": "alice"})).await;

    let ctl = controller(&t.factory, "alice").await;
    wait_until(|| ctl.start_calls() == 1).await;
    assert_silent(&mut ws).await;

    let _ = ctl.become_ready(json!({"room": "alice", "status": "public"}));
    let init = next_frame(&mut ws).await;
    assert_eq!(init["event"], "init");
    assert_eq!(init["data"]["room"], "alice");
    let state = next_frame(&mut ws).await;
    assert_eq!(state["event"], "state_change");

    let _ = ctl.emit("tip", json!({"amount": 50, "from": "viewer1"}));
    let tip = next_frame(&mut ws).await;
    assert_eq!(tip["event"], "tip");
    assert_eq!(tip["data"], json!({"amount": 50, "from": "viewer1"}));
}

#[tokio::test]
async fn clients_share_one_session() {
    let t = boot().await;
    let (mut a, _) = connect(&t.url).await;
    let (mut b, _) = connect(&t.url).await;
    send(&mut a, json!({"event": "init", "data": "bob"})).await;
    let ctl = controller(&t.factory, "bob").await;
    let _ = ctl.become_ready(json!({"room": "bob"}));
    let _ = next_named(&mut a, "init").await;

    send(&mut b, json!({"event": "init", "data": {"username": "bob"}})).await;
    let init = next_frame(&mut b).await;
    assert_eq!(init["event"], "init");
    assert_eq!(t.factory.created("bob"), 1);

    let _ = ctl.emit("room_message", json!({"message": "hello"}));
    assert_eq!(next_named(&mut a, "room_message").await["data"]["message"], "hello");
    assert_eq!(next_named(&mut b, "room_message").await["data"]["message"], "hello");
}

#[tokio::test]
async fn denied_key_creates_no_group() {
    let dir = tempfile::tempdir().unwrap();
    let path: PathBuf = dir.path().join("users.json");
    std::fs::write(&path, r#"{"users": {"alice": true}}"#).unwrap();
    let t = boot_with(AccessGate::new(true, Some(path)), Duration::from_secs(3600)).await;

    let (mut ws, _) = connect(&t.url).await;
    send(&mut ws, json!({"event": "init", "data": "mallory"})).await;
    let denied = next_frame(&mut ws).await;
    assert_eq!(denied["event"], "denied");
    assert_eq!(denied["data"]["key"], "mallory");
    assert_eq!(t.factory.total_created(), 0);
    assert_eq!(t.server.registry().group_count(), 0);
}

#[tokio::test]
async fn malformed_frame_gets_error_and_connection_survives() {
    let t = boot().await;
    let (mut ws, _) = connect(&t.url).await;
    ws.send(Message::Text("not json".into())).await.unwrap();
    let err = next_frame(&mut ws).await;
    assert_eq!(err["event"], "error");

    send(&mut ws, json!({"event": "init", "data": "carol"})).await;
    let _ = controller(&t.factory, "carol").await;
}

#[tokio::test]
async fn disconnect_request_detaches_and_reclaim_stops_session() {
    let t = boot_with(AccessGate::disabled(), Duration::from_millis(200)).await;
    let (mut ws, id) = connect(&t.url).await;
    send(&mut ws, json!({"event": "init", "data": "dave"})).await;
    let ctl = controller(&t.factory, "dave").await;
    let group = t.server.registry().group("dave").unwrap();
    wait_until(|| group.client_count() == 1).await;

    send(&mut ws, json!({"event": "disconnect"})).await;
    wait_until(|| group.is_empty()).await;
    wait_until(|| ctl.stop_calls() == 1).await;
    assert_eq!(t.server.registry().group_count(), 0);
    assert!(t.server.registry().subscription(&id.as_str().into()).is_none());
}

#[tokio::test]
async fn socket_close_detaches_client() {
    let t = boot().await;
    let (mut ws, _) = connect(&t.url).await;
    send(&mut ws, json!({"event": "init", "data": "erin"})).await;
    let _ = controller(&t.factory, "erin").await;
    let group = t.server.registry().group("erin").unwrap();
    wait_until(|| group.client_count() == 1).await;

    ws.close(None).await.unwrap();
    drop(ws);
    wait_until(|| group.is_empty()).await;
    wait_until(|| t.server.registry().client_count() == 0).await;
    // not reclaimed until the next pass
    assert_eq!(t.server.registry().group_count(), 1);
}

#[tokio::test]
async fn graceful_shutdown_stops_groups() {
    let t = boot().await;
    let (mut ws, _) = connect(&t.url).await;
    send(&mut ws, json!({"event": "init", "data": "frank"})).await;
    let ctl = controller(&t.factory, "frank").await;

    t.server
        .shutdown_gracefully(t.handle, Some(Duration::from_secs(2)))
        .await;
    assert_eq!(ctl.stop_calls(), 1);
    assert_eq!(t.server.registry().group_count(), 0);
}
