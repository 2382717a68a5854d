//! Helpers shared by unit tests.

use std::sync::Arc;
use std::time::Duration;

use tether_core::{ClientId, Frame};
use tokio::sync::mpsc;

use crate::websocket::connection::ClientConnection;

pub(crate) fn client(id: &str) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
    let (tx, rx) = mpsc::channel(64);
    (Arc::new(ClientConnection::new(ClientId::from(id), tx)), rx)
}

/// Decode every frame currently queued for a client.
pub(crate) fn drain(rx: &mut mpsc::Receiver<Arc<String>>) -> Vec<Frame> {
    let mut frames = Vec::new();
    while let Ok(text) = rx.try_recv() {
        frames.push(serde_json::from_str(&text).unwrap());
    }
    frames
}

pub(crate) fn events_named<'a>(frames: &'a [Frame], name: &str) -> Vec<&'a Frame> {
    frames.iter().filter(|f| f.event == name).collect()
}

/// Let spawned tasks run to their next await point.
pub(crate) async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

/// Poll `cond` until it holds, failing after two seconds.
pub(crate) async fn wait_for(cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
