//! `WebSocket` client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use metrics::counter;
use parking_lot::Mutex;
use tether_core::{ClientId, Frame};
use tokio::sync::mpsc;
use tracing::warn;

use crate::metrics::CLIENT_SEND_DROPS_TOTAL;

/// A connected client. Shared between the session loop, the registry and
/// every forwarder bound to it.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ClientId,
    /// Send channel to the client's `WebSocket` write task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a new connection.
    pub fn new(id: ClientId, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Queue an encoded frame for the client.
    ///
    /// Never blocks. Returns `false` if the queue is full or the client is
    /// gone; the frame is dropped and counted.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            counter!(CLIENT_SEND_DROPS_TOTAL).increment(1);
            false
        }
    }

    /// Encode and queue a frame.
    pub fn send_frame(&self, frame: &Frame) -> bool {
        match frame.to_text() {
            Ok(text) => self.send(Arc::new(text)),
            Err(error) => {
                warn!(client_id = %self.id, event = %frame.event, %error, "failed to encode frame");
                false
            }
        }
    }

    /// Total frames dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Whether the write side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Record a pong (or any inbound activity).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Time since the last pong, or since connecting.
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
