//! Timer-driven upstream driver for running the server without a browser.
//!
//! After `start`, the session waits `ready_delay`, publishes a settings
//! snapshot through [`READY_EVENT`], then emits a synthetic domain event every
//! `event_interval` until stopped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tether_core::Key;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::UpstreamError;
use crate::session::{READY_EVENT, SessionFactory, UpstreamEvent, UpstreamSession};

const CHANNEL_CAPACITY: usize = 256;

/// Domain events a simulated session emits, in rotation.
pub const SIMULATED_EVENTS: &[&str] = &["tip", "room_message", "user_enter", "user_leave"];

/// Timing for simulated sessions.
#[derive(Clone, Copy, Debug)]
pub struct SimulatedConfig {
    /// Delay between `start` and the readiness event.
    pub ready_delay: Duration,
    /// Interval between synthetic events.
    pub event_interval: Duration,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            ready_delay: Duration::from_millis(1_500),
            event_interval: Duration::from_secs(5),
        }
    }
}

/// A local stand-in for a browser-driven upstream session.
pub struct SimulatedSession {
    config: SimulatedConfig,
    events: broadcast::Sender<UpstreamEvent>,
    settings: Arc<Mutex<Value>>,
    target: Arc<Mutex<Option<Key>>>,
    started: AtomicBool,
    cancel: CancellationToken,
}

impl SimulatedSession {
    /// Create an unstarted session.
    pub fn new(config: SimulatedConfig) -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            config,
            events,
            settings: Arc::new(Mutex::new(json!({}))),
            target: Arc::new(Mutex::new(None)),
            started: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl UpstreamSession for SimulatedSession {
    async fn start(&self) -> Result<(), UpstreamError> {
        if self.cancel.is_cancelled() {
            return Err(UpstreamError::Stopped);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let config = self.config;
        let events = self.events.clone();
        let settings = Arc::clone(&self.settings);
        let target = Arc::clone(&self.target);
        let cancel = self.cancel.clone();
        drop(tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(config.ready_delay) => {}
            }

            let room = target.lock().as_ref().map(Key::to_string);
            let snapshot = json!({
                "room": room,
                "status": "public",
                "readyAt": chrono::Utc::now().to_rfc3339(),
            });
            *settings.lock() = snapshot.clone();
            let _ = events.send(UpstreamEvent::new(READY_EVENT, snapshot));
            info!(room = ?room, "simulated session ready");

            let mut seq: u64 = 0;
            let mut ticker = tokio::time::interval(config.event_interval);
            let _ = ticker.tick().await;
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let event = synthetic_event(seq);
                        seq += 1;
                        debug!(event = %event.name, "simulated event");
                        let _ = events.send(event);
                    }
                }
            }
        }));
        Ok(())
    }

    async fn set_target(&self, key: &Key) -> Result<(), UpstreamError> {
        if self.cancel.is_cancelled() {
            return Err(UpstreamError::Stopped);
        }
        *self.target.lock() = Some(key.clone());
        Ok(())
    }

    async fn stop(&self) {
        self.cancel.cancel();
    }

    fn event_names(&self) -> &[&'static str] {
        SIMULATED_EVENTS
    }

    fn settings(&self) -> Value {
        self.settings.lock().clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<UpstreamEvent> {
        self.events.subscribe()
    }
}

fn synthetic_event(n: u64) -> UpstreamEvent {
    let len = SIMULATED_EVENTS.len() as u64;
    let name = SIMULATED_EVENTS[usize::try_from(n % len).unwrap_or(0)];
    let payload = match name {
        "tip" => json!({ "amount": (n % 50) + 1, "from": format!("viewer{}", n % 7) }),
        "room_message" => json!({ "message": format!("hello #{n}"), "from": format!("viewer{}", n % 7) }),
        _ => json!({ "user": format!("viewer{}", n % 7) }),
    };
    UpstreamEvent::new(name, payload)
}

/// Factory for [`SimulatedSession`]s.
pub struct SimulatedFactory {
    config: SimulatedConfig,
}

impl SimulatedFactory {
    /// Factory producing sessions with the given timing.
    pub fn new(config: SimulatedConfig) -> Self {
        Self { config }
    }
}

impl SessionFactory for SimulatedFactory {
    fn create(&self, _key: &Key) -> Arc<dyn UpstreamSession> {
        Arc::new(SimulatedSession::new(self.config))
    }
}
