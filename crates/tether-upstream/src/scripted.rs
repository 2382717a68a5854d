//! In-memory upstream driver controlled from tests.
//!
//! A [`ScriptedSession`] does nothing on its own. Its paired
//! [`ScriptedController`] decides how `start` behaves, emits events and
//! readiness, and reports how many times each lifecycle call was made.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tether_core::Key;
use tokio::sync::{Notify, broadcast};

use crate::errors::UpstreamError;
use crate::session::{READY_EVENT, SessionFactory, UpstreamEvent, UpstreamSession};

const CHANNEL_CAPACITY: usize = 256;

/// Event names declared by scripted sessions.
pub const SCRIPTED_EVENTS: &[&str] = &["tip", "room_message"];

/// How a scripted session's `start` resolves.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum StartMode {
    /// Return `Ok` immediately.
    #[default]
    Succeed,
    /// Return `Err(Start(msg))` immediately.
    Fail(String),
    /// Block until [`ScriptedController::release`] is called, then succeed.
    Hang,
}

struct Shared {
    events: Mutex<Option<broadcast::Sender<UpstreamEvent>>>,
    mode: Mutex<StartMode>,
    release: Notify,
    hold_targets: AtomicBool,
    target_release: Notify,
    settings: Mutex<Value>,
    targets: Mutex<Vec<Key>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

/// Upstream session whose behavior is driven by a [`ScriptedController`].
pub struct ScriptedSession {
    shared: Arc<Shared>,
}

/// Test-side handle for a [`ScriptedSession`].
#[derive(Clone)]
pub struct ScriptedController {
    shared: Arc<Shared>,
}

impl ScriptedSession {
    /// Create a session and its controller.
    pub fn new(mode: StartMode) -> (Self, ScriptedController) {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        let shared = Arc::new(Shared {
            events: Mutex::new(Some(events)),
            mode: Mutex::new(mode),
            release: Notify::new(),
            hold_targets: AtomicBool::new(false),
            target_release: Notify::new(),
            settings: Mutex::new(json!({})),
            targets: Mutex::new(Vec::new()),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
        });
        (
            Self {
                shared: Arc::clone(&shared),
            },
            ScriptedController { shared },
        )
    }
}

#[async_trait]
impl UpstreamSession for ScriptedSession {
    async fn start(&self) -> Result<(), UpstreamError> {
        let _ = self.shared.starts.fetch_add(1, Ordering::SeqCst);
        let mode = self.shared.mode.lock().clone();
        match mode {
            StartMode::Succeed => Ok(()),
            StartMode::Fail(msg) => Err(UpstreamError::Start(msg)),
            StartMode::Hang => {
                self.shared.release.notified().await;
                Ok(())
            }
        }
    }

    async fn set_target(&self, key: &Key) -> Result<(), UpstreamError> {
        self.shared.targets.lock().push(key.clone());
        if self.shared.hold_targets.load(Ordering::SeqCst) {
            self.shared.target_release.notified().await;
        }
        Ok(())
    }

    async fn stop(&self) {
        let _ = self.shared.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn event_names(&self) -> &[&'static str] {
        SCRIPTED_EVENTS
    }

    fn settings(&self) -> Value {
        self.shared.settings.lock().clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<UpstreamEvent> {
        match self.shared.events.lock().as_ref() {
            Some(tx) => tx.subscribe(),
            // already closed: hand out a receiver that reports Closed
            None => broadcast::channel(1).1,
        }
    }
}

impl ScriptedController {
    /// Emit a named event. Returns the number of live subscribers.
    pub fn emit(&self, name: &str, payload: Value) -> usize {
        self.shared
            .events
            .lock()
            .as_ref()
            .and_then(|tx| tx.send(UpstreamEvent::new(name, payload)).ok())
            .unwrap_or(0)
    }

    /// Replace the settings snapshot and emit the readiness event.
    pub fn become_ready(&self, settings: Value) -> usize {
        *self.shared.settings.lock() = settings.clone();
        self.emit(READY_EVENT, settings)
    }

    /// Let a `Hang` start complete.
    pub fn release(&self) {
        self.shared.release.notify_one();
    }

    /// Make later `set_target` calls block until [`release_targets`](Self::release_targets).
    ///
    /// The key is recorded before blocking, so [`targets`](Self::targets)
    /// shows a call that is still in flight.
    pub fn hold_targets(&self) {
        self.shared.hold_targets.store(true, Ordering::SeqCst);
    }

    /// Let a held `set_target` complete and stop holding later ones.
    pub fn release_targets(&self) {
        self.shared.hold_targets.store(false, Ordering::SeqCst);
        self.shared.target_release.notify_one();
    }

    /// Change how later `start` calls resolve.
    pub fn set_start_mode(&self, mode: StartMode) {
        *self.shared.mode.lock() = mode;
    }

    /// Number of `start` calls so far.
    pub fn start_calls(&self) -> usize {
        self.shared.starts.load(Ordering::SeqCst)
    }

    /// Number of `stop` calls so far.
    pub fn stop_calls(&self) -> usize {
        self.shared.stops.load(Ordering::SeqCst)
    }

    /// Keys passed to `set_target`, in call order.
    pub fn targets(&self) -> Vec<Key> {
        self.shared.targets.lock().clone()
    }

    /// Current number of event subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.shared
            .events
            .lock()
            .as_ref()
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Close the event channel, as a crashed driver would.
    ///
    /// Subscribers observe `Closed`; later `emit` calls return 0.
    pub fn close(&self) {
        drop(self.shared.events.lock().take());
    }
}

/// Factory that builds [`ScriptedSession`]s and keeps every controller.
#[derive(Default)]
pub struct ScriptedFactory {
    mode: Mutex<StartMode>,
    controllers: Mutex<HashMap<Key, Vec<ScriptedController>>>,
}

impl ScriptedFactory {
    /// Factory whose sessions start according to `mode`.
    pub fn new(mode: StartMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            controllers: Mutex::new(HashMap::new()),
        }
    }

    /// Change the start mode for sessions created later.
    pub fn set_start_mode(&self, mode: StartMode) {
        *self.mode.lock() = mode;
    }

    /// Controller of the most recent session created for `key`.
    pub fn controller(&self, key: &str) -> Option<ScriptedController> {
        self.controllers
            .lock()
            .get(key)
            .and_then(|list| list.last().cloned())
    }

    /// How many sessions have been created for `key`.
    pub fn created(&self, key: &str) -> usize {
        self.controllers.lock().get(key).map_or(0, Vec::len)
    }

    /// Total sessions created across all keys.
    pub fn total_created(&self) -> usize {
        self.controllers.lock().values().map(Vec::len).sum()
    }
}

impl SessionFactory for ScriptedFactory {
    fn create(&self, key: &Key) -> Arc<dyn UpstreamSession> {
        let mode = self.mode.lock().clone();
        let (session, controller) = ScriptedSession::new(mode);
        self.controllers
            .lock()
            .entry(key.clone())
            .or_default()
            .push(controller);
        Arc::new(session)
    }
}
