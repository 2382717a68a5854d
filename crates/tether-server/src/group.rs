//! Session group: one upstream session shared by every client of one key.
//!
//! The group owns the session, the attached clients and one
//! [`EventForwarder`] per (client, event name). A single pump task reads the
//! session's event stream and delivers each event while holding the group
//! lock; `attach` and `detach` take the same lock, so a detached client never
//! sees an event processed after `detach` returns.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tether_core::{ClientId, Frame, Key};
use tether_upstream::{READY_EVENT, UpstreamEvent, UpstreamSession};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::forwarder::{EventForwarder, Revocation};
use crate::websocket::connection::ClientConnection;

/// Lifecycle phase of a group's upstream session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupPhase {
    /// Created, `start` not yet called.
    Idle,
    /// Startup in flight or finished, readiness not yet seen.
    Starting,
    /// Readiness event received.
    Ready,
    /// Startup failed. Permanent.
    Failed,
    /// Stopped. Terminal; the group is never reused.
    Stopped,
}

/// Read-only view of a group for the `/groups` endpoint.
#[derive(Clone, Debug, Serialize)]
pub struct GroupInfo {
    /// Group key.
    pub key: Key,
    /// Attached client count.
    pub clients: usize,
    /// Current phase.
    pub phase: GroupPhase,
    /// Seconds since the group was created.
    pub age_secs: u64,
}

struct Binding {
    forwarder: EventForwarder,
    revocation: Revocation,
}

struct GroupState {
    phase: GroupPhase,
    clients: HashMap<ClientId, Arc<ClientConnection>>,
    bindings: HashMap<ClientId, HashMap<Arc<str>, Binding>>,
}

/// One upstream session and the clients sharing it.
pub struct SessionGroup {
    key: Key,
    session: Arc<dyn UpstreamSession>,
    event_names: Vec<Arc<str>>,
    state: Mutex<GroupState>,
    events: Mutex<Option<broadcast::Receiver<UpstreamEvent>>>,
    cancel: CancellationToken,
    created_at: Instant,
}

impl SessionGroup {
    /// Create an idle group. Subscribes to the session immediately so no
    /// event emitted after construction is missed.
    pub fn new(key: Key, session: Arc<dyn UpstreamSession>) -> Self {
        let mut event_names: Vec<Arc<str>> =
            session.event_names().iter().map(|n| Arc::from(*n)).collect();
        if !event_names.iter().any(|n| &**n == READY_EVENT) {
            event_names.push(Arc::from(READY_EVENT));
        }
        let events = session.subscribe();
        Self {
            key,
            session,
            event_names,
            state: Mutex::new(GroupState {
                phase: GroupPhase::Idle,
                clients: HashMap::new(),
                bindings: HashMap::new(),
            }),
            events: Mutex::new(Some(events)),
            cancel: CancellationToken::new(),
            created_at: Instant::now(),
        }
    }

    /// Group key.
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Current phase.
    pub fn phase(&self) -> GroupPhase {
        self.state.lock().phase
    }

    /// Whether the readiness event has been seen (and the group not stopped).
    pub fn is_ready(&self) -> bool {
        self.phase() == GroupPhase::Ready
    }

    /// Whether the group has been stopped and must not be reused.
    pub fn is_stopped(&self) -> bool {
        self.phase() == GroupPhase::Stopped
    }

    /// Whether no client is attached.
    pub fn is_empty(&self) -> bool {
        self.state.lock().clients.is_empty()
    }

    /// Attached client count.
    pub fn client_count(&self) -> usize {
        self.state.lock().clients.len()
    }

    /// Whether `id` is attached.
    pub fn contains(&self, id: &ClientId) -> bool {
        self.state.lock().clients.contains_key(id)
    }

    /// Number of live forwarders across all clients.
    pub fn live_forwarders(&self) -> usize {
        self.state
            .lock()
            .bindings
            .values()
            .flat_map(HashMap::values)
            .filter(|b| b.forwarder.is_live())
            .count()
    }

    /// Snapshot for reporting.
    pub fn info(&self) -> GroupInfo {
        let state = self.state.lock();
        GroupInfo {
            key: self.key.clone(),
            clients: state.clients.len(),
            phase: state.phase,
            age_secs: self.age().as_secs(),
        }
    }

    /// Time since creation.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Begin upstream startup in the background.
    ///
    /// Returns `true` the first time; later calls do nothing.
    pub fn start(self: &Arc<Self>) -> bool {
        {
            let mut state = self.state.lock();
            if state.phase != GroupPhase::Idle {
                return false;
            }
            state.phase = GroupPhase::Starting;
        }

        if let Some(events) = self.events.lock().take() {
            drop(tokio::spawn(pump(
                Arc::downgrade(self),
                events,
                self.cancel.clone(),
            )));
        }

        let group = Arc::clone(self);
        drop(tokio::spawn(async move { group.run_startup().await }));
        true
    }

    #[instrument(skip_all, fields(key = %self.key))]
    async fn run_startup(&self) {
        match self.session.start().await {
            Ok(()) => {
                if self.is_stopped() {
                    info!("group stopped during startup, stopping late session");
                    self.session.stop().await;
                    return;
                }
                if let Err(error) = self.session.set_target(&self.key).await {
                    warn!(%error, "failed to target upstream session");
                    self.mark_failed();
                    return;
                }
                if self.is_stopped() {
                    info!("group stopped while targeting, stopping session again");
                    self.session.stop().await;
                    return;
                }
                debug!("upstream session started");
            }
            Err(error) => {
                warn!(%error, "upstream session failed to start");
                self.mark_failed();
            }
        }
    }

    fn mark_failed(&self) {
        let mut state = self.state.lock();
        if state.phase != GroupPhase::Stopped {
            state.phase = GroupPhase::Failed;
        }
    }

    /// Attach a client, binding one forwarder per event name.
    ///
    /// Attaching an already-attached client replaces its forwarders. If the
    /// group is ready the client is sent the current snapshot.
    pub fn attach(&self, client: Arc<ClientConnection>) {
        let mut state = self.state.lock();
        let id = client.id.clone();

        if let Some(previous) = state.bindings.remove(&id) {
            for binding in previous.values() {
                let _ = binding.revocation.revoke();
            }
            debug!(key = %self.key, client_id = %id, "rebinding attached client");
        }

        let bindings = self
            .event_names
            .iter()
            .map(|name| {
                let (forwarder, revocation) =
                    EventForwarder::bind(Arc::clone(name), Arc::clone(&client));
                (
                    Arc::clone(name),
                    Binding {
                        forwarder,
                        revocation,
                    },
                )
            })
            .collect();
        let _ = state.bindings.insert(id.clone(), bindings);
        let _ = state.clients.insert(id, Arc::clone(&client));

        if state.phase == GroupPhase::Ready {
            let _ = client.send_frame(&Frame::init(self.session.settings()));
        }
    }

    /// Revoke every forwarder for `id` and remove it.
    ///
    /// Returns `false` for an unknown id.
    pub fn detach(&self, id: &ClientId) -> bool {
        let mut state = self.state.lock();
        if let Some(bindings) = state.bindings.remove(id) {
            for binding in bindings.values() {
                let _ = binding.revocation.revoke();
            }
        }
        state.clients.remove(id).is_some()
    }

    /// Stop the upstream session. Idempotent.
    ///
    /// Returns `true` if this call performed the stop.
    pub async fn stop(&self) -> bool {
        {
            let mut state = self.state.lock();
            if state.phase == GroupPhase::Stopped {
                return false;
            }
            state.phase = GroupPhase::Stopped;
        }
        self.cancel.cancel();
        self.session.stop().await;
        true
    }

    /// Deliver one upstream event to every attached client.
    fn deliver(&self, event: &UpstreamEvent) {
        let mut state = self.state.lock();
        if matches!(state.phase, GroupPhase::Failed | GroupPhase::Stopped) {
            return;
        }

        if event.is_ready() {
            if state.phase != GroupPhase::Ready {
                info!(key = %self.key, clients = state.clients.len(), "upstream session ready");
            }
            state.phase = GroupPhase::Ready;
            match Frame::init(self.session.settings()).to_text() {
                Ok(text) => {
                    let text = Arc::new(text);
                    for client in state.clients.values() {
                        let _ = client.send(Arc::clone(&text));
                    }
                }
                Err(error) => warn!(key = %self.key, %error, "failed to encode snapshot"),
            }
        }

        let encoded = match Frame::new(event.name.clone(), event.payload.clone()).to_text() {
            Ok(text) => Arc::new(text),
            Err(error) => {
                warn!(key = %self.key, event = %event.name, %error, "failed to encode event");
                return;
            }
        };
        let recipients = state
            .bindings
            .values()
            .filter_map(|bindings| bindings.get(event.name.as_str()))
            .filter(|binding| binding.forwarder.forward(&encoded))
            .count();
        debug!(key = %self.key, event = %event.name, recipients, "event delivered");
    }
}

async fn pump(
    weak: Weak<SessionGroup>,
    mut events: broadcast::Receiver<UpstreamEvent>,
    cancel: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            () = cancel.cancelled() => break,
            received = events.recv() => received,
        };
        let Some(group) = weak.upgrade() else { break };
        match received {
            Ok(event) => group.deliver(&event),
            Err(RecvError::Lagged(skipped)) => {
                warn!(key = %group.key, skipped, "event pump lagged, events dropped");
            }
            Err(RecvError::Closed) => {
                info!(key = %group.key, "upstream event stream closed");
                let _ = group.stop().await;
                break;
            }
        }
    }
}
