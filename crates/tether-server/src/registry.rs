//! Session registry: routes clients to session groups by key.
//!
//! One lock guards both maps (key → group, client → group). Group locks are
//! only ever taken while holding it, never the other way round. Groups are
//! created on first demand and destroyed only by [`SessionRegistry::reclaim`].

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use metrics::{counter, gauge};
use parking_lot::Mutex;
use tether_core::{ClientId, Frame, Key};
use tether_upstream::SessionFactory;
use tracing::{debug, info, instrument};

use crate::access::AccessGate;
use crate::group::{GroupInfo, SessionGroup};
use crate::metrics::{
    ACCESS_DENIED_TOTAL, GROUPS_ACTIVE, GROUPS_CREATED_TOTAL, GROUPS_RECLAIMED_TOTAL,
};
use crate::websocket::connection::ClientConnection;

/// Result of a subscription request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// The access gate refused the key.
    Denied,
    /// Attached; `created` is true when this request created the group.
    Attached {
        /// Whether the group was created by this request.
        created: bool,
    },
}

#[derive(Default)]
struct RegistryState {
    groups: HashMap<Key, Arc<SessionGroup>>,
    /// `None` = connected but not subscribed.
    clients: HashMap<ClientId, Option<Arc<SessionGroup>>>,
}

/// Owns every live session group.
pub struct SessionRegistry {
    state: Mutex<RegistryState>,
    factory: Arc<dyn SessionFactory>,
    gate: AccessGate,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new(factory: Arc<dyn SessionFactory>, gate: AccessGate) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            factory,
            gate,
        }
    }

    /// Access gate in use.
    pub fn gate(&self) -> &AccessGate {
        &self.gate
    }

    /// Register a new connection with no group and acknowledge it.
    pub fn on_connect(&self, client: &Arc<ClientConnection>) {
        let _ = self.state.lock().clients.insert(client.id.clone(), None);
        let _ = client.send_frame(&Frame::connected(&client.id));
        debug!(client_id = %client.id, "client registered");
    }

    /// Subscribe `client` to `key`.
    ///
    /// A denied key sends `denied` and changes nothing. Otherwise the group
    /// is found or created (and started), the client is moved into it, and
    /// any previous subscription to a different key is dropped.
    #[instrument(skip_all, fields(client_id = %client.id, key = %key))]
    pub async fn on_subscribe(&self, client: &Arc<ClientConnection>, key: Key) -> SubscribeOutcome {
        if !self.gate.is_allowed(&key).await {
            counter!(ACCESS_DENIED_TOTAL).increment(1);
            info!("subscription denied");
            let _ = client.send_frame(&Frame::denied(&key));
            return SubscribeOutcome::Denied;
        }

        let mut guard = self.state.lock();
        let state = &mut *guard;

        let (group, created) = match state.groups.get(&key) {
            // a stopped group is never reused
            Some(group) if !group.is_stopped() => (Arc::clone(group), false),
            _ => {
                let group = Arc::new(SessionGroup::new(key.clone(), self.factory.create(&key)));
                let _ = group.start();
                let _ = state.groups.insert(key.clone(), Arc::clone(&group));
                counter!(GROUPS_CREATED_TOTAL).increment(1);
                gauge!(GROUPS_ACTIVE).set(state.groups.len() as f64);
                info!("session group created");
                (group, true)
            }
        };

        if let Some(Some(previous)) = state.clients.get(&client.id) {
            if !Arc::ptr_eq(previous, &group) {
                let _ = previous.detach(&client.id);
                debug!(previous = %previous.key(), "moved client off previous group");
            }
        }

        group.attach(Arc::clone(client));
        let _ = state.clients.insert(client.id.clone(), Some(group));
        debug!("client attached");
        SubscribeOutcome::Attached { created }
    }

    /// Forget a client and detach it from its group.
    ///
    /// Returns `false` if the client was unknown. Calling twice is harmless.
    pub fn on_disconnect(&self, id: &ClientId) -> bool {
        let mut state = self.state.lock();
        match state.clients.remove(id) {
            None => false,
            Some(None) => {
                debug!(client_id = %id, "unsubscribed client disconnected");
                true
            }
            Some(Some(group)) => {
                let _ = group.detach(id);
                debug!(client_id = %id, key = %group.key(), "client detached");
                true
            }
        }
    }

    /// Stop and remove every group that is empty right now.
    ///
    /// Returns the number of groups reclaimed.
    pub async fn reclaim(&self) -> usize {
        let reclaimed: Vec<Arc<SessionGroup>> = {
            let mut state = self.state.lock();
            let mut empty = Vec::new();
            state.groups.retain(|_, group| {
                if group.is_empty() {
                    empty.push(Arc::clone(group));
                    false
                } else {
                    true
                }
            });
            gauge!(GROUPS_ACTIVE).set(state.groups.len() as f64);
            empty
        };

        let mut stopped = 0_u64;
        for group in &reclaimed {
            info!(key = %group.key(), "reclaiming empty session group");
            if group.stop().await {
                stopped += 1;
            }
        }
        counter!(GROUPS_RECLAIMED_TOTAL).increment(stopped);
        reclaimed.len()
    }

    /// Stop every live group. Clients are not notified.
    pub async fn shutdown(&self) {
        let groups: Vec<Arc<SessionGroup>> = {
            let mut state = self.state.lock();
            state.clients.clear();
            state.groups.drain().map(|(_, group)| group).collect()
        };
        gauge!(GROUPS_ACTIVE).set(0.0);
        info!(groups = groups.len(), "stopping all session groups");
        let _ = join_all(groups.iter().map(|group| group.stop())).await;
    }

    /// Group currently registered for `key`.
    pub fn group(&self, key: &str) -> Option<Arc<SessionGroup>> {
        self.state.lock().groups.get(key).map(Arc::clone)
    }

    /// Key the client is subscribed to, if any.
    pub fn subscription(&self, id: &ClientId) -> Option<Key> {
        self.state
            .lock()
            .clients
            .get(id)
            .and_then(|g| g.as_ref().map(|g| g.key().clone()))
    }

    /// Connected client count (subscribed or not).
    pub fn client_count(&self) -> usize {
        self.state.lock().clients.len()
    }

    /// Live group count.
    pub fn group_count(&self) -> usize {
        self.state.lock().groups.len()
    }

    /// Per-group summary, sorted by key.
    pub fn groups(&self) -> Vec<GroupInfo> {
        let mut infos: Vec<GroupInfo> = self
            .state
            .lock()
            .groups
            .values()
            .map(|g| g.info())
            .collect();
        infos.sort_by(|a, b| a.key.cmp(&b.key));
        infos
    }
}
