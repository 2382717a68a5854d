//! Revocable per-client event bindings.
//!
//! An [`EventForwarder`] relays one named upstream event to one client. It is
//! created together with a [`Revocation`]; once revoked the forwarder never
//! delivers again. Revocation and delivery both run under the owning group's
//! lock, so a revoked forwarder cannot race an in-flight event.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::websocket::connection::ClientConnection;

/// Relays one event name to one client.
pub struct EventForwarder {
    event: Arc<str>,
    target: Arc<ClientConnection>,
    live: Arc<AtomicBool>,
}

/// Handle that disables exactly one [`EventForwarder`].
pub struct Revocation {
    live: Arc<AtomicBool>,
}

impl EventForwarder {
    /// Bind `event` to `target`.
    pub fn bind(event: Arc<str>, target: Arc<ClientConnection>) -> (Self, Revocation) {
        let live = Arc::new(AtomicBool::new(true));
        let revocation = Revocation {
            live: Arc::clone(&live),
        };
        (
            Self {
                event,
                target,
                live,
            },
            revocation,
        )
    }

    /// Event name this forwarder relays.
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Whether the binding is still active.
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Deliver an already-encoded frame for this event.
    ///
    /// Returns `false` if revoked or the client's queue rejected it.
    pub fn forward(&self, encoded: &Arc<String>) -> bool {
        self.is_live() && self.target.send(Arc::clone(encoded))
    }
}

impl Revocation {
    /// Disable the forwarder. Returns `true` only on the first call.
    pub fn revoke(&self) -> bool {
        self.live.swap(false, Ordering::AcqRel)
    }

    /// Whether [`revoke`](Self::revoke) has been called.
    pub fn is_revoked(&self) -> bool {
        !self.live.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::ClientId;
    use tokio::sync::mpsc;

    fn target() -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(8);
        (
            Arc::new(ClientConnection::new(ClientId::from("client_f"), tx)),
            rx,
        )
    }

    #[test]
    fn forwards_until_revoked() {
        let (conn, mut rx) = target();
        let (fwd, revocation) = EventForwarder::bind(Arc::from("tip"), conn);
        assert_eq!(fwd.event(), "tip");

        let frame = Arc::new(r#"{"event":"tip","data":1}"#.to_string());
        assert!(fwd.forward(&frame));
        assert_eq!(rx.try_recv().unwrap(), frame);

        assert!(revocation.revoke());
        assert!(revocation.is_revoked());
        assert!(!fwd.is_live());
        assert!(!fwd.forward(&frame));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn double_revoke_is_noop() {
        let (conn, _rx) = target();
        let (_fwd, revocation) = EventForwarder::bind(Arc::from("tip"), conn);
        assert!(revocation.revoke());
        assert!(!revocation.revoke());
    }

    #[test]
    fn revocation_is_per_binding() {
        let (conn, mut rx) = target();
        let (tip, tip_rev) = EventForwarder::bind(Arc::from("tip"), Arc::clone(&conn));
        let (msg, _msg_rev) = EventForwarder::bind(Arc::from("room_message"), conn);
        let _ = tip_rev.revoke();

        let frame = Arc::new("x".to_string());
        assert!(!tip.forward(&frame));
        assert!(msg.forward(&frame));
        assert_eq!(&*rx.try_recv().unwrap(), "x");
    }
}
