//! The upstream session trait.
//!
//! An upstream session drives one external resource for one [`Key`]. It is
//! started once, pointed at its key, and emits named events on a broadcast
//! channel until stopped. Readiness arrives asynchronously as a
//! [`READY_EVENT`] at any time after `start`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tether_core::Key;
use tokio::sync::broadcast;

use crate::errors::UpstreamError;

/// Name of the event an upstream session emits when it becomes ready.
pub const READY_EVENT: &str = "state_change";

/// A named event emitted by an upstream session.
#[derive(Clone, Debug, PartialEq)]
pub struct UpstreamEvent {
    /// Event name (one of the session's declared names, or [`READY_EVENT`]).
    pub name: String,
    /// Opaque payload, forwarded to clients unchanged.
    pub payload: Value,
}

impl UpstreamEvent {
    /// Build an event.
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// Whether this is the readiness event.
    pub fn is_ready(&self) -> bool {
        self.name == READY_EVENT
    }
}

/// One upstream session.
///
/// Implementations must be cheap to `subscribe` to before `start` is called;
/// session groups subscribe at construction so no event is missed.
#[async_trait]
pub trait UpstreamSession: Send + Sync {
    /// Start the session. May take arbitrarily long and may fail.
    async fn start(&self) -> Result<(), UpstreamError>;

    /// Point the started session at `key`.
    async fn set_target(&self, key: &Key) -> Result<(), UpstreamError>;

    /// Stop the session. Must be safe to call more than once and before
    /// `start` has completed.
    async fn stop(&self);

    /// Statically declared domain event names (excluding [`READY_EVENT`]).
    fn event_names(&self) -> &[&'static str];

    /// Current settings snapshot, sent to clients as `init`.
    fn settings(&self) -> Value;

    /// Subscribe to the session's event stream.
    fn subscribe(&self) -> broadcast::Receiver<UpstreamEvent>;
}

/// Creates one upstream session per session group.
pub trait SessionFactory: Send + Sync {
    /// Build a fresh, not-yet-started session for `key`.
    fn create(&self, key: &Key) -> Arc<dyn UpstreamSession>;
}
