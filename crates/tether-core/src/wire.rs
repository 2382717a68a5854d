//! Client wire format.
//!
//! Every WebSocket text frame, in either direction, is a JSON object
//! `{"event": <name>, "data": <payload>}`. `data` is always written, as `null`
//! when there is no payload, so upstream event payloads are carried through
//! untouched. Inbound frames may leave it out.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::ids::{ClientId, Key};

/// Outbound: acknowledgment sent immediately on connection.
pub const CONNECTED: &str = "connected";
/// Outbound: the requested key was refused by the access gate.
pub const DENIED: &str = "denied";
/// Inbound subscription request and outbound settings snapshot share a name.
pub const INIT: &str = "init";
/// Inbound: client asks to be disconnected.
pub const DISCONNECT: &str = "disconnect";
/// Outbound: a frame from the client could not be understood.
pub const ERROR: &str = "error";

/// A single message exchanged with a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Event name.
    pub event: String,
    /// Event payload (`null` when absent).
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    /// Build a frame from a name and payload.
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// `connected` acknowledgment carrying the assigned client id.
    pub fn connected(client_id: &ClientId) -> Self {
        Self::new(CONNECTED, serde_json::json!({ "clientId": client_id }))
    }

    /// `denied` reply for a refused key.
    pub fn denied(key: &Key) -> Self {
        Self::new(DENIED, serde_json::json!({ "key": key }))
    }

    /// `init` reply carrying the upstream settings snapshot.
    pub fn init(snapshot: Value) -> Self {
        Self::new(INIT, snapshot)
    }

    /// `error` reply for an unusable inbound frame.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ERROR, serde_json::json!({ "message": message.into() }))
    }

    /// Serialize to the JSON text sent over the socket.
    pub fn to_text(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A request parsed from an inbound client frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientRequest {
    /// Subscribe to the session group for a key.
    Init(Key),
    /// Tear down this connection.
    Disconnect,
}

/// Errors decoding inbound frames.
#[derive(Debug, Error)]
pub enum WireError {
    /// Not a JSON frame object.
    #[error("invalid frame: {0}")]
    Json(#[from] serde_json::Error),
    /// `init` without a usable key.
    #[error("init requires a non-empty key")]
    MissingKey,
    /// An event name this server does not accept from clients.
    #[error("unsupported event: {0}")]
    UnsupportedEvent(String),
}

impl ClientRequest {
    /// Parse an inbound text frame.
    ///
    /// `init` accepts either a bare string (`"data": "alice"`) or an object
    /// with a `username` or `key` field.
    pub fn parse(text: &str) -> Result<Self, WireError> {
        let frame: Frame = serde_json::from_str(text)?;
        match frame.event.as_str() {
            INIT => {
                let key = match &frame.data {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(map) => map
                        .get("username")
                        .or_else(|| map.get("key"))
                        .and_then(Value::as_str)
                        .map(str::to_owned),
                    _ => None,
                }
                .map(Key::from)
                .filter(|k| !k.is_blank())
                .ok_or(WireError::MissingKey)?;
                Ok(Self::Init(key))
            }
            DISCONNECT => Ok(Self::Disconnect),
            other => Err(WireError::UnsupportedEvent(other.to_owned())),
        }
    }
}
