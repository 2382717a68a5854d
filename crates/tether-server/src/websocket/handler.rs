//! Inbound frame dispatch.

use std::sync::Arc;

use tether_core::{ClientRequest, Frame};
use tracing::debug;

use super::connection::ClientConnection;
use crate::registry::SessionRegistry;

/// What the session loop should do after a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading.
    Continue,
    /// Client asked to disconnect.
    Close,
}

/// Handle one inbound text frame.
///
/// Malformed frames get an `error` reply; the connection stays open.
pub async fn handle_message(
    text: &str,
    connection: &Arc<ClientConnection>,
    registry: &SessionRegistry,
) -> Flow {
    match ClientRequest::parse(text) {
        Ok(ClientRequest::Init(key)) => {
            let outcome = registry.on_subscribe(connection, key).await;
            debug!(client_id = %connection.id, ?outcome, "subscribe handled");
            Flow::Continue
        }
        Ok(ClientRequest::Disconnect) => Flow::Close,
        Err(error) => {
            debug!(client_id = %connection.id, %error, "rejected inbound frame");
            let _ = connection.send_frame(&Frame::error(error.to_string()));
            Flow::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AccessGate;
    use crate::test_support::{client, drain};
    use tether_core::Key;
    use tether_upstream::SessionFactory;
    use tether_upstream::scripted::ScriptedFactory;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(
            Arc::new(ScriptedFactory::default()) as Arc<dyn SessionFactory>,
            AccessGate::disabled(),
        )
    }

    #[tokio::test]
    async fn init_subscribes() {
        let registry = registry();
        let (conn, _rx) = client("c1");
        let flow = handle_message(r#"{"event":"init","data":"alice"}"#, &conn, &registry).await;
        assert_eq!(flow, Flow::Continue);
        assert_eq!(registry.subscription(&conn.id), Some(Key::from("alice")));
    }

    #[tokio::test]
    async fn disconnect_closes() {
        let registry = registry();
        let (conn, _rx) = client("c1");
        let flow = handle_message(r#"{"event":"disconnect"}"#, &conn, &registry).await;
        assert_eq!(flow, Flow::Close);
    }

    #[tokio::test]
    async fn malformed_frame_replies_error() {
        let registry = registry();
        let (conn, mut rx) = client("c1");
        for bad in ["not json", r#"{"event":"init"}"#, r#"{"event":"tip"}"#] {
            let flow = handle_message(bad, &conn, &registry).await;
            assert_eq!(flow, Flow::Continue);
        }
        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.event == "error"));
        assert!(frames[2].data["message"].as_str().unwrap().contains("tip"));
        assert_eq!(registry.group_count(), 0);
    }
}
