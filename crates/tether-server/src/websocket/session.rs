//! `WebSocket` session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tether_core::ClientId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::handler::{Flow, handle_message};
use crate::config::ServerConfig;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::registry::SessionRegistry;

/// Run a `WebSocket` session for a connected client.
///
/// 1. Registers the client, which queues the `connected` acknowledgment
/// 2. Dispatches inbound text frames (`init`, `disconnect`)
/// 3. Writes queued outbound frames and periodic Pings
/// 4. Detaches the client from its group on close, error, pong timeout or
///    server shutdown
#[instrument(skip_all, fields(client_id = %client_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    client_id: ClientId,
    registry: Arc<SessionRegistry>,
    config: Arc<ServerConfig>,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(config.max_send_queue);
    let connection = Arc::new(ClientConnection::new(client_id.clone(), send_tx));

    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    registry.on_connect(&connection);

    let outbound_conn = Arc::clone(&connection);
    let heartbeat_interval = config.heartbeat_interval;
    let heartbeat_timeout = config.heartbeat_timeout;
    let mut outbound = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(heartbeat_interval);
        // Skip the immediate first tick
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    let Some(text) = msg else { break };
                    if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if !outbound_conn.check_alive()
                        && outbound_conn.last_pong_elapsed() > heartbeat_timeout
                    {
                        warn!("client unresponsive for {heartbeat_timeout:?}, disconnecting");
                        break;
                    }
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = ws_tx.close().await;
    });

    loop {
        let msg = tokio::select! {
            () = shutdown.cancelled() => {
                debug!("server shutting down, closing session");
                break;
            }
            _ = &mut outbound => {
                debug!("writer finished, closing session");
                break;
            }
            msg = ws_rx.next() => msg,
        };
        let Some(Ok(msg)) = msg else { break };

        let text = match msg {
            Message::Text(ref t) => Some(t.to_string()),
            Message::Binary(ref data) => {
                if let Ok(s) = std::str::from_utf8(data) {
                    Some(s.to_string())
                } else {
                    debug!(len = data.len(), "ignoring non-UTF8 binary frame");
                    None
                }
            }
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                connection.mark_alive();
                None
            }
        };
        let Some(text) = text else { continue };
        connection.mark_alive();

        if handle_message(&text, &connection, &registry).await == Flow::Close {
            info!("client requested disconnect");
            break;
        }
    }

    let _ = registry.on_disconnect(&client_id);
    info!(
        dropped = connection.drop_count(),
        age_secs = connection.age().as_secs(),
        "client disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
    outbound.abort();
}
