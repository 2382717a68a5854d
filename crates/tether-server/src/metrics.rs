//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::errors::ServerError;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Call once at startup,
/// before any metric is recorded.
pub fn install_recorder() -> Result<PrometheusHandle, ServerError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ServerError::Metrics(e.to_string()))?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// `WebSocket` connections opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// `WebSocket` connections closed (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Open `WebSocket` connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Session groups created (counter).
pub const GROUPS_CREATED_TOTAL: &str = "groups_created_total";
/// Empty session groups stopped by reclamation (counter).
pub const GROUPS_RECLAIMED_TOTAL: &str = "groups_reclaimed_total";
/// Live session groups (gauge).
pub const GROUPS_ACTIVE: &str = "groups_active";
/// Subscriptions refused by the access gate (counter).
pub const ACCESS_DENIED_TOTAL: &str = "access_denied_total";
/// Frames dropped because a client queue was full or closed (counter).
pub const CLIENT_SEND_DROPS_TOTAL: &str = "client_send_drops_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_from_local_recorder() {
        // Local recorder; the global one can only be installed once per process.
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!(GROUPS_CREATED_TOTAL).increment(2);
        });
        let output = render(&handle);
        assert!(output.contains("groups_created_total 2"));
    }

    #[test]
    fn metric_names_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_CONNECTION_DURATION_SECONDS,
            GROUPS_CREATED_TOTAL,
            GROUPS_RECLAIMED_TOTAL,
            GROUPS_ACTIVE,
            ACCESS_DENIED_TOTAL,
            CLIENT_SEND_DROPS_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "{name} is not snake_case"
            );
        }
    }
}
