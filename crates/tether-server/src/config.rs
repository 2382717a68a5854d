//! Server runtime configuration, derived from settings.

use std::time::Duration;

use tether_settings::TetherSettings;

/// Configuration for the transport and reclamation loop.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Per-client outbound queue depth.
    pub max_send_queue: usize,
    /// Interval between server Ping frames.
    pub heartbeat_interval: Duration,
    /// Disconnect clients silent for longer than this.
    pub heartbeat_timeout: Duration,
    /// Max inbound message size in bytes.
    pub max_message_size: usize,
    /// How often empty groups are reclaimed.
    pub reclaim_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_send_queue: 256,
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(90),
            max_message_size: 1024 * 1024,
            reclaim_interval: Duration::from_millis(30_000),
        }
    }
}

impl From<&TetherSettings> for ServerConfig {
    fn from(settings: &TetherSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_send_queue: settings.server.max_send_queue,
            heartbeat_interval: Duration::from_secs(settings.server.heartbeat_interval_secs),
            heartbeat_timeout: Duration::from_secs(settings.server.heartbeat_timeout_secs),
            max_message_size: settings.server.max_message_size,
            reclaim_interval: settings.groups.reclaim_interval(),
        }
    }
}

impl ServerConfig {
    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
