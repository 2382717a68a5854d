//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may be partial; missing fields keep their default value.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9000 },
///   "access": { "enabled": true, "allowListPath": "/etc/tether/users.json" },
///   "groups": { "reclaimIntervalMs": 30000 }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TetherSettings {
    /// Network and WebSocket settings.
    pub server: ServerSettings,
    /// Access control for subscription keys.
    pub access: AccessSettings,
    /// Session group lifecycle.
    pub groups: GroupSettings,
    /// Simulated upstream driver.
    pub upstream: UpstreamSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl TetherSettings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.groups.reclaim_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "groups.reclaimIntervalMs must be greater than zero".into(),
            ));
        }
        if self.server.max_send_queue == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxSendQueue must be greater than zero".into(),
            ));
        }
        if self.server.heartbeat_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatIntervalSecs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Server network and runtime settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port (`0` picks a free port).
    pub port: u16,
    /// Outbound queue depth per client before frames are dropped.
    pub max_send_queue: usize,
    /// Interval between server Ping frames.
    pub heartbeat_interval_secs: u64,
    /// Disconnect a client that has not answered a ping for this long.
    pub heartbeat_timeout_secs: u64,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_send_queue: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 1024 * 1024,
        }
    }
}

/// Access control settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessSettings {
    /// Whether subscription keys are checked at all.
    pub enabled: bool,
    /// JSON allow-list file, re-read on every check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_list_path: Option<PathBuf>,
}

/// Session group lifecycle settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GroupSettings {
    /// How often empty groups are stopped and discarded.
    pub reclaim_interval_ms: u64,
}

impl GroupSettings {
    /// Reclaim interval as a [`Duration`].
    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_millis(self.reclaim_interval_ms)
    }
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self {
            reclaim_interval_ms: 30_000,
        }
    }
}

/// Settings for the simulated upstream driver used when no browser is wired in.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpstreamSettings {
    /// Delay between `start` and the first readiness event.
    pub ready_delay_ms: u64,
    /// Interval between synthetic domain events once ready.
    pub event_interval_ms: u64,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            ready_delay_ms: 1_500,
            event_interval_ms: 5_000,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
