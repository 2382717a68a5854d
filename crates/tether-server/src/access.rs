//! Access gate: decides whether a key may be subscribed to.
//!
//! When enabled with an allow-list path, the file is re-read on every check
//! so edits take effect without a restart. Any read or parse failure denies.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tether_core::Key;
use tether_settings::AccessSettings;
use thiserror::Error;
use tracing::warn;

/// Why the allow-list could not be consulted.
#[derive(Debug, Error)]
pub enum AccessError {
    /// File missing or unreadable.
    #[error("cannot read allow-list: {0}")]
    Io(#[from] std::io::Error),
    /// File is not valid JSON.
    #[error("cannot parse allow-list: {0}")]
    Parse(#[from] serde_json::Error),
    /// JSON parsed but is not an object.
    #[error("allow-list must be a JSON object")]
    NotAnObject,
}

/// Allow-list predicate over keys.
#[derive(Clone, Debug, Default)]
pub struct AccessGate {
    enabled: bool,
    allow_list: Option<PathBuf>,
}

impl AccessGate {
    /// Build a gate.
    pub fn new(enabled: bool, allow_list: Option<PathBuf>) -> Self {
        Self {
            enabled,
            allow_list,
        }
    }

    /// A gate that allows everything.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Build from the `access` settings section.
    pub fn from_settings(settings: &AccessSettings) -> Self {
        Self::new(settings.enabled, settings.allow_list_path.clone())
    }

    /// Whether checks are enforced.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Configured allow-list path, if any.
    pub fn allow_list(&self) -> Option<&Path> {
        self.allow_list.as_deref()
    }

    /// Whether `key` may be subscribed to. Errors deny.
    pub async fn is_allowed(&self, key: &Key) -> bool {
        match self.check(key).await {
            Ok(allowed) => allowed,
            Err(error) => {
                warn!(%key, path = ?self.allow_list, %error, "allow-list unavailable, denying");
                false
            }
        }
    }

    /// Consult the allow-list, surfacing read and parse failures.
    pub async fn check(&self, key: &Key) -> Result<bool, AccessError> {
        if !self.enabled {
            return Ok(true);
        }
        let Some(path) = &self.allow_list else {
            return Ok(true);
        };

        let content = tokio::fs::read_to_string(path).await?;
        let list: Value = serde_json::from_str(&content)?;
        let table = entries(&list).ok_or(AccessError::NotAnObject)?;
        Ok(table.get(key.as_str()).is_some_and(is_truthy))
    }
}

/// The `users` object if present, otherwise the top-level object.
fn entries(list: &Value) -> Option<&Map<String, Value>> {
    match list.get("users") {
        Some(Value::Object(users)) => Some(users),
        _ => list.as_object(),
    }
}

/// `false`, `null`, `0` and `""` are falsy; everything else is truthy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
