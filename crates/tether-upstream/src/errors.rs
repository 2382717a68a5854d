//! Upstream driver errors.

use thiserror::Error;

/// Failures reported by an upstream session driver.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The session could not be started.
    #[error("upstream start failed: {0}")]
    Start(String),
    /// The session could not be pointed at its key.
    #[error("upstream target failed: {0}")]
    Target(String),
    /// The driver was already stopped.
    #[error("upstream session stopped")]
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            UpstreamError::Start("no browser".into()).to_string(),
            "upstream start failed: no browser"
        );
        assert_eq!(UpstreamError::Stopped.to_string(), "upstream session stopped");
    }
}
