//! Server errors.

use thiserror::Error;

/// Errors that prevent the server from running.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Could not bind or inspect the listening socket.
    #[error("failed to bind listener: {0}")]
    Bind(#[from] std::io::Error),
    /// The global metrics recorder could not be installed.
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
}
