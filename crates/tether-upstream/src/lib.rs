//! # tether-upstream
//!
//! The upstream session collaborator: the interface a session group drives,
//! plus two drivers that need no external browser.
//!
//! - [`UpstreamSession`] / [`SessionFactory`]: the trait seam
//! - [`scripted`]: in-memory driver controlled by tests
//! - [`simulated`]: timer-driven driver for local runs

#![deny(unsafe_code)]

pub mod errors;
pub mod scripted;
pub mod session;
pub mod simulated;

pub use errors::UpstreamError;
pub use session::{READY_EVENT, SessionFactory, UpstreamEvent, UpstreamSession};
