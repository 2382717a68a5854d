//! # tether-core
//!
//! Shared vocabulary for the Tether crates:
//!
//! - **Identifiers**: [`ClientId`] for WebSocket connections, [`Key`] for the
//!   upstream target a session group is bound to
//! - **Wire frames**: the `{"event", "data"}` envelope exchanged with clients,
//!   parsed inbound requests, and the fixed outbound event names

#![deny(unsafe_code)]

pub mod ids;
pub mod wire;

pub use ids::{ClientId, Key};
pub use wire::{ClientRequest, Frame, WireError};
