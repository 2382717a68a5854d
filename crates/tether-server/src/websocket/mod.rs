//! `WebSocket` transport: per-client connection state, session loop and
//! inbound frame handling.

pub mod connection;
pub mod handler;
pub mod session;
