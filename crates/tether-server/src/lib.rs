//! # tether-server
//!
//! Shares one upstream session per key across any number of `WebSocket`
//! clients.
//!
//! - [`registry`]: key → session group routing, reclamation, shutdown
//! - [`group`]: one upstream session, its attached clients and their forwarders
//! - [`forwarder`]: revocable per-client event bindings
//! - [`access`]: allow-list gate checked before every subscription
//! - [`server`] / [`websocket`]: Axum HTTP + `WebSocket` transport

#![deny(unsafe_code)]

pub mod access;
pub mod config;
pub mod errors;
pub mod forwarder;
pub mod group;
pub mod health;
pub mod metrics;
pub mod reclaim;
pub mod registry;
pub mod server;
pub mod shutdown;
pub mod websocket;

#[cfg(test)]
mod test_support;
