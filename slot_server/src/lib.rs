//! HTTP/WebSocket server for the slot arcade core.
//!
//! Wires `slot_core` services into an axum router and exposes them over
//! REST and a realtime socket.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
