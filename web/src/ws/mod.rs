//! WebSocket transport for the chat relay.
//!
//! This module contains only the Axum upgrade handler and the per-socket
//! reader/writer tasks. The registry, fan-out and protocol live in the
//! `relay` crate; this layer turns socket activity into `ConnectionEvent`s
//! and drains each connection's outbound queue into its socket.

pub mod handler;
