//! Bridge peer.
//!
//! Connects to the server's bridge WebSocket, announces itself, keeps the
//! connection alive with heartbeats and answers typed requests from a
//! local catalog.

pub mod catalog;
pub mod config;
pub mod error;
pub mod handlers;
pub mod reconnect;
pub mod session;
