//! WebSocket endpoint for the bridge peer.

pub mod bridge_socket;

pub use bridge_socket::bridge_ws_handler;
