//! Correlated request/response bridge over a single duplex connection.
//!
//! The server side holds at most one connected bridge peer in a
//! [`ConnectionSlot`](slot::ConnectionSlot). Typed calls are sent through
//! the [`BridgeEndpoint`](endpoint::BridgeEndpoint), which registers each
//! one in the [`RequestRegistry`](registry::RequestRegistry) and resolves
//! it when the peer's correlated response arrives or its deadline fires.
//!
//! [`messages`] defines the JSON wire frames shared with the peer.

pub mod endpoint;
pub mod error;
pub mod messages;
pub mod registry;
pub mod slot;

pub use endpoint::{BridgeEndpoint, PendingReply};
pub use error::BridgeError;
pub use slot::{ConnectionHandle, ConnectionSlot, Outbound};
