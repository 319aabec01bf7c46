//! Bridge wire frames and parsers.
//!
//! All frames are JSON text over the WebSocket:
//!
//! - request (server -> peer): `{"id", "type", "params"?}`
//! - response (peer -> server): `{"id", "success", "data"?, "error"?}`
//! - control (either way): `{"type": "handshake", "client"}`,
//!   `{"type": "handshake-ack"}`, `{"type": "ping"}`, `{"type": "pong"}`

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request type answered by the peer with `{pong, timestamp}`.
pub const REQ_PING: &str = "ping";
/// Request type for catalog search.
pub const REQ_SEARCH: &str = "search";
/// Request type for single-item lookup.
pub const REQ_GET_ITEM: &str = "get-item";

/// Connection-level control frames, tagged by `"type"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlFrame {
    /// Sent by the peer right after connecting.
    Handshake { client: String },
    /// Server acknowledgement of a handshake.
    HandshakeAck,
    /// Liveness probe.
    Ping,
    /// Reply to a liveness probe.
    Pong,
}

/// A typed call sent to the peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    /// Correlation id echoed back in the response.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// The peer's answer to a [`RequestFrame`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseFrame {
    pub fn ok(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Any frame the server accepts from the peer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ServerInbound {
    Response(ResponseFrame),
    Control(ControlFrame),
}

/// Any frame the peer accepts from the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PeerInbound {
    Request(RequestFrame),
    Control(ControlFrame),
}

/// Parse a text frame received by the server.
///
/// Returns `Err` for malformed JSON or unrecognised shapes. Callers should
/// log and continue.
pub fn parse_server_inbound(text: &str) -> Result<ServerInbound, serde_json::Error> {
    serde_json::from_str(text)
}

/// Parse a text frame received by the peer.
pub fn parse_peer_inbound(text: &str) -> Result<PeerInbound, serde_json::Error> {
    serde_json::from_str(text)
}

/// Serialize a frame to its JSON text form.
pub fn encode<T: Serialize>(frame: &T) -> String {
    serde_json::to_string(frame).expect("bridge frames are always serialisable")
}
