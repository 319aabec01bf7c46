//! Server side of the bridge: typed calls out, frame dispatch in.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::BridgeError;
use crate::messages::{
    encode, parse_server_inbound, ControlFrame, RequestFrame, ResponseFrame, ServerInbound,
};
use crate::registry::{Outcome, RequestRegistry};
use crate::slot::{ConnectionHandle, ConnectionSlot};

/// Sends typed requests to the connected peer and dispatches the frames
/// it sends back.
///
/// Created once at startup and shared via `Arc`.
pub struct BridgeEndpoint {
    slot: ConnectionSlot,
    registry: Arc<RequestRegistry>,
    next_seq: AtomicU64,
}

impl BridgeEndpoint {
    /// Create an endpoint whose calls time out after `request_timeout`.
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            slot: ConnectionSlot::new(),
            registry: RequestRegistry::new(request_timeout),
            next_seq: AtomicU64::new(1),
        }
    }

    pub fn slot(&self) -> &ConnectionSlot {
        &self.slot
    }

    pub fn registry(&self) -> &RequestRegistry {
        &self.registry
    }

    /// Send a typed request to the peer.
    ///
    /// Fails immediately with [`BridgeError::ConnectionAbsent`] when no
    /// peer is connected; nothing is registered in that case. Otherwise
    /// returns a [`PendingReply`] resolving to the peer's `data`.
    pub fn send(&self, kind: &str, params: Option<Value>) -> Result<PendingReply, BridgeError> {
        let conn = self.slot.current().ok_or(BridgeError::ConnectionAbsent)?;

        let id = self.next_correlation_id();
        let rx = self.registry.register(&id, kind)?;

        let frame = RequestFrame {
            id: id.clone(),
            kind: kind.to_string(),
            params,
        };
        if !conn.send_text(encode(&frame)) {
            self.registry.withdraw(&id);
            tracing::warn!(
                id = %id,
                conn_id = %conn.conn_id(),
                "Bridge socket closed before request could be written",
            );
            return Err(BridgeError::ConnectionAbsent);
        }

        tracing::debug!(id = %id, kind, conn_id = %conn.conn_id(), "Bridge request sent");
        Ok(PendingReply { id, rx })
    }

    /// Convenience wrapper: [`send`](Self::send) and await the reply.
    pub async fn call(&self, kind: &str, params: Option<Value>) -> Result<Value, BridgeError> {
        self.send(kind, params)?.await
    }

    /// Dispatch one inbound text frame received on `conn`.
    ///
    /// Replies (handshake ack, pong) are written back on `conn` itself,
    /// whether or not it is the active connection.
    pub fn handle_frame(&self, conn: &ConnectionHandle, text: &str) {
        match parse_server_inbound(text) {
            Ok(ServerInbound::Control(ControlFrame::Handshake { client })) => {
                tracing::info!(conn_id = %conn.conn_id(), peer = %client, "Bridge peer handshake");
                self.slot.accept(conn.with_peer(client));
                conn.send_text(encode(&ControlFrame::HandshakeAck));
            }
            Ok(ServerInbound::Control(ControlFrame::Ping)) => {
                tracing::trace!(conn_id = %conn.conn_id(), "Bridge ping");
                conn.send_text(encode(&ControlFrame::Pong));
            }
            Ok(ServerInbound::Control(ControlFrame::Pong | ControlFrame::HandshakeAck)) => {
                tracing::trace!(conn_id = %conn.conn_id(), "Ignoring control frame");
            }
            Ok(ServerInbound::Response(frame)) => {
                self.handle_response(frame);
            }
            Err(e) => {
                tracing::warn!(
                    conn_id = %conn.conn_id(),
                    error = %e,
                    raw_message = %text,
                    "Failed to parse bridge frame",
                );
            }
        }
    }

    /// Forget `conn` if it is still the active connection.
    ///
    /// Pending requests are left to their deadlines.
    pub fn disconnect(&self, conn_id: &str) {
        if self.slot.clear(conn_id) {
            tracing::info!(
                conn_id,
                pending = self.registry.pending_count(),
                "Bridge peer disconnected",
            );
        }
    }

    fn handle_response(&self, frame: ResponseFrame) {
        let outcome: Outcome = if frame.success {
            Ok(frame.data.unwrap_or(Value::Null))
        } else {
            Err(BridgeError::RemoteError(
                frame
                    .error
                    .unwrap_or_else(|| "Unknown remote error".to_string()),
            ))
        };
        self.registry.resolve(&frame.id, outcome);
    }

    /// Monotonic counter plus wall-clock millis; unique among pending ids.
    fn next_correlation_id(&self) -> String {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        format!("req-{seq}-{}", chrono::Utc::now().timestamp_millis())
    }
}

/// Future for the outcome of one bridge request.
#[derive(Debug)]
pub struct PendingReply {
    id: String,
    rx: oneshot::Receiver<Outcome>,
}

impl PendingReply {
    /// Correlation id of the request.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Future for PendingReply {
    type Output = Result<Value, BridgeError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(BridgeError::Dropped)))
    }
}
