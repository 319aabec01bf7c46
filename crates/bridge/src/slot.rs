//! Process-wide holder of the single active bridge connection.
//!
//! The socket task owning a WebSocket creates a [`ConnectionHandle`] for
//! it; the handle is installed with [`ConnectionSlot::accept`] once the
//! peer has handshaken. Accepting a new handle replaces the previous one
//! and tells the replaced socket to close.

use std::sync::RwLock;

use atelier_core::types::Timestamp;
use serde::Serialize;
use tokio::sync::mpsc;

/// Item pushed to the socket task serving a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A JSON text frame to write.
    Text(String),
    /// Close the socket; the connection has been replaced.
    Close,
}

/// Channel sender half for pushing frames to a connection's socket task.
pub type FrameSender = mpsc::UnboundedSender<Outbound>;

/// One bridge connection as seen by the server.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    conn_id: String,
    peer: Option<String>,
    connected_at: Timestamp,
    sender: FrameSender,
}

impl ConnectionHandle {
    pub fn new(conn_id: impl Into<String>, sender: FrameSender) -> Self {
        Self {
            conn_id: conn_id.into(),
            peer: None,
            connected_at: chrono::Utc::now(),
            sender,
        }
    }

    /// Copy of this handle labelled with the peer name from the handshake.
    pub fn with_peer(&self, peer: impl Into<String>) -> Self {
        Self {
            peer: Some(peer.into()),
            ..self.clone()
        }
    }

    pub fn conn_id(&self) -> &str {
        &self.conn_id
    }

    pub fn peer(&self) -> Option<&str> {
        self.peer.as_deref()
    }

    /// Queue a text frame. Returns `false` if the socket task is gone.
    pub fn send_text(&self, text: String) -> bool {
        self.sender.send(Outbound::Text(text)).is_ok()
    }

    fn close(&self) {
        let _ = self.sender.send(Outbound::Close);
    }
}

/// Snapshot of the slot for status reporting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotStatus {
    pub connected: bool,
    pub peer: Option<String>,
    pub connected_at: Option<Timestamp>,
}

/// Holds zero or one live bridge connection.
///
/// Thread-safe via an interior `RwLock` that is never held across an
/// `.await`.
#[derive(Debug, Default)]
pub struct ConnectionSlot {
    active: RwLock<Option<ConnectionHandle>>,
}

impl ConnectionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handle` as the active connection.
    ///
    /// Any previously active connection is replaced (last write wins) and
    /// sent [`Outbound::Close`] so its socket shuts down. The replaced
    /// handle is returned for logging.
    pub fn accept(&self, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let mut active = self.active.write().unwrap_or_else(|e| e.into_inner());
        let previous = active.replace(handle);

        match &previous {
            Some(old) if Some(old.conn_id()) != active.as_ref().map(|h| h.conn_id()) => {
                tracing::info!(
                    old_conn_id = %old.conn_id(),
                    old_peer = old.peer().unwrap_or("-"),
                    "Replacing active bridge connection",
                );
                old.close();
            }
            _ => {}
        }

        previous
    }

    /// Clear the slot if `conn_id` is the active connection.
    ///
    /// Returns `false` when another connection is active (the closing one
    /// was already replaced) or the slot is empty.
    pub fn clear(&self, conn_id: &str) -> bool {
        let mut active = self.active.write().unwrap_or_else(|e| e.into_inner());
        if active.as_ref().is_some_and(|h| h.conn_id() == conn_id) {
            *active = None;
            true
        } else {
            false
        }
    }

    pub fn is_connected(&self) -> bool {
        self.active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Clone of the active handle, if any.
    pub fn current(&self) -> Option<ConnectionHandle> {
        self.active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn status(&self) -> SlotStatus {
        let active = self.active.read().unwrap_or_else(|e| e.into_inner());
        SlotStatus {
            connected: active.is_some(),
            peer: active.as_ref().and_then(|h| h.peer.clone()),
            connected_at: active.as_ref().map(|h| h.connected_at),
        }
    }
}
