//! Pending-request registry with deadline reaping.
//!
//! [`RequestRegistry`] is the only place outstanding bridge calls live.
//! It owns both insertion and expiry: [`register`](RequestRegistry::register)
//! inserts the entry and spawns its deadline timer, and every way out of
//! the map ([`resolve`](RequestRegistry::resolve), the timer's expiry,
//! [`withdraw`](RequestRegistry::withdraw)) removes the entry under the
//! same lock, so exactly one of them completes a given request.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::error::BridgeError;

/// Result delivered to the waiter of a pending request.
pub type Outcome = Result<Value, BridgeError>;

/// Default deadline for a bridge call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

struct PendingRequest {
    kind: String,
    deadline: Instant,
    completion: oneshot::Sender<Outcome>,
    timer: AbortHandle,
}

/// Maps correlation ids to their deadline and completion handle.
pub struct RequestRegistry {
    pending: Mutex<HashMap<String, PendingRequest>>,
    timeout: Duration,
}

impl RequestRegistry {
    /// Create a registry whose entries expire after `timeout`.
    ///
    /// Returned inside an `Arc` because deadline timers hold a weak
    /// reference back to the registry.
    pub fn new(timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            pending: Mutex::new(HashMap::new()),
            timeout,
        })
    }

    /// Register a pending request and return the receiver for its outcome.
    ///
    /// Must be called from within a Tokio runtime (the deadline timer is a
    /// spawned task). Fails with [`BridgeError::DuplicateId`] if `id` is
    /// already pending.
    pub fn register(
        self: &Arc<Self>,
        id: &str,
        kind: &str,
    ) -> Result<oneshot::Receiver<Outcome>, BridgeError> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if pending.contains_key(id) {
            return Err(BridgeError::DuplicateId(id.to_string()));
        }

        let (tx, rx) = oneshot::channel();
        let deadline = Instant::now() + self.timeout;
        let timer = spawn_deadline(Arc::downgrade(self), id.to_string(), deadline);

        pending.insert(
            id.to_string(),
            PendingRequest {
                kind: kind.to_string(),
                deadline,
                completion: tx,
                timer,
            },
        );

        tracing::debug!(id, kind, pending = pending.len(), "Registered bridge request");
        Ok(rx)
    }

    /// Complete a pending request with `outcome` and cancel its timer.
    ///
    /// Returns `false` if `id` is not pending (already resolved, expired,
    /// or never registered); the outcome is discarded.
    pub fn resolve(&self, id: &str, outcome: Outcome) -> bool {
        let entry = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);

        match entry {
            Some(request) => {
                request.timer.abort();
                tracing::debug!(
                    id,
                    kind = %request.kind,
                    remaining_ms = request.deadline.saturating_duration_since(Instant::now()).as_millis() as u64,
                    ok = outcome.is_ok(),
                    "Resolved bridge request",
                );
                // The waiter may have given up; that is not an error here.
                let _ = request.completion.send(outcome);
                true
            }
            None => {
                tracing::debug!(id, "Response for unknown or expired bridge request");
                false
            }
        }
    }

    /// Remove a pending request without completing it.
    pub fn withdraw(&self, id: &str) -> bool {
        let entry = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);

        match entry {
            Some(request) => {
                request.timer.abort();
                true
            }
            None => false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(id)
    }

    /// Deadline expiry, called only by the timer spawned in `register`.
    fn expire(&self, id: &str) {
        let entry = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);

        if let Some(request) = entry {
            tracing::warn!(
                id,
                kind = %request.kind,
                timeout_secs = self.timeout.as_secs(),
                "Bridge request timed out",
            );
            let _ = request.completion.send(Err(BridgeError::RequestTimeout {
                id: id.to_string(),
                timeout: self.timeout,
            }));
        }
    }
}

fn spawn_deadline(registry: Weak<RequestRegistry>, id: String, deadline: Instant) -> AbortHandle {
    tokio::spawn(async move {
        tokio::time::sleep_until(deadline).await;
        if let Some(registry) = registry.upgrade() {
            registry.expire(&id);
        }
    })
    .abort_handle()
}
