use std::time::Duration;

/// Errors surfaced to callers of the bridge.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BridgeError {
    /// No bridge peer is connected. Nothing was registered or sent.
    #[error("No bridge peer connected")]
    ConnectionAbsent,

    /// The deadline elapsed before a correlated response arrived.
    #[error("Bridge request {id} timed out after {}s", timeout.as_secs())]
    RequestTimeout { id: String, timeout: Duration },

    /// The peer answered with `success: false`.
    #[error("Bridge peer reported an error: {0}")]
    RemoteError(String),

    /// A correlation id was registered while an entry with that id was
    /// still pending.
    #[error("Correlation id {0} is already pending")]
    DuplicateId(String),

    /// The completion handle was dropped without an outcome.
    #[error("Bridge request was dropped before completion")]
    Dropped,
}
