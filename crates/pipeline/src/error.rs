use atelier_core::error::CoreError;

/// A single provider call failed. Never aborts sibling variations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderCallError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("Provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider returned a non-2xx status code.
    #[error("Provider API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The provider answered 2xx with a body we could not use.
    #[error("Unexpected provider response: {0}")]
    InvalidResponse(String),
}

/// A reference image could not be resolved or prepared.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("Invalid asset reference '{0}'")]
    InvalidReference(String),

    #[error("Asset '{0}' not found")]
    NotFound(String),

    #[error("Asset fetch failed: {0}")]
    Fetch(String),

    #[error("Could not transcode asset: {0}")]
    Transcode(String),
}

/// Failures of a job as a whole.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Bad job input, detected before any I/O.
    #[error(transparent)]
    Validation(#[from] CoreError),

    /// Every variation produced zero outputs.
    #[error("All {variations} variations failed: {reason}")]
    AggregateFailure { variations: u8, reason: String },

    /// A reference image failed to load, so generation never started.
    #[error("Failed to load reference {index}: {source}")]
    Reference { index: usize, source: AssetError },

    /// A lifecycle invariant was broken; indicates a bug.
    #[error("Internal error: {0}")]
    Internal(String),
}
