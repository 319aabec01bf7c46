use tokio_tungstenite::tungstenite;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("Failed to read catalog {path}: {source}")]
    CatalogRead {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid catalog {path}: {source}")]
    CatalogParse {
        path: String,
        source: serde_json::Error,
    },
}
