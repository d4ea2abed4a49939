//! Error types for the pagewatch service

/// Errors that can occur in the pagewatch service
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Snapshot store error: {0}")]
    Snapshot(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Notification error: {0}")]
    Notify(String),
}

/// Result type alias for pagewatch operations
pub type Result<T> = std::result::Result<T, WatchError>;
