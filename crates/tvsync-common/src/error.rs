//! Error types shared across tvsync crates

use thiserror::Error;

/// Result type alias for tvsync operations
pub type Result<T> = std::result::Result<T, TvsyncError>;

/// Main error type for tvsync
#[derive(Error, Debug)]
pub enum TvsyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

impl TvsyncError {
    /// Create an invalid record error
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord(message.into())
    }
}
