//! Error types shared by queue storage implementations.

use thiserror::Error;

/// Result type alias for queue storage operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors surfaced by queue stores.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Underlying storage failure (connection, statement, lock)
    #[error("Storage error: {0}")]
    Storage(String),

    /// A persisted value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl QueueError {
    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
