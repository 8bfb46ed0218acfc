//! Error types shared across the tallybook crates.

use thiserror::Error;

/// Result type alias used throughout the core and storage crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Database-layer error detail.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// A query failed to execute.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A pooled connection could not be obtained.
    #[error("Connection unavailable: {0}")]
    ConnectionUnavailable(String),

    /// Anything else the storage layer cannot express more precisely.
    #[error("Database error: {0}")]
    Internal(String),
}

/// Top-level error for core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}
