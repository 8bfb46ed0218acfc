//! Storage error types and their mapping onto the core error taxonomy.

use tallybook_core::errors::{DatabaseError, Error};
use thiserror::Error;

/// Errors raised inside the SQLite storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A diesel query failed
    #[error("Query failed: {0}")]
    Query(#[from] diesel::result::Error),

    /// Could not get a connection from the pool
    #[error("Connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    /// Could not establish or configure a connection
    #[error("Connection error: {0}")]
    Connection(String),

    /// Migration failure during startup
    #[error("Migration error: {0}")]
    Migration(String),

    /// A domain-level error surfaced inside a storage transaction
    #[error(transparent)]
    Domain(Error),
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Query(e) => Error::Database(DatabaseError::QueryFailed(e.to_string())),
            StorageError::Pool(e) => {
                Error::Database(DatabaseError::ConnectionUnavailable(e.to_string()))
            }
            StorageError::Connection(msg) => {
                Error::Database(DatabaseError::ConnectionUnavailable(msg))
            }
            StorageError::Migration(msg) => Error::Database(DatabaseError::Internal(msg)),
            StorageError::Domain(e) => e,
        }
    }
}
