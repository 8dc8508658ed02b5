//! Common error types for the graph workspace

use thiserror::Error;

/// Common result type for graph operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the graph crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Query could not be evaluated as written
    ///
    /// The message never contains the query itself.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Caller is not authorized for the requested operation
    #[error("Insufficient privilege: {0}")]
    InsufficientPrivilege(String),

    /// Scheduled operation exceeded its time budget and was cancelled
    #[error("Timeout: {operation} did not finish within {after_ms} ms")]
    Timeout {
        operation: String,
        after_ms: u64,
    },

    /// Operation conflicts with work already in progress
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Store and transaction model disagree
    #[error("Invariant violated: {0}")]
    Invariant(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for errors caused by the caller's input or credentials
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidInput(_) | Error::InvalidQuery(_) | Error::InsufficientPrivilege(_)
        )
    }

    /// True when the error is a scheduled-operation timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}
