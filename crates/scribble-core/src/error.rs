//! Error types for scribble-core

use thiserror::Error;

/// Result type alias using scribble-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in scribble-core operations
///
/// Remote failures are not part of this enum: the sync engine folds them into
/// pass summaries, and the workspace turns them into queued changes. What
/// remains here is local and fatal to the operation that hit it.
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Entity not found in local state
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The remote client could not be constructed
    #[error("Remote client error: {0}")]
    Remote(#[from] crate::remote::RemoteError),
}
