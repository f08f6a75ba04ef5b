//! Error types for the spectral store

use thiserror::Error;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the store
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filter rejected before any query ran
    #[error("Invalid filter: {0}")]
    Validation(String),

    /// A reading with the same (external id, format) already exists
    #[error("Duplicate reading: {external_id} ({format})")]
    Duplicate { external_id: String, format: String },

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// `next()` called on a cursor with no pending reading
    #[error("End of sequence")]
    EndOfSequence,

    /// Stored data does not have the expected shape
    #[error("Data error: {0}")]
    Data(String),
}

impl Error {
    /// True when the underlying database error is a UNIQUE constraint violation
    pub fn is_unique_violation(err: &sqlx::Error) -> bool {
        match err {
            sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
            _ => false,
        }
    }
}
