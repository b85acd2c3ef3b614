//! Error types for the record store.

use thiserror::Error;

/// Result type alias for record store operations.
pub type RecordResult<T> = Result<T, RecordError>;

/// Errors that can occur during record store operations.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("failed to open record store: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("no record at key: {0}")]
    NotFound(String),

    #[error("record already exists at key: {0}")]
    AlreadyExists(String),

    #[error("version conflict at key {key}: expected {expected}, found {actual}")]
    VersionConflict { key: String, expected: u64, actual: u64 },

    #[error("corrupt record envelope at key: {0}")]
    Corrupt(String),
}
