//! Error types for the storage crate.

use thiserror::Error;

/// Errors from object storage and the run ledger.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to create storage client: {0}")]
    Client(String),

    #[error("failed to write {key}: {message}")]
    Write { key: String, message: String },

    #[error("failed to grant public read on {key}: {message}")]
    Acl { key: String, message: String },

    #[error("failed to read {key}: {message}")]
    Read { key: String, message: String },

    #[error("list failed: {0}")]
    List(String),

    #[error("invalid public URL base '{base}': {message}")]
    InvalidUrl { base: String, message: String },

    #[error("ledger error: {0}")]
    Ledger(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
