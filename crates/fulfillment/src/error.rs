//! Error types for the fulfillment crate.
//!
//! Pipeline operations return [`scene_common::SceneError`]; only configuration
//! loading has its own error type.

use std::path::PathBuf;

use scene_common::{SceneError, TransportError};
use storage::StorageError;
use thiserror::Error;

/// Errors loading or validating a [`crate::PipelineConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Failed to read config file {}: {message}", path.display())]
    Read { path: PathBuf, message: String },

    #[error("Failed to parse config {origin}: {message}")]
    Parse { origin: String, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration loading.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

pub(crate) fn ledger_error(err: StorageError) -> SceneError {
    SceneError::Ledger(err.to_string())
}

pub(crate) fn storage_error(err: StorageError) -> SceneError {
    SceneError::Storage(err.to_string())
}

/// Classify a reqwest failure for `url`.
pub(crate) fn transport_error(url: &str, err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout {
            url: url.to_string(),
        }
    } else if let Some(status) = err.status() {
        TransportError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        }
    } else if err.is_body() || err.is_decode() {
        TransportError::Body {
            url: url.to_string(),
            message: err.to_string(),
        }
    } else {
        TransportError::Request {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}
