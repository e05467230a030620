//! Error types for scene summary services.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using SceneError.
pub type SceneResult<T> = Result<T, SceneError>;

/// Network failure talking to the order API, an artifact host or object storage.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("failed reading response body from {url}: {message}")]
    Body { url: String, message: String },

    #[error("malformed response from {url}: {message}")]
    Malformed { url: String, message: String },
}

impl TransportError {
    /// URL of the request that failed.
    pub fn url(&self) -> &str {
        match self {
            TransportError::Timeout { url }
            | TransportError::Request { url, .. }
            | TransportError::Status { url, .. }
            | TransportError::Body { url, .. }
            | TransportError::Malformed { url, .. } => url,
        }
    }

    /// Whether a retry of the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Timeout { .. }
            | TransportError::Request { .. }
            | TransportError::Body { .. } => true,
            TransportError::Status { status, .. } => *status == 429 || *status >= 500,
            TransportError::Malformed { .. } => false,
        }
    }
}

/// Failure materializing a single result artifact.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("artifact name '{name}' does not resolve inside the destination directory")]
    InvalidName { name: String },

    #[error("download of '{name}' failed: {source}")]
    Transport {
        name: String,
        #[source]
        source: TransportError,
    },

    #[error("writing '{name}' to {} failed: {source}", path.display())]
    Io {
        name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("download of '{name}' truncated: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        name: String,
        expected: u64,
        actual: u64,
    },
}

impl FetchError {
    /// Logical name of the artifact that failed.
    pub fn name(&self) -> &str {
        match self {
            FetchError::InvalidName { name }
            | FetchError::Transport { name, .. }
            | FetchError::Io { name, .. }
            | FetchError::SizeMismatch { name, .. } => name,
        }
    }
}

/// Raster could not be read as four spectral bands.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("cannot open raster {}: {message}", path.display())]
    Open { path: PathBuf, message: String },

    #[error("cannot decode raster {}: {message}", path.display())]
    Malformed { path: PathBuf, message: String },

    #[error("raster {} has {found} band(s), need at least 4", path.display())]
    TooFewBands { path: PathBuf, found: usize },

    #[error("raster {} uses an unsupported sample layout: {message}", path.display())]
    Unsupported { path: PathBuf, message: String },
}

/// Upload or access-grant failure in object storage.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("cannot read {} for upload: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("upload to '{key}' failed: {message}")]
    Upload { key: String, message: String },

    #[error("granting public read on '{key}' failed: {message}")]
    Acl { key: String, message: String },
}

/// Primary error type for a pipeline invocation.
#[derive(Debug, Error)]
pub enum SceneError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("summary table {}: {message}", path.display())]
    Table { path: PathBuf, message: String },

    #[error("run ledger error: {0}")]
    Ledger(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid task input: {0}")]
    InvalidInput(String),

    #[error("none of the {requested} result artifact(s) could be fetched")]
    NothingFetched { requested: usize },

    #[error("none of the {attempted} raster(s) could be decoded")]
    NoDecodableRasters { attempted: usize },

    #[error("computation failed: {0}")]
    Compute(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SceneError {
    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            SceneError::InvalidInput(_) => 400,

            SceneError::Transport(_)
            | SceneError::Fetch(_)
            | SceneError::Publish(_)
            | SceneError::NothingFetched { .. } => 502,

            _ => 500,
        }
    }

    /// Short machine-readable category used in error responses and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SceneError::Transport(_) => "transport",
            SceneError::Decode(_) => "decode",
            SceneError::Fetch(_) => "fetch",
            SceneError::Publish(_) => "publish",
            SceneError::Table { .. } => "table",
            SceneError::Ledger(_) => "ledger",
            SceneError::Storage(_) => "storage",
            SceneError::InvalidInput(_) => "invalid_input",
            SceneError::NothingFetched { .. } => "nothing_fetched",
            SceneError::NoDecodableRasters { .. } => "no_decodable_rasters",
            SceneError::Compute(_) => "compute",
            SceneError::Io(_) => "io",
        }
    }
}

impl From<serde_json::Error> for SceneError {
    fn from(err: serde_json::Error) -> Self {
        SceneError::InvalidInput(format!("JSON error: {}", err))
    }
}
