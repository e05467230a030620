//! Storage abstractions for the scene summary pipeline.
//!
//! Provides unified interfaces for:
//! - Object storage (S3/MinIO) for published artifacts and summary tables
//! - A SQLite run ledger recording verified downloads and publications

pub mod error;
pub mod ledger;
pub mod object_store;

pub use self::object_store::{ObjectStorage, ObjectStorageConfig, StoragePath};
pub use error::{StorageError, StorageResult};
pub use ledger::{ArtifactRecord, LedgerStats, RunLedger};
