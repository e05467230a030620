//! Publishing local files to object storage under public URLs.

use std::path::Path;

use bytes::Bytes;
use scene_common::{PublicationRecord, PublishError, RunId};
use storage::{ObjectStorage, RunLedger, StorageError};
use tracing::{info, instrument, warn};

use crate::metrics;

/// Uploads artifacts and tables; objects are publicly readable on upload.
///
/// There is no automatic retry: a failed upload surfaces as
/// [`PublishError`] and the orchestrator decides whether to re-invoke.
#[derive(Clone)]
pub struct Publisher {
    storage: ObjectStorage,
    ledger: RunLedger,
}

impl Publisher {
    pub fn new(storage: ObjectStorage, ledger: RunLedger) -> Self {
        Self { storage, ledger }
    }

    pub fn storage(&self) -> &ObjectStorage {
        &self.storage
    }

    /// Upload `local_path` to `key` and return where it can be read.
    #[instrument(skip(self, local_path), fields(key = %key, run_id = %run_id))]
    pub async fn publish(
        &self,
        local_path: &Path,
        key: &str,
        run_id: &RunId,
    ) -> Result<PublicationRecord, PublishError> {
        let data = tokio::fs::read(local_path)
            .await
            .map_err(|source| PublishError::Read {
                path: local_path.to_path_buf(),
                source,
            })?;
        let size = data.len();

        self.storage
            .put(key, Bytes::from(data))
            .await
            .map_err(|e| match e {
                StorageError::Acl { key, message } => PublishError::Acl { key, message },
                other => PublishError::Upload {
                    key: key.to_string(),
                    message: other.to_string(),
                },
            })?;

        let record = PublicationRecord {
            local_path: local_path.to_path_buf(),
            key: key.to_string(),
            url: self.storage.public_url(key),
        };

        if let Err(e) = self.ledger.record_publication(run_id, &record).await {
            warn!(error = %e, "Failed to record publication in ledger");
        }

        metrics::record_published();
        info!(bytes = size, url = %record.url, "Published object");
        Ok(record)
    }
}
