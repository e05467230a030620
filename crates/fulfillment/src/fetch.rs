//! Idempotent artifact fetcher with retry and integrity tracking.
//!
//! Key features:
//! - Transfers stream to `<name>.partial` and are renamed only once complete
//! - Exponential backoff retry on transient failures
//! - File integrity verification via Content-Length and SHA-256
//! - Verified downloads recorded in the run ledger so a later run can reuse
//!   them without trusting a possibly truncated file

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use futures::{stream, StreamExt};
use reqwest::Client;
use scene_common::{FetchError, ResultArtifact, TransportError};
use sha2::{Digest, Sha256};
use storage::{ArtifactRecord, RunLedger};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, instrument, warn};

use crate::error::transport_error;
use crate::metrics;

/// Configuration for the fetcher.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Re-download even when a verified local copy exists
    pub overwrite: bool,
    /// Maximum number of retry attempts per artifact
    pub max_retries: u32,
    /// Initial retry delay (doubles each retry)
    pub initial_retry_delay: Duration,
    /// Maximum retry delay
    pub max_retry_delay: Duration,
    /// Transfers in flight at once
    pub max_concurrent: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            overwrite: true,
            max_retries: 2,
            initial_retry_delay: Duration::from_secs(2),
            max_retry_delay: Duration::from_secs(30),
            max_concurrent: 4,
        }
    }
}

/// A result artifact materialized on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedArtifact {
    pub name: String,
    pub path: PathBuf,
    pub sha256: String,
    pub bytes: u64,
    /// Verified local copy was kept instead of downloading.
    pub reused: bool,
}

/// Outcome of fetching a batch of artifacts.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub requested: usize,
    /// Successful fetches, in input order
    pub fetched: Vec<FetchedArtifact>,
    /// Per-item failures, in input order
    pub failures: Vec<FetchError>,
}

impl FetchReport {
    pub fn fetched_count(&self) -> usize {
        self.fetched.len()
    }

    /// Local path of a fetched artifact by logical name.
    pub fn path_of(&self, name: &str) -> Option<&Path> {
        self.fetched
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.path.as_path())
    }

    pub fn transfers(&self) -> usize {
        self.fetched.iter().filter(|a| !a.reused).count()
    }
}

/// Materializes result artifacts into a destination directory.
#[derive(Clone)]
pub struct ArtifactFetcher {
    client: Client,
    ledger: RunLedger,
    config: FetchConfig,
}

impl ArtifactFetcher {
    pub fn new(client: Client, ledger: RunLedger, config: FetchConfig) -> Self {
        Self {
            client,
            ledger,
            config,
        }
    }

    /// Fetch every item, bounded by `max_concurrent`.
    ///
    /// A failed item never aborts the others.
    pub async fn fetch_all(&self, items: &[ResultArtifact], destination: &Path) -> FetchReport {
        let futures: Vec<_> = items
            .iter()
            .enumerate()
            .map(|(index, item)| async move { (index, self.fetch(item, destination).await) })
            .collect();
        let mut outcomes: Vec<(usize, Result<FetchedArtifact, FetchError>)> =
            stream::iter(futures)
                .buffer_unordered(self.config.max_concurrent.max(1))
                .collect()
                .await;
        outcomes.sort_by_key(|(index, _)| *index);

        let mut report = FetchReport {
            requested: items.len(),
            ..Default::default()
        };
        for (_, outcome) in outcomes {
            match outcome {
                Ok(artifact) => report.fetched.push(artifact),
                Err(e) => {
                    warn!(name = %e.name(), error = %e, "Artifact fetch failed");
                    metrics::record_fetch_failure();
                    report.failures.push(e);
                }
            }
        }

        info!(
            requested = report.requested,
            fetched = report.fetched_count(),
            transfers = report.transfers(),
            failed = report.failures.len(),
            "Fetch complete"
        );
        report
    }

    /// Fetch one artifact into `destination/<name>`.
    #[instrument(skip(self, item), fields(name = %item.name))]
    pub async fn fetch(
        &self,
        item: &ResultArtifact,
        destination: &Path,
    ) -> Result<FetchedArtifact, FetchError> {
        let final_path = local_path(destination, &item.name)?;

        if !self.config.overwrite {
            if let Some(artifact) = self.verified_copy(item, &final_path).await {
                info!(path = %final_path.display(), "Verified local copy exists, skipping download");
                metrics::record_reused();
                return Ok(artifact);
            }
        }

        let io_error = |path: &Path, source: std::io::Error| FetchError::Io {
            name: item.name.clone(),
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }
        let temp_path = partial_path(&final_path);

        let (bytes, sha256) = self.download_with_retry(item, &temp_path).await?;

        // Move to final location (use copy+delete for cross-filesystem support)
        if fs::rename(&temp_path, &final_path).await.is_err() {
            fs::copy(&temp_path, &final_path)
                .await
                .map_err(|e| io_error(&final_path, e))?;
            fs::remove_file(&temp_path)
                .await
                .map_err(|e| io_error(&temp_path, e))?;
        }

        let record = ArtifactRecord {
            local_path: final_path.clone(),
            name: item.name.clone(),
            url: item.location.clone(),
            bytes,
            sha256: sha256.clone(),
            completed_at: Utc::now(),
        };
        if let Err(e) = self.ledger.record_artifact(&record).await {
            // The file is complete; without a record it is only re-downloaded next time.
            warn!(error = %e, "Failed to record artifact in ledger");
        }

        metrics::record_fetched(bytes);
        info!(path = %final_path.display(), bytes = bytes, "Download completed");

        Ok(FetchedArtifact {
            name: item.name.clone(),
            path: final_path,
            sha256,
            bytes,
            reused: false,
        })
    }

    /// A local copy is trusted only if the ledger recorded it and it still
    /// matches the recorded size and digest.
    async fn verified_copy(&self, item: &ResultArtifact, path: &Path) -> Option<FetchedArtifact> {
        let record = match self.ledger.artifact(path).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                if fs::try_exists(path).await.unwrap_or(false) {
                    debug!(path = %path.display(), "Local file has no ledger record, re-downloading");
                }
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Ledger lookup failed, re-downloading");
                return None;
            }
        };

        match hash_file(path).await {
            Ok((bytes, sha256)) if bytes == record.bytes && sha256 == record.sha256 => {
                Some(FetchedArtifact {
                    name: item.name.clone(),
                    path: path.to_path_buf(),
                    sha256,
                    bytes,
                    reused: true,
                })
            }
            Ok((bytes, _)) => {
                warn!(
                    path = %path.display(),
                    expected_bytes = record.bytes,
                    actual_bytes = bytes,
                    "Local copy does not match ledger, re-downloading"
                );
                let _ = self.ledger.forget_artifact(path).await;
                None
            }
            Err(_) => {
                let _ = self.ledger.forget_artifact(path).await;
                None
            }
        }
    }

    async fn download_with_retry(
        &self,
        item: &ResultArtifact,
        temp_path: &Path,
    ) -> Result<(u64, String), FetchError> {
        let mut retry_count = 0;
        let mut delay = self.config.initial_retry_delay;

        loop {
            match self.download_once(item, temp_path).await {
                Ok(done) => return Ok(done),
                Err(e) => {
                    let _ = fs::remove_file(temp_path).await;

                    let retryable = match &e {
                        FetchError::Transport { source, .. } => source.is_transient(),
                        FetchError::SizeMismatch { .. } => true,
                        _ => false,
                    };
                    if !retryable || retry_count >= self.config.max_retries {
                        return Err(e);
                    }
                    retry_count += 1;

                    warn!(
                        error = %e,
                        retry = retry_count,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Download failed, retrying"
                    );

                    tokio::time::sleep(delay).await;

                    // Exponential backoff
                    delay = std::cmp::min(delay * 2, self.config.max_retry_delay);
                }
            }
        }
    }

    /// One transfer attempt into `temp_path`, returning size and digest.
    async fn download_once(
        &self,
        item: &ResultArtifact,
        temp_path: &Path,
    ) -> Result<(u64, String), FetchError> {
        let url = item.location.as_str();
        let transport = |source: TransportError| FetchError::Transport {
            name: item.name.clone(),
            source,
        };
        let io_error = |source: std::io::Error| FetchError::Io {
            name: item.name.clone(),
            path: temp_path.to_path_buf(),
            source,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport(transport_error(url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(transport(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }));
        }
        let expected = response.content_length();

        let mut file = File::create(temp_path).await.map_err(io_error)?;
        let mut hasher = Sha256::new();
        let mut written = 0u64;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| transport(transport_error(url, e)))?;
            file.write_all(&chunk).await.map_err(io_error)?;
            hasher.update(&chunk);
            written += chunk.len() as u64;
        }

        // Flush and sync
        file.flush().await.map_err(io_error)?;
        file.sync_all().await.map_err(io_error)?;

        if let Some(expected) = expected {
            if expected != written {
                return Err(FetchError::SizeMismatch {
                    name: item.name.clone(),
                    expected,
                    actual: written,
                });
            }
        }

        Ok((written, hex::encode(hasher.finalize())))
    }
}

/// Local path for a logical name, rejecting names that escape `destination`.
pub fn local_path(destination: &Path, name: &str) -> Result<PathBuf, FetchError> {
    let relative = Path::new(name);
    let safe = !name.is_empty()
        && relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));

    if !safe {
        return Err(FetchError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(destination.join(relative))
}

fn partial_path(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

/// Size and lowercase hex SHA-256 of a file.
pub async fn hash_file(path: &Path) -> std::io::Result<(u64, String)> {
    let mut file = File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];
    let mut total = 0u64;

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
        total += n as u64;
    }

    Ok((total, hex::encode(hasher.finalize())))
}
