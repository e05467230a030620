//! Run ledger persistence using SQLite with sqlx.
//!
//! Records every verified artifact download (size and SHA-256) and every
//! publication, so a re-run can tell a complete local copy from a truncated
//! one and report what a run already uploaded.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use scene_common::{PublicationRecord, RunId};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use crate::error::StorageResult;

const CREATE_ARTIFACTS: &str = r#"
    CREATE TABLE IF NOT EXISTS artifacts (
        local_path TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        url TEXT NOT NULL,
        bytes INTEGER NOT NULL,
        sha256 TEXT NOT NULL,
        completed_at TEXT NOT NULL
    )
"#;

const CREATE_PUBLICATIONS: &str = r#"
    CREATE TABLE IF NOT EXISTS publications (
        run_id TEXT NOT NULL,
        key TEXT NOT NULL,
        local_path TEXT NOT NULL,
        url TEXT NOT NULL,
        published_at TEXT NOT NULL,
        PRIMARY KEY (run_id, key)
    )
"#;

const CREATE_PUBLICATIONS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_publications_run ON publications(run_id)";

/// A download that completed and was verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRecord {
    pub local_path: PathBuf,
    pub name: String,
    pub url: String,
    pub bytes: u64,
    /// Lowercase hex SHA-256 of the file content
    pub sha256: String,
    pub completed_at: DateTime<Utc>,
}

/// Counts for status reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerStats {
    pub artifacts: u64,
    pub artifact_bytes: u64,
    pub publications: u64,
}

/// Persistent record of downloads and publications.
#[derive(Clone)]
pub struct RunLedger {
    pool: SqlitePool,
}

impl RunLedger {
    /// Open or create the ledger database at the given path.
    pub async fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::migrate(&pool).await?;
        info!(path = %path.display(), "Opened run ledger");

        Ok(Self { pool })
    }

    /// Open an in-memory ledger (for testing).
    pub async fn open_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);

        // A second connection would see a different in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    async fn migrate(pool: &SqlitePool) -> StorageResult<()> {
        for statement in [CREATE_ARTIFACTS, CREATE_PUBLICATIONS, CREATE_PUBLICATIONS_INDEX] {
            sqlx::query(statement).execute(pool).await?;
        }
        Ok(())
    }

    /// Record a verified download, replacing any earlier record for the path.
    pub async fn record_artifact(&self, record: &ArtifactRecord) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO artifacts (local_path, name, url, bytes, sha256, completed_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.local_path.to_string_lossy().into_owned())
        .bind(&record.name)
        .bind(&record.url)
        .bind(record.bytes as i64)
        .bind(&record.sha256)
        .bind(record.completed_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(path = %record.local_path.display(), bytes = record.bytes, "Recorded artifact");
        Ok(())
    }

    /// Look up the verified download recorded for a local path.
    pub async fn artifact(&self, local_path: &Path) -> StorageResult<Option<ArtifactRecord>> {
        let row: Option<(String, String, String, i64, String, String)> = sqlx::query_as(
            r#"
            SELECT local_path, name, url, bytes, sha256, completed_at
            FROM artifacts WHERE local_path = ?
            "#,
        )
        .bind(local_path.to_string_lossy().into_owned())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| ArtifactRecord {
            local_path: PathBuf::from(row.0),
            name: row.1,
            url: row.2,
            bytes: row.3 as u64,
            sha256: row.4,
            completed_at: DateTime::parse_from_rfc3339(&row.5)
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        }))
    }

    /// Drop the record for a path whose local copy can no longer be trusted.
    pub async fn forget_artifact(&self, local_path: &Path) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM artifacts WHERE local_path = ?")
            .bind(local_path.to_string_lossy().into_owned())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record an upload made on behalf of a run.
    pub async fn record_publication(
        &self,
        run_id: &RunId,
        record: &PublicationRecord,
    ) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO publications (run_id, key, local_path, url, published_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(run_id.as_str())
        .bind(&record.key)
        .bind(record.local_path.to_string_lossy().into_owned())
        .bind(&record.url)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Publications made for a run, oldest first.
    pub async fn publications(&self, run_id: &RunId) -> StorageResult<Vec<PublicationRecord>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            r#"
            SELECT local_path, key, url FROM publications
            WHERE run_id = ?
            ORDER BY published_at ASC, key ASC
            "#,
        )
        .bind(run_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(local_path, key, url)| PublicationRecord {
                local_path: PathBuf::from(local_path),
                key,
                url,
            })
            .collect())
    }

    /// Get ledger statistics.
    pub async fn stats(&self) -> StorageResult<LedgerStats> {
        let artifacts: (i64, i64) =
            sqlx::query_as("SELECT COUNT(*), COALESCE(SUM(bytes), 0) FROM artifacts")
                .fetch_one(&self.pool)
                .await?;

        let publications: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM publications")
            .fetch_one(&self.pool)
            .await?;

        Ok(LedgerStats {
            artifacts: artifacts.0 as u64,
            artifact_bytes: artifacts.1 as u64,
            publications: publications.0 as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, sha: &str) -> ArtifactRecord {
        ArtifactRecord {
            local_path: PathBuf::from(path),
            name: "a.tif".to_string(),
            url: "https://example.com/a".to_string(),
            bytes: 42,
            sha256: sha.to_string(),
            completed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_artifact_roundtrip_and_replace() {
        let ledger = RunLedger::open_memory().await.unwrap();
        let path = Path::new("/scratch/Site/a.tif");

        assert!(ledger.artifact(path).await.unwrap().is_none());

        ledger
            .record_artifact(&record("/scratch/Site/a.tif", "aa"))
            .await
            .unwrap();
        ledger
            .record_artifact(&record("/scratch/Site/a.tif", "bb"))
            .await
            .unwrap();

        let found = ledger.artifact(path).await.unwrap().unwrap();
        assert_eq!(found.sha256, "bb");
        assert_eq!(found.bytes, 42);

        assert!(ledger.forget_artifact(path).await.unwrap());
        assert!(ledger.artifact(path).await.unwrap().is_none());
        assert!(!ledger.forget_artifact(path).await.unwrap());
    }

    #[tokio::test]
    async fn test_publications_are_scoped_by_run() {
        let ledger = RunLedger::open_memory().await.unwrap();
        let run_a = RunId::parse("run_a").unwrap();
        let run_b = RunId::parse("run_b").unwrap();
        let publication = PublicationRecord {
            local_path: PathBuf::from("/scratch/t.csv"),
            key: "output/Planet/run_a_S_summary.csv".to_string(),
            url: "https://b/output/Planet/run_a_S_summary.csv".to_string(),
        };

        ledger.record_publication(&run_a, &publication).await.unwrap();
        // Re-publishing the same key replaces rather than duplicates.
        ledger.record_publication(&run_a, &publication).await.unwrap();

        assert_eq!(ledger.publications(&run_a).await.unwrap(), vec![publication]);
        assert!(ledger.publications(&run_b).await.unwrap().is_empty());

        let stats = ledger.stats().await.unwrap();
        assert_eq!(stats.publications, 1);
        assert_eq!(stats.artifacts, 0);
    }

    #[tokio::test]
    async fn test_open_file_backed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("ledger.db");
        {
            let ledger = RunLedger::open(&path).await.unwrap();
            ledger.record_artifact(&record("/x/a.tif", "cc")).await.unwrap();
        }
        let reopened = RunLedger::open(&path).await.unwrap();
        let stats = reopened.stats().await.unwrap();
        assert_eq!(stats.artifacts, 1);
        assert_eq!(stats.artifact_bytes, 42);
    }
}
