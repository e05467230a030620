//! Object storage interface for published artifacts (S3/MinIO compatible).

use std::sync::Arc;
use std::time::Duration;

use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::types::ObjectCannedAcl;
use bytes::Bytes;
use object_store::{aws::AmazonS3Builder, path::Path, ClientOptions, ObjectStore};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{StorageError, StorageResult};

/// Configuration for object storage connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStorageConfig {
    /// S3 endpoint URL; `None` uses the AWS regional endpoint
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Bucket name
    pub bucket: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// AWS region
    pub region: String,
    /// Allow HTTP (for local MinIO)
    #[serde(default)]
    pub allow_http: bool,
    /// Grant public read on every uploaded object
    #[serde(default = "default_public_read")]
    pub public_read: bool,
    /// Base for public object URLs; `None` uses the virtual-hosted AWS form
    #[serde(default)]
    pub public_base_url: Option<String>,
    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_public_read() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for ObjectStorageConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            bucket: "scene-summaries".to_string(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            region: "us-west-2".to_string(),
            allow_http: false,
            public_read: default_public_read(),
            public_base_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ObjectStorageConfig {
    /// Base URL that public object URLs are built from.
    pub fn resolved_public_base(&self) -> String {
        match &self.public_base_url {
            Some(base) => base.clone(),
            None => format!("https://{}.s3.{}.amazonaws.com", self.bucket, self.region),
        }
    }
}

/// Object storage client for published artifacts.
///
/// Constructed once per pipeline and passed to whoever publishes; there is no
/// process-wide client.
#[derive(Clone)]
pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    public_base: Url,
    /// S3 client that grants `public-read` after each upload, when enabled
    acl: Option<aws_sdk_s3::Client>,
}

impl ObjectStorage {
    /// Create a new object storage client from config.
    pub async fn new(config: &ObjectStorageConfig) -> StorageResult<Self> {
        let options = ClientOptions::new().with_timeout(Duration::from_secs(config.timeout_secs));

        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&config.bucket)
            .with_access_key_id(&config.access_key_id)
            .with_secret_access_key(&config.secret_access_key)
            .with_region(&config.region)
            .with_client_options(options);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        if config.allow_http {
            builder = builder.with_allow_http(true);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::Client(format!("Failed to create S3 client: {}", e)))?;

        let mut storage = Self::with_store(
            Arc::new(store),
            &config.bucket,
            &config.resolved_public_base(),
        )?;
        if config.public_read {
            storage.acl = Some(acl_client(config).await);
        }
        Ok(storage)
    }

    /// Wrap an already-built store (in-memory, local filesystem, ...).
    pub fn with_store(
        store: Arc<dyn ObjectStore>,
        bucket: &str,
        public_base: &str,
    ) -> StorageResult<Self> {
        let public_base = Url::parse(public_base).map_err(|e| StorageError::InvalidUrl {
            base: public_base.to_string(),
            message: e.to_string(),
        })?;
        if public_base.cannot_be_a_base() {
            return Err(StorageError::InvalidUrl {
                base: public_base.to_string(),
                message: "URL cannot carry a path".to_string(),
            });
        }

        Ok(Self {
            store,
            bucket: bucket.to_string(),
            public_base,
            acl: None,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Deterministic public URL of `key`; no request is made.
    pub fn public_url(&self, key: &str) -> String {
        let mut url = self.public_base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty();
            segments.extend(key.split('/').filter(|s| !s.is_empty()));
        }
        url.to_string()
    }

    /// Write bytes to a key in the bucket.
    #[instrument(skip(self, data), fields(bucket = %self.bucket, key = %key))]
    pub async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let location = Path::from(key);
        debug!(size = data.len(), "Writing object");

        self.store
            .put(&location, data.into())
            .await
            .map_err(|e| StorageError::Write {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        if let Some(client) = &self.acl {
            client
                .put_object_acl()
                .bucket(&self.bucket)
                .key(key)
                .acl(ObjectCannedAcl::PublicRead)
                .send()
                .await
                .map_err(|e| StorageError::Acl {
                    key: key.to_string(),
                    message: DisplayErrorContext(&e).to_string(),
                })?;
            debug!("Granted public read");
        }

        Ok(())
    }

    /// Read bytes from a key.
    #[instrument(skip(self), fields(bucket = %self.bucket, key = %key))]
    pub async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let location = Path::from(key);

        let result = self
            .store
            .get(&location)
            .await
            .map_err(|e| StorageError::Read {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        let bytes = result.bytes().await.map_err(|e| StorageError::Read {
            key: key.to_string(),
            message: e.to_string(),
        })?;

        debug!(size = bytes.len(), "Read object");
        Ok(bytes)
    }

    /// Check if an object exists.
    pub async fn exists(&self, key: &str) -> StorageResult<bool> {
        let location = Path::from(key);

        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::Read {
                key: key.to_string(),
                message: e.to_string(),
            }),
        }
    }

    /// List object keys under a prefix.
    pub async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        use futures::TryStreamExt;

        let prefix_path = Path::from(prefix);
        let mut keys = Vec::new();

        let mut stream = self.store.list(Some(&prefix_path));
        while let Some(meta) = stream
            .try_next()
            .await
            .map_err(|e| StorageError::List(e.to_string()))?
        {
            keys.push(meta.location.to_string());
        }

        keys.sort();
        Ok(keys)
    }
}

/// Signed S3 client used only for canned-ACL requests.
async fn acl_client(config: &ObjectStorageConfig) -> aws_sdk_s3::Client {
    let timeouts = TimeoutConfig::builder()
        .operation_timeout(Duration::from_secs(config.timeout_secs))
        .build();

    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.region.clone()))
        .timeout_config(timeouts);

    // Empty keys fall back to the default credential chain
    if !config.access_key_id.is_empty() {
        loader = loader.credentials_provider(Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "scene-summary-config",
        ));
    }
    if let Some(endpoint) = &config.endpoint {
        loader = loader.endpoint_url(endpoint);
    }

    let sdk_config = loader.load().await;
    let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
        .force_path_style(config.endpoint.is_some())
        .build();
    aws_sdk_s3::Client::from_conf(s3_config)
}

/// Path builder for consistent storage layout.
pub struct StoragePath;

impl StoragePath {
    /// Build key for a raw delivered artifact.
    /// Format: output/{provider}/{site}/{run_id}/{file_name}
    pub fn raw_artifact(provider: &str, site: &str, run_id: &str, file_name: &str) -> String {
        format!("output/{}/{}/{}/{}", provider, site, run_id, file_name)
    }

    /// Build key for a per-site summary table.
    /// Format: output/{provider}/{run_id}_{site}_summary.csv
    pub fn site_summary(provider: &str, run_id: &str, site: &str) -> String {
        format!("output/{}/{}", provider, Self::site_summary_file(run_id, site))
    }

    /// Local file name of a per-site summary table.
    pub fn site_summary_file(run_id: &str, site: &str) -> String {
        format!("{}_{}_summary.csv", run_id, site)
    }

    /// Build key for the cross-site rollup.
    /// Format: output/{run_id}_summary.csv
    pub fn rollup(run_id: &str) -> String {
        format!("output/{}", Self::rollup_file(run_id))
    }

    /// Local file name of the cross-site rollup.
    pub fn rollup_file(run_id: &str) -> String {
        format!("{}_summary.csv", run_id)
    }
}
