//! Pipeline configuration.
//!
//! Loaded from environment variables (the deployment contract of the workflow
//! tasks) or from a YAML file.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use spectral::ReflectanceMode;
use storage::ObjectStorageConfig;

use crate::error::{ConfigError, ConfigResult};

/// Suffix of the surface reflectance clips that get summarized.
pub const DEFAULT_RASTER_SUFFIX: &str = "_3B_AnalyticMS_SR_clip.tif";

/// Provider segment of every object key.
pub const DEFAULT_PROVIDER: &str = "Planet";

/// Everything one pipeline needs besides its injected clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Order API credential (basic-auth user, empty password)
    pub api_key: String,
    /// Local scratch directory for artifacts and tables
    pub scratch_dir: PathBuf,
    /// SQLite ledger of downloads and publications; defaults to
    /// `<scratch_dir>/ledger.db`
    #[serde(default)]
    pub ledger_path: Option<PathBuf>,
    pub storage: ObjectStorageConfig,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_raster_suffix")]
    pub raster_suffix: String,
    /// Re-download artifacts even when a verified local copy exists
    #[serde(default = "default_overwrite")]
    pub overwrite: bool,
    #[serde(default)]
    pub reflectance: ReflectanceMode,
    #[serde(default)]
    pub fetch: FetchSettings,
}

/// Network and retry settings for order status and artifact transfers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSettings {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_fetches: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            max_concurrent_fetches: default_max_concurrent(),
            max_retries: default_max_retries(),
            initial_retry_delay_ms: default_initial_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
        }
    }
}

impl FetchSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn initial_retry_delay(&self) -> Duration {
        Duration::from_millis(self.initial_retry_delay_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }
}

fn default_provider() -> String {
    DEFAULT_PROVIDER.to_string()
}

fn default_raster_suffix() -> String {
    DEFAULT_RASTER_SUFFIX.to_string()
}

fn default_overwrite() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_max_concurrent() -> usize {
    4
}

fn default_max_retries() -> u32 {
    2
}

fn default_initial_retry_delay_ms() -> u64 {
    2_000
}

fn default_max_retry_delay_ms() -> u64 {
    30_000
}

impl PipelineConfig {
    /// Minimal configuration with defaults for everything optional.
    pub fn new(api_key: impl Into<String>, scratch_dir: impl Into<PathBuf>, storage: ObjectStorageConfig) -> Self {
        Self {
            api_key: api_key.into(),
            scratch_dir: scratch_dir.into(),
            ledger_path: None,
            storage,
            provider: default_provider(),
            raster_suffix: default_raster_suffix(),
            overwrite: default_overwrite(),
            reflectance: ReflectanceMode::default(),
            fetch: FetchSettings::default(),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        let storage = ObjectStorageConfig {
            endpoint: env::var("S3_ENDPOINT").ok().filter(|v| !v.is_empty()),
            bucket: required("S3_BUCKET_NAME")?,
            access_key_id: env::var("ACCESS_KEY").unwrap_or_default(),
            secret_access_key: env::var("SECRET_KEY").unwrap_or_default(),
            region: env::var("S3_REGION").unwrap_or_else(|_| "us-west-2".to_string()),
            allow_http: env::var("S3_ALLOW_HTTP")
                .map(|v| v == "true")
                .unwrap_or(false),
            public_base_url: env::var("S3_PUBLIC_BASE_URL").ok().filter(|v| !v.is_empty()),
            ..Default::default()
        };

        let mut config = Self::new(required("PL_API_KEY")?, required("FILEPATH")?, storage);

        config.ledger_path = env::var("LEDGER_PATH").ok().map(PathBuf::from);
        if let Ok(provider) = env::var("PROVIDER") {
            config.provider = provider;
        }
        if let Ok(suffix) = env::var("RASTER_SUFFIX") {
            config.raster_suffix = suffix;
        }
        if let Some(overwrite) = parsed::<bool>("OVERWRITE")? {
            config.overwrite = overwrite;
        }
        if let Some(secs) = parsed::<u64>("REQUEST_TIMEOUT_SECS")? {
            config.fetch.request_timeout_secs = secs;
            config.storage.timeout_secs = secs;
        }
        if let Some(n) = parsed::<usize>("MAX_CONCURRENT_FETCHES")? {
            config.fetch.max_concurrent_fetches = n;
        }
        if let Some(n) = parsed::<u32>("FETCH_MAX_RETRIES")? {
            config.fetch.max_retries = n;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        Self::from_yaml(&content).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                origin: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    pub fn from_yaml(content: &str) -> ConfigResult<Self> {
        let config: Self = serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
            origin: "<inline>".to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.storage.bucket.is_empty() {
            return Err(ConfigError::Invalid("bucket name is empty".to_string()));
        }
        if self.provider.is_empty() || self.provider.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "provider '{}' must be a single key segment",
                self.provider
            )));
        }
        if self.raster_suffix.is_empty() {
            return Err(ConfigError::Invalid("raster suffix is empty".to_string()));
        }
        if self.fetch.max_concurrent_fetches == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_fetches must be at least 1".to_string(),
            ));
        }
        if self.fetch.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request timeout must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }

    pub fn resolved_ledger_path(&self) -> PathBuf {
        self.ledger_path
            .clone()
            .unwrap_or_else(|| self.scratch_dir.join("ledger.db"))
    }
}

fn required(name: &str) -> ConfigResult<String> {
    env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingEnv(name.to_string()))
}

fn parsed<T: std::str::FromStr>(name: &str) -> ConfigResult<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Invalid(format!("{}='{}': {}", name, raw, e))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
api_key: pl-key
scratch_dir: /tmp/scenes
storage:
  bucket: meadows
  access_key_id: ak
  secret_access_key: sk
  region: us-west-2
overwrite: false
reflectance:
  mode: scaled
  blue: 2.0e-5
  green: 2.0e-5
  red: 2.0e-5
  nir: 2.0e-5
fetch:
  max_concurrent_fetches: 2
"#;

    #[test]
    fn test_yaml_with_defaults() {
        let config = PipelineConfig::from_yaml(YAML).unwrap();
        assert_eq!(config.api_key, "pl-key");
        assert_eq!(config.provider, "Planet");
        assert_eq!(config.raster_suffix, DEFAULT_RASTER_SUFFIX);
        assert!(!config.overwrite);
        assert!(config.storage.public_read);
        assert_eq!(config.fetch.max_concurrent_fetches, 2);
        assert_eq!(config.fetch.max_retries, 2);
        assert_eq!(config.reflectance.as_str(), "scaled");
        assert_eq!(
            config.resolved_ledger_path(),
            PathBuf::from("/tmp/scenes/ledger.db")
        );
    }

    #[test]
    fn test_defaults_overwrite() {
        let config = PipelineConfig::new("k", "/tmp", ObjectStorageConfig::default());
        assert!(config.overwrite);
        assert_eq!(config.reflectance, ReflectanceMode::RawDigitalNumber);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut config = PipelineConfig::new("k", "/tmp", ObjectStorageConfig::default());
        config.provider = "a/b".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = PipelineConfig::new("k", "/tmp", ObjectStorageConfig::default());
        config.fetch.max_concurrent_fetches = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_yaml() {
        assert!(matches!(
            PipelineConfig::from_yaml("api_key: [unclosed"),
            Err(ConfigError::Parse { .. })
        ));
    }
}
