//! Configuration management
//!
//! Settings are read from a TOML file (by default
//! `~/.config/bulkup/config.toml`). A missing file yields defaults; the CLI
//! layers environment variables and flags on top before validating.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::retry::{RetryBuilder, RetryPolicy};

/// Default number of concurrent upload workers
pub const DEFAULT_MAX_WORKERS: usize = 5;
/// Default ceiling on attempts per file
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default streaming chunk size (4 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Patterns excluded when neither the config nor the caller provides any
pub fn default_exclude_patterns() -> Vec<String> {
    ["*.tmp", "*.log", ".*", "__pycache__"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Engine tuning consumed by the uploader and scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    pub max_workers: usize,
    /// Total attempts per file, including the first
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub chunk_size: usize,
    pub max_file_size: Option<u64>,
    /// Default include patterns for directory uploads (empty means all files)
    pub include: Vec<String>,
    /// Default exclude patterns for directory uploads
    pub exclude: Vec<String>,
    /// Compare the local digest with the one the store reports
    pub verify_integrity: bool,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_file_size: None,
            include: Vec::new(),
            exclude: default_exclude_patterns(),
            verify_integrity: true,
        }
    }
}

impl UploadSettings {
    /// Reject settings the scheduler cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(Error::Config(
                "max_workers must be greater than 0".to_string(),
            ));
        }
        if self.max_retries == 0 {
            return Err(Error::Config(
                "max_retries must be greater than 0".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(Error::Config(
                "chunk_size must be greater than 0".to_string(),
            ));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(Error::Config(format!(
                "base_delay_ms ({}) must not exceed max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Build the retry policy described by these settings
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryBuilder::new()
            .max_attempts(self.max_retries)
            .base_delay(self.base_delay())
            .max_delay(self.max_delay())
            .build()
    }
}

/// Connection settings for the S3-compatible store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    #[serde(skip_serializing)]
    pub secret_key: String,
    pub bucket: String,
    /// Bucket lookup style: auto, path, or dns
    pub bucket_lookup: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            region: "us-east-1".to_string(),
            access_key: String::new(),
            secret_key: String::new(),
            bucket: String::new(),
            bucket_lookup: "auto".to_string(),
        }
    }
}

impl StoreSettings {
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.is_empty() {
            return Err(Error::Config("store endpoint is required".to_string()));
        }
        url::Url::parse(&self.endpoint)
            .map_err(|e| Error::Config(format!("invalid endpoint '{}': {e}", self.endpoint)))?;
        if self.bucket.is_empty() {
            return Err(Error::Config("store bucket is required".to_string()));
        }
        if self.access_key.is_empty() || self.secret_key.is_empty() {
            return Err(Error::Config(
                "store access_key and secret_key are required".to_string(),
            ));
        }
        if !matches!(self.bucket_lookup.as_str(), "auto" | "path" | "dns") {
            return Err(Error::Config(format!(
                "bucket_lookup must be 'auto', 'path' or 'dns', got '{}'",
                self.bucket_lookup
            )));
        }
        Ok(())
    }
}

/// Root of the config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub upload: UploadSettings,
    pub store: StoreSettings,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        self.upload.validate()?;
        self.store.validate()
    }
}

/// Locates and loads the config file
#[derive(Debug, Clone)]
pub struct ConfigManager {
    path: PathBuf,
}

impl ConfigManager {
    /// Use the default location under the platform config directory
    pub fn new() -> Result<Self> {
        let dir = dirs::config_dir().ok_or_else(|| {
            Error::Config("cannot determine the user config directory".to_string())
        })?;
        Ok(Self {
            path: dir.join("bulkup").join("config.toml"),
        })
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the config file, falling back to defaults when it does not exist
    pub fn load(&self) -> Result<Config> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "Config file not found, using defaults");
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&self.path)?;
        let config: Config = toml::from_str(&content)?;
        tracing::debug!(path = %self.path.display(), "Loaded config file");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn valid_store() -> StoreSettings {
        StoreSettings {
            endpoint: "http://localhost:9000".to_string(),
            access_key: "access".to_string(),
            secret_key: "secret".to_string(),
            bucket: "uploads".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_upload_defaults() {
        let settings = UploadSettings::default();
        assert_eq!(settings.max_workers, 5);
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.chunk_size, 4 * 1024 * 1024);
        assert!(settings.exclude.contains(&"__pycache__".to_string()));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_upload_validation_rejects_zero_values() {
        let zero_workers = UploadSettings {
            max_workers: 0,
            ..Default::default()
        };
        assert!(matches!(zero_workers.validate(), Err(Error::Config(_))));

        let zero_retries = UploadSettings {
            max_retries: 0,
            ..Default::default()
        };
        assert!(matches!(zero_retries.validate(), Err(Error::Config(_))));

        let zero_chunk = UploadSettings {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(matches!(zero_chunk.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_upload_validation_rejects_inverted_delays() {
        let settings = UploadSettings {
            base_delay_ms: 5000,
            max_delay_ms: 100,
            ..Default::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("base_delay_ms"));
    }

    #[test]
    fn test_store_validation() {
        assert!(valid_store().validate().is_ok());

        let bad_endpoint = StoreSettings {
            endpoint: "not a url".to_string(),
            ..valid_store()
        };
        assert!(bad_endpoint.validate().is_err());

        let no_bucket = StoreSettings {
            bucket: String::new(),
            ..valid_store()
        };
        assert!(no_bucket.validate().is_err());

        let bad_lookup = StoreSettings {
            bucket_lookup: "virtual".to_string(),
            ..valid_store()
        };
        assert!(bad_lookup.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(temp.path().join("absent.toml"));
        let config = manager.load().unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_partial_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[upload]
max_workers = 8
exclude = ["*.bak"]

[store]
endpoint = "http://localhost:9000"
bucket = "backups"
"#,
        )
        .unwrap();

        let config = ConfigManager::with_path(&path).load().unwrap();
        assert_eq!(config.upload.max_workers, 8);
        assert_eq!(config.upload.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(config.upload.exclude, vec!["*.bak".to_string()]);
        assert_eq!(config.store.bucket, "backups");
        assert_eq!(config.store.region, "us-east-1");
    }

    #[test]
    fn test_load_invalid_toml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[upload\nmax_workers = ").unwrap();

        let result = ConfigManager::with_path(&path).load();
        assert!(matches!(result, Err(Error::TomlParse(_))));
    }

    #[test]
    fn test_secret_not_serialized() {
        let config = Config {
            store: valid_store(),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret_key"));
        assert!(json.contains("\"access_key\":\"access\""));
    }
}
