//! CLI subcommands and the argument groups they share

pub mod completions;
pub mod config_info;
pub mod upload_dir;
pub mod upload_file;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use bulkup_core::{CancellationToken, Config, ConfigManager, ObjectStore, Uploader};
use bulkup_core::scheduler::{META_FILE_HASH, META_UPLOAD_TIMESTAMP};
use bulkup_s3::S3Store;
use clap::{Args, Subcommand};
use tokio::task::JoinHandle;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload a single file
    UploadFile(upload_file::UploadFileArgs),

    /// Upload every eligible file under a directory
    UploadDir(upload_dir::UploadDirArgs),

    /// Show the effective configuration
    ConfigInfo(config_info::ConfigInfoArgs),

    /// Generate shell completion scripts
    Completions(completions::CompletionsArgs),
}

/// Execute a subcommand
pub async fn execute(
    command: Commands,
    config_path: Option<&Path>,
    output_config: OutputConfig,
) -> ExitCode {
    match command {
        Commands::UploadFile(args) => upload_file::execute(args, config_path, output_config).await,
        Commands::UploadDir(args) => upload_dir::execute(args, config_path, output_config).await,
        Commands::ConfigInfo(args) => config_info::execute(args, config_path, output_config),
        Commands::Completions(args) => completions::execute(args),
    }
}

/// Store connection overrides; flags and environment win over the config file
#[derive(Args, Debug, Default, Clone)]
pub struct StoreArgs {
    /// S3 endpoint URL
    #[arg(long, env = "BULKUP_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Target bucket
    #[arg(long, env = "BULKUP_BUCKET")]
    pub bucket: Option<String>,

    /// Region (default: us-east-1)
    #[arg(long, env = "BULKUP_REGION")]
    pub region: Option<String>,

    /// Access key ID
    #[arg(long, env = "BULKUP_ACCESS_KEY", hide_env_values = true)]
    pub access_key: Option<String>,

    /// Secret access key
    #[arg(long, env = "BULKUP_SECRET_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,
}

/// Engine tuning overrides
#[derive(Args, Debug, Default, Clone)]
pub struct TuningArgs {
    /// Number of parallel uploads
    #[arg(short = 'P', long, env = "BULKUP_MAX_WORKERS")]
    pub workers: Option<usize>,

    /// Attempts per file, including the first
    #[arg(long, env = "BULKUP_MAX_RETRIES")]
    pub retries: Option<u32>,

    /// Read buffer for streaming uploads (bytes or units like 8M)
    #[arg(long, env = "BULKUP_CHUNK_SIZE", value_parser = parse_size)]
    pub chunk_size: Option<u64>,

    /// Skip SHA-256 digests and upload verification
    #[arg(long)]
    pub no_verify: bool,
}

impl StoreArgs {
    fn apply(&self, config: &mut Config) {
        let store = &mut config.store;
        if let Some(endpoint) = &self.endpoint {
            store.endpoint = endpoint.clone();
        }
        if let Some(bucket) = &self.bucket {
            store.bucket = bucket.clone();
        }
        if let Some(region) = &self.region {
            store.region = region.clone();
        }
        if let Some(access_key) = &self.access_key {
            store.access_key = access_key.clone();
        }
        if let Some(secret_key) = &self.secret_key {
            store.secret_key = secret_key.clone();
        }
    }
}

impl TuningArgs {
    fn apply(&self, config: &mut Config) {
        let upload = &mut config.upload;
        if let Some(workers) = self.workers {
            upload.max_workers = workers;
        }
        if let Some(retries) = self.retries {
            upload.max_retries = retries;
        }
        if let Some(chunk_size) = self.chunk_size {
            upload.chunk_size = usize::try_from(chunk_size).unwrap_or(usize::MAX);
        }
        if self.no_verify {
            upload.verify_integrity = false;
        }
    }
}

/// Read the config file and layer command-line overrides on top
pub fn load_config(
    config_path: Option<&Path>,
    store: &StoreArgs,
    tuning: &TuningArgs,
) -> anyhow::Result<(Config, ConfigManager)> {
    let manager = match config_path {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };
    let mut config = manager
        .load()
        .with_context(|| format!("failed to load config from {}", manager.path().display()))?;

    store.apply(&mut config);
    tuning.apply(&mut config);
    Ok((config, manager))
}

/// Validate the full config and build an uploader backed by S3
pub async fn connect(
    config: &Config,
    create_bucket: bool,
    formatter: &Formatter,
) -> Result<Uploader, ExitCode> {
    if let Err(e) = config.validate() {
        formatter.error(&e.to_string());
        return Err(ExitCode::UsageError);
    }

    let store = match S3Store::new(&config.store).await {
        Ok(store) => store,
        Err(e) => {
            formatter.error(&format!("Failed to create S3 client: {e}"));
            return Err(ExitCode::UsageError);
        }
    };

    if create_bucket {
        match store.ensure_bucket().await {
            Ok(true) => formatter.success(&format!(
                "Created bucket {}",
                formatter.style_target(store.bucket())
            )),
            Ok(false) => {}
            Err(e) => {
                formatter.error(&format!("Failed to prepare bucket '{}': {e}", store.bucket()));
                return Err(ExitCode::from_error_kind(e.kind));
            }
        }
    }

    let store: Arc<dyn ObjectStore> = Arc::new(store);
    Uploader::new(store, config.upload.clone()).map_err(|e| {
        formatter.error(&e.to_string());
        ExitCode::UsageError
    })
}

/// Cancel `token` on the first Ctrl-C
///
/// Abort the returned handle once the run is over.
pub fn cancel_on_ctrl_c(token: CancellationToken, formatter: &Formatter) -> JoinHandle<()> {
    let formatter = formatter.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; waiting for in-flight uploads");
            formatter.warning("Interrupted, finishing in-flight uploads...");
            token.cancel();
        }
    })
}

/// Parse a `key=value` metadata argument
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid metadata '{s}': use key=value"))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(format!("invalid metadata '{s}': key cannot be empty"));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(format!(
            "invalid metadata key '{key}': use letters, digits, '-' or '_'"
        ));
    }
    if key.eq_ignore_ascii_case(META_FILE_HASH) || key.eq_ignore_ascii_case(META_UPLOAD_TIMESTAMP)
    {
        return Err(format!("metadata key '{key}' is set automatically"));
    }

    Ok((key.to_string(), value.to_string()))
}

/// Parse a byte count with an optional binary unit suffix
pub fn parse_size(value: &str) -> Result<u64, String> {
    let value = value.trim();
    if value.is_empty() {
        return Err("size cannot be empty".to_string());
    }

    let split_index = value
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(value.len());
    let (number_part, unit_part) = value.split_at(split_index);
    if number_part.is_empty() {
        return Err(format!("invalid size: '{value}'"));
    }

    let number = number_part
        .parse::<u64>()
        .map_err(|_| format!("invalid size number: '{number_part}'"))?;

    let multiplier = match unit_part.trim().to_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => 1024,
        "M" | "MB" | "MIB" => 1024 * 1024,
        "G" | "GB" | "GIB" => 1024 * 1024 * 1024,
        "T" | "TB" | "TIB" => 1024_u64.pow(4),
        _ => return Err(format!("invalid size unit: '{unit_part}'")),
    };

    number
        .checked_mul(multiplier)
        .ok_or_else(|| format!("size is too large: '{value}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("project=alpha").unwrap(),
            ("project".to_string(), "alpha".to_string())
        );
        assert_eq!(
            parse_key_value("note=a=b").unwrap(),
            ("note".to_string(), "a=b".to_string())
        );
        assert_eq!(
            parse_key_value("empty=").unwrap(),
            ("empty".to_string(), String::new())
        );
    }

    #[test]
    fn test_parse_key_value_errors() {
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=value").is_err());
        assert!(parse_key_value("bad key=value").is_err());
        assert!(parse_key_value("file-hash=abc").is_err());
        assert!(parse_key_value("Upload-Timestamp=now").is_err());
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1024").unwrap(), 1024);
        assert_eq!(parse_size("4K").unwrap(), 4096);
        assert_eq!(parse_size("8MiB").unwrap(), 8 * 1024 * 1024);
        assert_eq!(parse_size("2g").unwrap(), 2 * 1024 * 1024 * 1024);
    }

    #[test]
    fn test_parse_size_errors() {
        assert!(parse_size("").is_err());
        assert!(parse_size("MB").is_err());
        assert!(parse_size("1X").is_err());
        assert!(parse_size("99999999999T").is_err());
    }

    #[test]
    fn test_overrides_replace_config_values() {
        let mut config = Config::default();
        let store = StoreArgs {
            endpoint: Some("http://localhost:9000".to_string()),
            bucket: Some("uploads".to_string()),
            ..Default::default()
        };
        let tuning = TuningArgs {
            workers: Some(12),
            chunk_size: Some(8 * 1024 * 1024),
            no_verify: true,
            ..Default::default()
        };

        store.apply(&mut config);
        tuning.apply(&mut config);

        assert_eq!(config.store.endpoint, "http://localhost:9000");
        assert_eq!(config.store.bucket, "uploads");
        assert_eq!(config.store.region, "us-east-1");
        assert_eq!(config.upload.max_workers, 12);
        assert_eq!(config.upload.max_retries, 3);
        assert_eq!(config.upload.chunk_size, 8 * 1024 * 1024);
        assert!(!config.upload.verify_integrity);
    }

    #[test]
    fn test_load_config_missing_file_uses_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("missing.toml");
        let (config, manager) =
            load_config(Some(&path), &StoreArgs::default(), &TuningArgs::default()).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(manager.path(), path.as_path());
    }

    #[test]
    fn test_load_config_reports_parse_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[upload\nmax_workers = ").unwrap();
        let err = load_config(Some(&path), &StoreArgs::default(), &TuningArgs::default())
            .unwrap_err();
        assert!(format!("{err:#}").contains("failed to load config"));
    }
}
