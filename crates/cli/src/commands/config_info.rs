//! config-info command - Show the effective configuration

use std::path::Path;

use bulkup_core::{Config, StoreSettings};
use clap::Args;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{ContentArrangement, Table};
use serde::Serialize;

use super::{StoreArgs, TuningArgs, load_config};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig, format_size};

/// Show the effective configuration
#[derive(Args, Debug, Default)]
pub struct ConfigInfoArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub tuning: TuningArgs,
}

#[derive(Debug, Serialize)]
struct ConfigInfoOutput<'a> {
    config_file: String,
    config_file_exists: bool,
    #[serde(flatten)]
    config: &'a Config,
    secret_key_set: bool,
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    validation_error: Option<String>,
}

/// Execute the config-info command
pub fn execute(args: ConfigInfoArgs, config_path: Option<&Path>, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let (config, manager) = match load_config(config_path, &args.store, &args.tuning) {
        Ok(loaded) => loaded,
        Err(e) => {
            formatter.error(&format!("{e:#}"));
            return ExitCode::UsageError;
        }
    };
    let validation_error = config.validate().err().map(|e| e.to_string());

    if formatter.is_json() {
        formatter.json(&ConfigInfoOutput {
            config_file: manager.path().display().to_string(),
            config_file_exists: manager.path().exists(),
            config: &config,
            secret_key_set: !config.store.secret_key.is_empty(),
            valid: validation_error.is_none(),
            validation_error,
        });
        return ExitCode::Success;
    }

    let source = if manager.path().exists() {
        manager.path().display().to_string()
    } else {
        format!("{} (not found, using defaults)", manager.path().display())
    };
    formatter.println(&format!("{} {source}", formatter.style_label("Config file:")));
    formatter.println(&build_table(&config).to_string());

    match validation_error {
        None => formatter.success("Configuration is valid"),
        Some(e) => formatter.warning(&e),
    }
    ExitCode::Success
}

fn build_table(config: &Config) -> Table {
    let upload = &config.upload;
    let store = &config.store;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Setting", "Value"]);

    let rows: Vec<(&str, String)> = vec![
        ("Endpoint", or_unset(&store.endpoint)),
        ("Bucket", or_unset(&store.bucket)),
        ("Region", store.region.clone()),
        ("Bucket lookup", store.bucket_lookup.clone()),
        ("Access key", mask_access_key(store)),
        ("Secret key", secret_state(store).to_string()),
        ("Max workers", upload.max_workers.to_string()),
        ("Max retries", upload.max_retries.to_string()),
        (
            "Retry delay",
            format!("{}ms base, {}ms max", upload.base_delay_ms, upload.max_delay_ms),
        ),
        ("Chunk size", format_size(upload.chunk_size as u64)),
        (
            "Max file size",
            upload
                .max_file_size
                .map(format_size)
                .unwrap_or_else(|| "unlimited".to_string()),
        ),
        ("Include patterns", join_or(&upload.include, "(all files)")),
        ("Exclude patterns", join_or(&upload.exclude, "(none)")),
        (
            "Verify integrity",
            if upload.verify_integrity { "yes" } else { "no" }.to_string(),
        ),
    ];
    for (key, value) in rows {
        table.add_row(vec![key.to_string(), value]);
    }
    table
}

fn or_unset(value: &str) -> String {
    if value.is_empty() {
        "(not set)".to_string()
    } else {
        value.to_string()
    }
}

fn join_or(patterns: &[String], empty: &str) -> String {
    if patterns.is_empty() {
        empty.to_string()
    } else {
        patterns.join(", ")
    }
}

/// Show only enough of the access key to recognize it
fn mask_access_key(store: &StoreSettings) -> String {
    let key = &store.access_key;
    if key.is_empty() {
        return "(not set)".to_string();
    }
    let visible: String = key.chars().take(4).collect();
    format!("{visible}****")
}

fn secret_state(store: &StoreSettings) -> &'static str {
    if store.secret_key.is_empty() {
        "(not set)"
    } else {
        "****"
    }
}
