//! upload-file command - Upload a single file

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use bulkup_core::{ErrorKind, Integrity, OutcomeStatus, SkipReason, TransferOutcome};
use clap::Args;
use serde::Serialize;

use super::{StoreArgs, TuningArgs, cancel_on_ctrl_c, connect, load_config, parse_key_value};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Upload a single file
#[derive(Args, Debug)]
pub struct UploadFileArgs {
    /// Local file to upload
    pub path: PathBuf,

    /// Object name (defaults to the file name)
    #[arg(short = 'n', long)]
    pub name: Option<String>,

    /// Replace an existing object instead of skipping it
    #[arg(long)]
    pub overwrite: bool,

    /// Metadata as key=value (repeatable)
    #[arg(short = 'm', long = "metadata", value_parser = parse_key_value)]
    pub metadata: Vec<(String, String)>,

    /// Create the bucket if it does not exist
    #[arg(long)]
    pub create_bucket: bool,

    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub tuning: TuningArgs,
}

#[derive(Debug, Serialize)]
struct UploadFileOutput<'a> {
    bucket: &'a str,
    #[serde(flatten)]
    outcome: &'a TransferOutcome,
}

/// Execute the upload-file command
pub async fn execute(
    args: UploadFileArgs,
    config_path: Option<&Path>,
    output_config: OutputConfig,
) -> ExitCode {
    let formatter = Formatter::new(output_config);

    if !args.path.exists() {
        formatter.error(&format!("File not found: {}", args.path.display()));
        return ExitCode::NotFound;
    }
    if !args.path.is_file() {
        formatter.error(&format!("Not a regular file: {}", args.path.display()));
        return ExitCode::UsageError;
    }

    let (config, _) = match load_config(config_path, &args.store, &args.tuning) {
        Ok(loaded) => loaded,
        Err(e) => {
            formatter.error(&format!("{e:#}"));
            return ExitCode::UsageError;
        }
    };

    let uploader = match connect(&config, args.create_bucket, &formatter).await {
        Ok(uploader) => uploader,
        Err(code) => return code,
    };

    let interrupt = cancel_on_ctrl_c(uploader.cancel_token(), &formatter);
    let metadata: HashMap<String, String> = args.metadata.into_iter().collect();
    let outcome = uploader
        .upload_one(&args.path, args.name.as_deref(), metadata, args.overwrite)
        .await;
    interrupt.abort();

    if formatter.is_json() {
        formatter.json(&UploadFileOutput {
            bucket: &config.store.bucket,
            outcome: &outcome,
        });
    } else {
        print_outcome(&formatter, &config.store.bucket, &outcome);
    }

    exit_code_for(&outcome)
}

fn print_outcome(formatter: &Formatter, bucket: &str, outcome: &TransferOutcome) {
    let target = format!("{bucket}/{}", outcome.target_name());
    match outcome.status() {
        OutcomeStatus::Succeeded => {
            formatter.success(&format!(
                "Uploaded {} -> {} ({}, {})",
                formatter.style_source(&outcome.source_path().display().to_string()),
                formatter.style_target(&target),
                formatter.style_bytes(outcome.bytes_transferred()),
                formatter.style_detail(&format!("{:.1?}", outcome.duration())),
            ));
            if outcome.integrity() == Integrity::Mismatch {
                formatter.warning(&format!(
                    "Stored checksum for {target} does not match the local file"
                ));
            }
        }
        OutcomeStatus::Skipped => {
            let reason = match outcome.skip_reason() {
                Some(SkipReason::AlreadyExists) => "already exists (use --overwrite to replace)",
                Some(SkipReason::Cancelled) => "cancelled",
                Some(SkipReason::DuplicateTarget) => "duplicate target name",
                None => "skipped",
            };
            formatter.skipped(&format!("{}: {reason}", formatter.style_target(&target)));
        }
        OutcomeStatus::Failed => {
            formatter.error(&format!(
                "Failed to upload {}: {} (after {} attempt(s))",
                outcome.source_path().display(),
                outcome.error_message().unwrap_or("unknown error"),
                outcome.attempts(),
            ));
        }
    }
}

fn exit_code_for(outcome: &TransferOutcome) -> ExitCode {
    match outcome.status() {
        OutcomeStatus::Succeeded => ExitCode::Success,
        OutcomeStatus::Skipped if outcome.skip_reason() == Some(SkipReason::Cancelled) => {
            ExitCode::Interrupted
        }
        OutcomeStatus::Skipped => ExitCode::Success,
        OutcomeStatus::Failed => {
            ExitCode::from_error_kind(outcome.error_kind().unwrap_or(ErrorKind::Unknown))
        }
    }
}
