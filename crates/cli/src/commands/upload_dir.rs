//! upload-dir command - Upload a directory tree
//!
//! Scans the directory, uploads eligible files in parallel and prints a
//! summary. Progress is shown on stderr when attached to a terminal.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use bulkup_core::{
    AggregateResult, Error, OutcomeStatus, ProgressCounts, ProgressObserver, SkipReason,
    TransferOutcome, TransferTask, UploadSettings, UploadTreeOptions, plan_tree,
};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use super::{
    StoreArgs, TuningArgs, cancel_on_ctrl_c, connect, load_config, parse_key_value, parse_size,
};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig, format_size};

/// Upload a directory tree
#[derive(Args, Debug)]
pub struct UploadDirArgs {
    /// Local directory to upload
    pub dir: PathBuf,

    /// Prefix for object names
    #[arg(long, default_value = "")]
    pub prefix: String,

    /// Use file names only instead of relative paths
    #[arg(long)]
    pub flatten: bool,

    /// Only upload files matching these patterns (e.g. "*.jpg,*.png")
    #[arg(long, value_delimiter = ',')]
    pub include: Vec<String>,

    /// Skip files and directories matching these patterns (replaces the configured defaults)
    #[arg(long, value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Skip files larger than this (bytes or units like 100M)
    #[arg(long, env = "BULKUP_MAX_FILE_SIZE", value_parser = parse_size)]
    pub max_size: Option<u64>,

    /// Replace existing objects instead of skipping them
    #[arg(long)]
    pub overwrite: bool,

    /// Metadata as key=value attached to every object (repeatable)
    #[arg(short = 'm', long = "metadata", value_parser = parse_key_value)]
    pub metadata: Vec<(String, String)>,

    /// Create the bucket if it does not exist
    #[arg(long)]
    pub create_bucket: bool,

    /// List what would be uploaded without contacting the store
    #[arg(long)]
    pub dry_run: bool,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,

    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub tuning: TuningArgs,
}

impl UploadDirArgs {
    /// Options for the engine; empty pattern lists fall back to configured defaults
    fn tree_options(&self, settings: &UploadSettings) -> UploadTreeOptions {
        let mut options = UploadTreeOptions::from_settings(settings);
        options.target_prefix = self.prefix.clone();
        options.preserve_structure = !self.flatten;
        options.overwrite = self.overwrite;
        options.metadata = self.metadata.iter().cloned().collect::<HashMap<_, _>>();
        if !self.include.is_empty() {
            options.include = self.include.clone();
        }
        if !self.exclude.is_empty() {
            options.exclude = self.exclude.clone();
        }
        if self.max_size.is_some() {
            options.max_size = self.max_size;
        }
        options
    }
}

#[derive(Debug, Serialize)]
struct UploadDirOutput<'a> {
    source: String,
    bucket: &'a str,
    prefix: &'a str,
    interrupted: bool,
    #[serde(flatten)]
    result: &'a AggregateResult,
}

#[derive(Debug, Serialize)]
struct PlannedUpload {
    source: String,
    target_name: String,
    size_bytes: u64,
}

impl From<&TransferTask> for PlannedUpload {
    fn from(task: &TransferTask) -> Self {
        Self {
            source: task.source_path.display().to_string(),
            target_name: task.target_name.clone(),
            size_bytes: task.size_bytes,
        }
    }
}

#[derive(Debug, Serialize)]
struct DryRunOutput {
    source: String,
    files: Vec<PlannedUpload>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    duplicates: Vec<PlannedUpload>,
    total_bytes: u64,
    dry_run: bool,
}

/// Execute the upload-dir command
pub async fn execute(
    args: UploadDirArgs,
    config_path: Option<&Path>,
    output_config: OutputConfig,
) -> ExitCode {
    let formatter = Formatter::new(OutputConfig {
        no_progress: output_config.no_progress || args.no_progress,
        ..output_config
    });

    if !args.dir.exists() {
        formatter.error(&format!("Directory not found: {}", args.dir.display()));
        return ExitCode::NotFound;
    }
    if !args.dir.is_dir() {
        formatter.error(&format!("Not a directory: {}", args.dir.display()));
        return ExitCode::UsageError;
    }

    let (config, _) = match load_config(config_path, &args.store, &args.tuning) {
        Ok(loaded) => loaded,
        Err(e) => {
            formatter.error(&format!("{e:#}"));
            return ExitCode::UsageError;
        }
    };
    let options = args.tree_options(&config.upload);

    if args.dry_run {
        return dry_run(&args.dir, &options, &formatter);
    }

    let uploader = match connect(&config, args.create_bucket, &formatter).await {
        Ok(uploader) => uploader,
        Err(code) => return code,
    };

    let progress = formatter.progress_enabled().then(new_progress_bar);
    let observer = outcome_observer(formatter.clone(), progress.clone());

    let cancel = uploader.cancel_token();
    let interrupt = cancel_on_ctrl_c(cancel.clone(), &formatter);
    let run = uploader
        .upload_tree_with_observer(&args.dir, &options, observer)
        .await;
    interrupt.abort();

    if let Some(pb) = &progress {
        pb.finish_and_clear();
    }

    let result = match run {
        Ok(result) => result,
        Err(e) => {
            formatter.error(&e.to_string());
            return match e {
                Error::InvalidPath(_) => ExitCode::NotFound,
                Error::Config(_) => ExitCode::UsageError,
                _ => ExitCode::GeneralError,
            };
        }
    };
    let interrupted = cancel.is_cancelled();

    if formatter.is_json() {
        formatter.json(&UploadDirOutput {
            source: args.dir.display().to_string(),
            bucket: &config.store.bucket,
            prefix: &args.prefix,
            interrupted,
            result: &result,
        });
    } else {
        print_summary(&formatter, &result, interrupted);
    }

    ExitCode::for_batch(&result, interrupted)
}

fn new_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb.set_message("Uploading...");
    pb
}

/// Report each finished file, either through the progress bar or as plain lines
fn outcome_observer(formatter: Formatter, progress: Option<ProgressBar>) -> ProgressObserver {
    Box::new(move |outcome: &TransferOutcome, counts: &ProgressCounts| {
        let line = outcome_line(&formatter, outcome);
        match &progress {
            Some(pb) => {
                pb.set_length(counts.total as u64);
                pb.set_position(counts.completed as u64);
                pb.set_message(format_size(counts.bytes_transferred));
                if outcome.status() == OutcomeStatus::Failed {
                    pb.println(line);
                }
            }
            None if formatter.is_json() || formatter.is_quiet() => {}
            None => match outcome.status() {
                OutcomeStatus::Failed => eprintln!("{line}"),
                _ => println!("{line}"),
            },
        }
    })
}

fn outcome_line(formatter: &Formatter, outcome: &TransferOutcome) -> String {
    let name = formatter.style_target(outcome.target_name());
    match outcome.status() {
        OutcomeStatus::Succeeded => format!(
            "+ {name} {}",
            formatter.style_detail(&format!("({})", format_size(outcome.bytes_transferred())))
        ),
        OutcomeStatus::Skipped => {
            let reason = match outcome.skip_reason() {
                Some(SkipReason::AlreadyExists) => "exists",
                Some(SkipReason::Cancelled) => "cancelled",
                Some(SkipReason::DuplicateTarget) => "duplicate name",
                None => "skipped",
            };
            format!("- {name} {}", formatter.style_detail(&format!("({reason})")))
        }
        OutcomeStatus::Failed => format!(
            "{} {name}: {}",
            formatter.theme().fail.apply_to("✗"),
            outcome.error_message().unwrap_or("unknown error")
        ),
    }
}

fn print_summary(formatter: &Formatter, result: &AggregateResult, interrupted: bool) {
    for error in &result.scan_errors {
        formatter.warning(&error.to_string());
    }
    if result.integrity_warnings > 0 {
        formatter.warning(&format!(
            "{} upload(s) stored with a checksum that does not match the local file",
            result.integrity_warnings
        ));
    }

    formatter.println("");
    formatter.println(&formatter.style_label("Upload Summary:"));
    formatter.println(&format!("  Total files: {}", result.total));
    formatter.println(&format!("  Successful:  {}", result.successful));
    formatter.println(&format!("  Failed:      {}", result.failed));
    formatter.println(&format!("  Skipped:     {}", result.skipped));
    formatter.println(&format!(
        "  Transferred: {}",
        formatter.style_bytes(result.bytes_transferred)
    ));

    if interrupted {
        formatter.warning("Upload interrupted; remaining files were skipped");
    } else if result.failed > 0 {
        formatter.error(&format!(
            "{} upload(s) failed. Check the log for details.",
            result.failed
        ));
    } else {
        formatter.success("All uploads completed successfully!");
    }
}

fn dry_run(root: &Path, options: &UploadTreeOptions, formatter: &Formatter) -> ExitCode {
    // options already carry the configured size limit
    let plan = match plan_tree(root, options, None) {
        Ok(plan) => plan,
        Err(Error::InvalidPath(msg)) => {
            formatter.error(&msg);
            return ExitCode::NotFound;
        }
        Err(e) => {
            formatter.error(&e.to_string());
            return ExitCode::UsageError;
        }
    };

    for error in &plan.scan_errors {
        formatter.warning(&error.to_string());
    }
    let files: Vec<PlannedUpload> = plan.tasks.iter().map(PlannedUpload::from).collect();
    let duplicates: Vec<PlannedUpload> = plan.duplicates.iter().map(PlannedUpload::from).collect();
    let total_bytes = files.iter().map(|f| f.size_bytes).sum();

    if formatter.is_json() {
        formatter.json(&DryRunOutput {
            source: root.display().to_string(),
            files,
            duplicates,
            total_bytes,
            dry_run: true,
        });
        return ExitCode::Success;
    }

    formatter.println("Dry run mode - no changes will be made:");
    formatter.println("");
    for file in &files {
        formatter.println(&format!(
            "  + {} ({})",
            formatter.style_target(&file.target_name),
            format_size(file.size_bytes)
        ));
    }
    for file in &duplicates {
        formatter.println(&format!(
            "  - {} {}",
            formatter.style_target(&file.target_name),
            formatter.style_detail(&format!("(duplicate name, {} skipped)", file.source))
        ));
    }
    formatter.println("");
    formatter.println(&format!(
        "Would upload {} file(s), {}",
        files.len(),
        format_size(total_bytes)
    ));
    ExitCode::Success
}
