//! High-level upload entry points
//!
//! [`Uploader`] turns a single file or a directory tree into transfer tasks
//! and runs them through an [`UploadScheduler`].

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::UploadSettings;
use crate::error::{Error, Result, ScanError};
use crate::matcher::PathMatcher;
use crate::progress::{AggregateResult, ProgressObserver, ProgressTracker};
use crate::scanner::scan;
use crate::scheduler::UploadScheduler;
use crate::task::{SkipReason, TransferOutcome, TransferTask};
use crate::traits::{ErrorKind, ObjectStore};

/// Options for [`Uploader::upload_tree`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTreeOptions {
    /// Prepended to every target name, joined with `/`
    pub target_prefix: String,
    /// Keep the directory layout in target names; otherwise use file names only
    pub preserve_structure: bool,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub max_size: Option<u64>,
    pub overwrite: bool,
    /// Attached to every uploaded object
    pub metadata: HashMap<String, String>,
}

impl Default for UploadTreeOptions {
    fn default() -> Self {
        Self {
            target_prefix: String::new(),
            preserve_structure: true,
            include: Vec::new(),
            exclude: Vec::new(),
            max_size: None,
            overwrite: false,
            metadata: HashMap::new(),
        }
    }
}

impl UploadTreeOptions {
    /// Start from the configured default patterns and size limit
    pub fn from_settings(settings: &UploadSettings) -> Self {
        Self {
            include: settings.include.clone(),
            exclude: settings.exclude.clone(),
            max_size: settings.max_file_size,
            ..Default::default()
        }
    }
}

/// Uploads files and directory trees to an [`ObjectStore`]
#[derive(Clone)]
pub struct Uploader {
    scheduler: UploadScheduler,
    settings: UploadSettings,
}

impl Uploader {
    /// Validate settings and build the worker pool configuration
    pub fn new(store: Arc<dyn ObjectStore>, settings: UploadSettings) -> Result<Self> {
        let scheduler = UploadScheduler::new(store, &settings)?;
        Ok(Self {
            scheduler,
            settings,
        })
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.scheduler = self.scheduler.with_cancellation(cancel);
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.scheduler.cancel_token()
    }

    pub fn settings(&self) -> &UploadSettings {
        &self.settings
    }

    /// Upload one file
    ///
    /// `target_name` defaults to the file name.
    pub async fn upload_one(
        &self,
        path: &Path,
        target_name: Option<&str>,
        metadata: HashMap<String, String>,
        overwrite: bool,
    ) -> TransferOutcome {
        let target = match target_name {
            Some(name) => name.to_string(),
            None => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };

        let task = TransferTask::new(path, target)
            .with_metadata(metadata)
            .with_overwrite(overwrite);

        if task.target_name.is_empty() {
            return TransferOutcome::failed(
                &task,
                ErrorKind::InvalidArgument,
                format!("cannot derive a target name from {}", path.display()),
            );
        }

        self.scheduler.execute(task).await
    }

    /// Upload every eligible file under `root`
    pub async fn upload_tree(
        &self,
        root: &Path,
        options: &UploadTreeOptions,
    ) -> Result<AggregateResult> {
        self.upload_tree_inner(root, options, None).await
    }

    /// Like [`upload_tree`](Self::upload_tree), reporting each outcome to `observer`
    pub async fn upload_tree_with_observer(
        &self,
        root: &Path,
        options: &UploadTreeOptions,
        observer: ProgressObserver,
    ) -> Result<AggregateResult> {
        self.upload_tree_inner(root, options, Some(observer)).await
    }

    async fn upload_tree_inner(
        &self,
        root: &Path,
        options: &UploadTreeOptions,
        observer: Option<ProgressObserver>,
    ) -> Result<AggregateResult> {
        let TreePlan {
            tasks,
            duplicates,
            scan_errors,
        } = plan_tree(root, options, self.settings.max_file_size)?;

        tracing::info!(
            files = tasks.len(),
            root = %root.display(),
            "Found files to upload"
        );
        if tasks.is_empty() {
            tracing::warn!("No files found to upload");
        }

        let mut tracker = ProgressTracker::new(tasks.len() + duplicates.len());
        if let Some(observer) = observer {
            tracker = tracker.with_observer(observer);
        }
        let tracker = Arc::new(tracker);

        for error in scan_errors {
            tracker.record_scan_error(error);
        }
        for task in &duplicates {
            tracker.record(TransferOutcome::skipped(task, SkipReason::DuplicateTarget));
        }

        let result = self.scheduler.run_with_tracker(tasks, tracker).await;

        tracing::info!(
            total = result.total,
            successful = result.successful,
            failed = result.failed,
            skipped = result.skipped,
            "Upload complete"
        );

        Ok(result)
    }
}

/// Tasks a directory upload would run, before anything is sent
#[derive(Debug, Default)]
pub struct TreePlan {
    /// One task per eligible file, in scan order
    pub tasks: Vec<TransferTask>,
    /// Later files whose target name an earlier task already owns
    pub duplicates: Vec<TransferTask>,
    pub scan_errors: Vec<ScanError>,
}

/// Scan `root` and build its upload tasks
///
/// `default_max_size` applies when `options.max_size` is `None`. A root
/// that is not a directory is [`Error::InvalidPath`].
pub fn plan_tree(
    root: &Path,
    options: &UploadTreeOptions,
    default_max_size: Option<u64>,
) -> Result<TreePlan> {
    if !root.is_dir() {
        return Err(Error::InvalidPath(format!(
            "directory not found: {}",
            root.display()
        )));
    }

    let matcher = PathMatcher::new(&options.include, &options.exclude)?;
    let max_size = options.max_size.or(default_max_size);

    let mut plan = TreePlan::default();
    let mut seen = HashSet::new();

    for item in scan(root, matcher, max_size) {
        let candidate = match item {
            Ok(candidate) => candidate,
            Err(e) => {
                plan.scan_errors.push(e);
                continue;
            }
        };

        let name = target_name(
            &options.target_prefix,
            &candidate.relative_path,
            options.preserve_structure,
        );
        let task = TransferTask::from_candidate(candidate, name)
            .with_metadata(options.metadata.clone())
            .with_overwrite(options.overwrite);

        if seen.insert(task.target_name.clone()) {
            plan.tasks.push(task);
        } else {
            tracing::warn!(
                target_name = %task.target_name,
                file = %task.source_path.display(),
                "Duplicate target name, skipping"
            );
            plan.duplicates.push(task);
        }
    }

    Ok(plan)
}

/// Remote name for a scanned file
pub fn target_name(prefix: &str, relative_path: &str, preserve_structure: bool) -> String {
    let name = if preserve_structure {
        relative_path
    } else {
        relative_path.rsplit('/').next().unwrap_or(relative_path)
    };

    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}
