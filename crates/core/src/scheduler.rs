//! Bounded worker pool for transfer tasks
//!
//! A fixed number of workers pull tasks from one FIFO queue, so dispatch
//! follows submission order while completion order depends on latency and
//! retries. Each worker records a task's outcome before it takes the next
//! one, and [`UploadScheduler::run`] returns only once every submitted task
//! has an outcome.
//!
//! Cancellation is checked before a worker takes a new task and while it
//! waits between attempts. Calls already sent to the store are allowed to
//! finish. Tasks still queued when the workers stop are recorded as
//! skipped.

use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::UploadSettings;
use crate::error::Result;
use crate::integrity::{self, Digest, Integrity};
use crate::progress::{AggregateResult, ProgressTracker};
use crate::retry::RetryPolicy;
use crate::task::{SkipReason, TransferOutcome, TransferTask};
use crate::traits::{ErrorKind, ObjectStore, PutRequest, StoreError};

/// Metadata key holding the local SHA-256 of the uploaded file
pub const META_FILE_HASH: &str = "file-hash";
/// Metadata key holding the RFC 3339 upload time
pub const META_UPLOAD_TIMESTAMP: &str = "upload-timestamp";

type TaskQueue = Mutex<VecDeque<TransferTask>>;

/// Runs transfer tasks against an [`ObjectStore`] with bounded concurrency
#[derive(Clone)]
pub struct UploadScheduler {
    worker: Arc<Worker>,
    max_workers: usize,
}

impl UploadScheduler {
    /// Build a scheduler; invalid settings are rejected before any task runs
    pub fn new(store: Arc<dyn ObjectStore>, settings: &UploadSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            worker: Arc::new(Worker {
                store,
                policy: settings.retry_policy(),
                chunk_size: settings.chunk_size,
                verify_integrity: settings.verify_integrity,
                cancel: CancellationToken::new(),
            }),
            max_workers: settings.max_workers,
        })
    }

    /// Share an existing cancellation token instead of the scheduler's own
    pub fn with_cancellation(self, cancel: CancellationToken) -> Self {
        let worker = Worker {
            store: self.worker.store.clone(),
            policy: self.worker.policy,
            chunk_size: self.worker.chunk_size,
            verify_integrity: self.worker.verify_integrity,
            cancel,
        };
        Self {
            worker: Arc::new(worker),
            max_workers: self.max_workers,
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.worker.cancel.clone()
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.worker.policy
    }

    /// Run all tasks and return once each has an outcome
    pub async fn run(&self, tasks: Vec<TransferTask>) -> AggregateResult {
        let tracker = Arc::new(ProgressTracker::new(tasks.len()));
        self.run_with_tracker(tasks, tracker).await
    }

    /// Run all tasks, recording into a caller-owned tracker
    ///
    /// The tracker's total must already account for `tasks`; callers may
    /// take snapshots from another task while the run is in progress.
    pub async fn run_with_tracker(
        &self,
        tasks: Vec<TransferTask>,
        tracker: Arc<ProgressTracker>,
    ) -> AggregateResult {
        let submitted = tasks.len();
        let queue: Arc<TaskQueue> = Arc::new(Mutex::new(VecDeque::from(tasks)));

        tracing::debug!(
            tasks = submitted,
            workers = self.max_workers,
            "Starting upload workers"
        );

        let mut workers = JoinSet::new();
        for worker_id in 0..self.max_workers {
            let worker = self.worker.clone();
            let queue = queue.clone();
            let tracker = tracker.clone();
            workers.spawn(async move { worker.run_loop(worker_id, &queue, &tracker).await });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Upload worker terminated abnormally");
            }
        }

        // Only non-empty when the run was cancelled
        let undispatched: Vec<TransferTask> = lock_queue(&queue).drain(..).collect();
        if !undispatched.is_empty() {
            tracing::info!(
                count = undispatched.len(),
                "Run cancelled; skipping undispatched tasks"
            );
        }
        for task in undispatched {
            tracker.record(TransferOutcome::skipped(&task, SkipReason::Cancelled));
        }

        tracker.snapshot()
    }

    /// Process a single task on the calling task
    pub async fn execute(&self, task: TransferTask) -> TransferOutcome {
        if self.worker.cancel.is_cancelled() {
            return TransferOutcome::skipped(&task, SkipReason::Cancelled);
        }
        self.worker.process(task).await
    }
}

struct Worker {
    store: Arc<dyn ObjectStore>,
    policy: RetryPolicy,
    chunk_size: usize,
    verify_integrity: bool,
    cancel: CancellationToken,
}

/// What happens after a failed attempt
enum AfterFailure {
    Retry,
    Stop,
}

impl Worker {
    async fn run_loop(&self, worker_id: usize, queue: &TaskQueue, tracker: &ProgressTracker) {
        loop {
            if self.cancel.is_cancelled() {
                tracing::debug!(worker_id, "Worker stopping after cancellation");
                break;
            }
            let Some(task) = next_task(queue) else {
                break;
            };

            let placeholder = TransferTask::new(task.source_path.clone(), task.target_name.clone());
            let outcome = match AssertUnwindSafe(self.process(task)).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::error!(
                        worker_id,
                        target_name = %placeholder.target_name,
                        "Upload task panicked"
                    );
                    TransferOutcome::failed(&placeholder, ErrorKind::Unknown, "upload task panicked")
                }
            };
            tracker.record(outcome);
        }
    }

    async fn process(&self, mut task: TransferTask) -> TransferOutcome {
        let started = Instant::now();

        let stat = tokio::fs::metadata(&task.source_path).await;
        let size = match stat {
            Ok(meta) if meta.is_file() => meta.len(),
            Ok(_) => {
                task.fail(ErrorKind::InvalidArgument);
                return self.finish(&task, 0, None, Some("not a regular file".to_string()), started);
            }
            Err(e) => {
                task.fail(ErrorKind::Io);
                return self.finish(&task, 0, None, Some(e.to_string()), started);
            }
        };

        let local_digest = if self.verify_integrity {
            let digest = integrity::digest_file(&task.source_path).await;
            match digest {
                Ok(digest) => Some(digest),
                Err(e) => {
                    tracing::warn!(
                        file = %task.source_path.display(),
                        error = %e,
                        "Failed to calculate file hash"
                    );
                    task.fail(ErrorKind::Io);
                    return self.finish(&task, 0, None, Some(e.to_string()), started);
                }
            }
        } else {
            None
        };

        let metadata = request_metadata(&task.metadata, local_digest.as_ref());
        let mime = content_type(&task.source_path);

        loop {
            if let Some(outcome) = self.stop_if_cancelled(&mut task, started) {
                return outcome;
            }
            let attempt = task.current_attempt();
            task.begin_attempt();

            if !task.overwrite {
                let exists = self.store.exists(&task.target_name).await;
                match exists {
                    Ok(true) => {
                        tracing::info!(target_name = %task.target_name, "Object exists, skipping");
                        task.skip(SkipReason::AlreadyExists);
                        return self.finish(&task, 0, None, None, started);
                    }
                    Ok(false) => {}
                    Err(err) => match self.after_failure(&mut task, attempt, &err).await {
                        AfterFailure::Retry => continue,
                        AfterFailure::Stop => {
                            return self.finish(&task, 0, None, Some(err.message), started);
                        }
                    },
                }
            }

            // The pre-check can take long enough for a cancel to arrive
            if let Some(outcome) = self.stop_if_cancelled(&mut task, started) {
                return outcome;
            }
            task.start();
            tracing::debug!(
                target_name = %task.target_name,
                attempt,
                size,
                "Uploading {}",
                task.source_path.display()
            );

            let request = PutRequest {
                name: &task.target_name,
                source: &task.source_path,
                size,
                metadata: &metadata,
                content_type: &mime,
                overwrite: task.overwrite,
                chunk_size: self.chunk_size,
            };

            let result = self.store.put(request).await;
            match result {
                Ok(receipt) => {
                    task.succeed();
                    let integrity = if self.verify_integrity {
                        integrity::check(local_digest.as_ref(), receipt.remote_digest.as_ref())
                    } else {
                        Integrity::Unavailable
                    };
                    if integrity == Integrity::Mismatch {
                        tracing::warn!(
                            target_name = %task.target_name,
                            local = %local_digest.as_ref().map(Digest::as_str).unwrap_or_default(),
                            remote = %receipt.remote_digest.as_ref().map(Digest::as_str).unwrap_or_default(),
                            "Upload verification failed: digest mismatch"
                        );
                    }
                    tracing::info!(
                        target_name = %task.target_name,
                        bytes = size,
                        attempts = task.attempt_count(),
                        "Successfully uploaded {}",
                        task.source_path.display()
                    );
                    return self.finish(&task, size, Some(integrity), None, started);
                }
                Err(err) if err.kind == ErrorKind::AlreadyExists && !task.overwrite => {
                    tracing::info!(target_name = %task.target_name, "Object appeared during upload, skipping");
                    task.lose_race();
                    return self.finish(&task, 0, None, None, started);
                }
                Err(err) => match self.after_failure(&mut task, attempt, &err).await {
                    AfterFailure::Retry => continue,
                    AfterFailure::Stop => {
                        return self.finish(&task, 0, None, Some(err.message), started);
                    }
                },
            }
        }
    }

    /// Consult the retry policy and wait out the delay unless cancelled
    async fn after_failure(
        &self,
        task: &mut TransferTask,
        attempt: u32,
        err: &StoreError,
    ) -> AfterFailure {
        tracing::warn!(
            target_name = %task.target_name,
            attempt,
            kind = %err.kind,
            error = %err.message,
            "Upload attempt failed"
        );

        if self.cancel.is_cancelled() {
            task.fail(ErrorKind::Cancelled);
            return AfterFailure::Stop;
        }

        let decision = self.policy.next_decision(attempt, err.kind);
        if !decision.should_retry {
            if err.kind.is_retryable() {
                tracing::error!(
                    target_name = %task.target_name,
                    attempts = attempt,
                    "Giving up after retry limit"
                );
            }
            task.fail(err.kind);
            return AfterFailure::Stop;
        }

        task.requeue();
        tracing::debug!(
            target_name = %task.target_name,
            backoff_ms = decision.delay.as_millis(),
            "Retrying after transient error"
        );

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                task.fail(ErrorKind::Cancelled);
                AfterFailure::Stop
            }
            _ = tokio::time::sleep(decision.delay) => AfterFailure::Retry,
        }
    }

    /// Fail a dispatched task instead of starting another attempt
    fn stop_if_cancelled(
        &self,
        task: &mut TransferTask,
        started: Instant,
    ) -> Option<TransferOutcome> {
        if !self.cancel.is_cancelled() {
            return None;
        }
        tracing::debug!(target_name = %task.target_name, "Cancelled before upload attempt");
        task.fail(ErrorKind::Cancelled);
        Some(self.finish(
            task,
            0,
            None,
            Some("upload cancelled".to_string()),
            started,
        ))
    }

    fn finish(
        &self,
        task: &TransferTask,
        bytes: u64,
        integrity: Option<Integrity>,
        message: Option<String>,
        started: Instant,
    ) -> TransferOutcome {
        TransferOutcome::from_task(
            task,
            bytes,
            integrity.unwrap_or(Integrity::Unavailable),
            message,
            started.elapsed(),
        )
    }
}

fn lock_queue(queue: &TaskQueue) -> std::sync::MutexGuard<'_, VecDeque<TransferTask>> {
    queue.lock().unwrap_or_else(|e| e.into_inner())
}

fn next_task(queue: &TaskQueue) -> Option<TransferTask> {
    lock_queue(queue).pop_front()
}

/// Caller metadata plus the engine's own keys
fn request_metadata(
    user: &HashMap<String, String>,
    digest: Option<&Digest>,
) -> HashMap<String, String> {
    let mut metadata = user.clone();
    if let Some(digest) = digest {
        metadata.insert(META_FILE_HASH.to_string(), digest.to_string());
    }
    metadata.insert(
        META_UPLOAD_TIMESTAMP.to_string(),
        jiff::Timestamp::now().to_string(),
    );
    metadata
}

fn content_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
