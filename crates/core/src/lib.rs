//! bulkup-core: Upload engine for the bulkup client
//!
//! This crate turns a local file or directory tree into a bounded set of
//! parallel, retried, integrity-checked uploads:
//! - Include/exclude pattern matching and directory scanning
//! - Retry policy with exponential backoff and jitter
//! - Streaming SHA-256 digests for upload verification
//! - A bounded worker pool with cancellation and live progress accounting
//!
//! The engine talks to storage only through the [`ObjectStore`] trait, so it
//! stays independent of any specific SDK.

pub mod config;
pub mod error;
pub mod integrity;
pub mod matcher;
pub mod progress;
pub mod retry;
pub mod scanner;
pub mod scheduler;
pub mod task;
pub mod traits;
pub mod uploader;

pub use config::{Config, ConfigManager, StoreSettings, UploadSettings};
pub use error::{Error, Result, ScanError};
pub use integrity::{Digest, Integrity};
pub use matcher::PathMatcher;
pub use progress::{AggregateResult, ProgressCounts, ProgressObserver, ProgressTracker};
pub use retry::{RetryBuilder, RetryDecision, RetryPolicy};
pub use scanner::{Scan, UploadCandidate, scan};
pub use scheduler::UploadScheduler;
pub use task::{OutcomeStatus, SkipReason, TaskState, TransferOutcome, TransferTask};
pub use traits::{ErrorKind, ObjectStore, PutReceipt, PutRequest, StoreError};
pub use uploader::{TreePlan, UploadTreeOptions, Uploader, plan_tree};

/// Re-exported so callers can share a token with the scheduler
pub use tokio_util::sync::CancellationToken;
