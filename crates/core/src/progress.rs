//! Progress accounting shared by upload workers
//!
//! [`ProgressTracker`] owns the aggregate counters and outcome list behind
//! one short-lived lock. Workers call [`ProgressTracker::record`]; a
//! reporting task may call [`ProgressTracker::snapshot`] at any time.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

use crate::error::ScanError;
use crate::integrity::Integrity;
use crate::task::{OutcomeStatus, TransferOutcome};

/// Counter view passed to observers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressCounts {
    pub total: usize,
    pub completed: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub bytes_transferred: u64,
}

/// Callback invoked after each recorded outcome
///
/// Runs synchronously on the recording worker, so it should return quickly.
/// Panics are caught and logged.
pub type ProgressObserver = Box<dyn Fn(&TransferOutcome, &ProgressCounts) + Send + Sync>;

/// Totals and per-task outcomes of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregateResult {
    /// Number of tasks submitted
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub bytes_transferred: u64,
    /// Successful uploads whose remote digest did not match
    pub integrity_warnings: usize,
    /// In completion order, not submission order
    pub outcomes: Vec<TransferOutcome>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scan_errors: Vec<ScanError>,
}

impl AggregateResult {
    pub fn completed(&self) -> usize {
        self.successful + self.failed + self.skipped
    }

    /// Every submitted task has an outcome
    pub fn is_settled(&self) -> bool {
        self.completed() == self.total
    }

    /// A non-empty batch in which nothing succeeded and something failed
    pub fn is_batch_failure(&self) -> bool {
        self.total > 0 && self.successful == 0 && self.failed > 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &TransferOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status() == OutcomeStatus::Failed)
    }

    fn counts(&self) -> ProgressCounts {
        ProgressCounts {
            total: self.total,
            completed: self.completed(),
            successful: self.successful,
            failed: self.failed,
            skipped: self.skipped,
            bytes_transferred: self.bytes_transferred,
        }
    }
}

/// Thread-safe aggregate of transfer outcomes
pub struct ProgressTracker {
    state: Mutex<AggregateResult>,
    observer: Option<ProgressObserver>,
}

impl ProgressTracker {
    /// Track a run of `total` tasks
    pub fn new(total: usize) -> Self {
        Self {
            state: Mutex::new(AggregateResult {
                total,
                ..Default::default()
            }),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: ProgressObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Count one outcome and notify the observer
    pub fn record(&self, outcome: TransferOutcome) {
        let counts = {
            let mut state = self.lock();
            match outcome.status() {
                OutcomeStatus::Succeeded => state.successful += 1,
                OutcomeStatus::Failed => state.failed += 1,
                OutcomeStatus::Skipped => state.skipped += 1,
            }
            if outcome.integrity() == Integrity::Mismatch {
                state.integrity_warnings += 1;
            }
            state.bytes_transferred += outcome.bytes_transferred();
            state.outcomes.push(outcome.clone());
            state.counts()
        };

        if let Some(observer) = &self.observer
            && catch_unwind(AssertUnwindSafe(|| observer(&outcome, &counts))).is_err()
        {
            tracing::warn!(
                target_name = %outcome.target_name(),
                "Progress observer panicked; ignoring"
            );
        }
    }

    pub fn record_scan_error(&self, error: ScanError) {
        self.lock().scan_errors.push(error);
    }

    /// Point-in-time copy of the aggregate
    pub fn snapshot(&self) -> AggregateResult {
        self.lock().clone()
    }

    /// Point-in-time counters without copying outcomes
    pub fn counts(&self) -> ProgressCounts {
        self.lock().counts()
    }

    fn lock(&self) -> MutexGuard<'_, AggregateResult> {
        // A panicking observer runs outside the lock, so poisoning only
        // follows a panic mid-update; the counters are still usable
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("counts", &self.counts())
            .field("observer", &self.observer.is_some())
            .finish()
    }
}
