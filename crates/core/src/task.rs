//! Transfer tasks and their outcomes
//!
//! A task moves `Pending -> InFlight -> {Succeeded, Failed, Skipped}`. A
//! failed attempt sends it back to `Pending` with the next attempt number.
//! `Skipped` is normally reached from `Pending` without going in flight;
//! the one exception is a conditional put rejected because the target
//! appeared after the pre-check.
//! Terminal states are final.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::integrity::Integrity;
use crate::scanner::UploadCandidate;
use crate::traits::ErrorKind;

/// Why a task finished without uploading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Target exists and overwrite is off
    AlreadyExists,
    /// Run was cancelled before the task was dispatched
    Cancelled,
    /// Another task in the same run already owns this target name
    DuplicateTarget,
}

/// Lifecycle state of a [`TransferTask`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Waiting for its next attempt (1-indexed)
    Pending { attempt: u32 },
    InFlight { attempt: u32 },
    Succeeded,
    Failed(ErrorKind),
    Skipped(SkipReason),
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed(_) | TaskState::Skipped(_)
        )
    }
}

/// One file to upload to one target name
#[derive(Debug, Clone)]
pub struct TransferTask {
    pub source_path: PathBuf,
    pub target_name: String,
    pub metadata: HashMap<String, String>,
    pub overwrite: bool,
    /// Size recorded when the task was created
    pub size_bytes: u64,
    attempt_count: u32,
    state: TaskState,
}

impl TransferTask {
    pub fn new(source_path: impl Into<PathBuf>, target_name: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            target_name: target_name.into(),
            metadata: HashMap::new(),
            overwrite: false,
            size_bytes: 0,
            attempt_count: 0,
            state: TaskState::Pending { attempt: 1 },
        }
    }

    pub fn from_candidate(candidate: UploadCandidate, target_name: impl Into<String>) -> Self {
        let mut task = Self::new(candidate.local_path, target_name);
        task.size_bytes = candidate.size_bytes;
        task
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = size_bytes;
        self
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Attempts started so far
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Attempt number the task is waiting for or running
    pub fn current_attempt(&self) -> u32 {
        match self.state {
            TaskState::Pending { attempt } | TaskState::InFlight { attempt } => attempt,
            _ => self.attempt_count,
        }
    }

    /// Count the start of an attempt; the pre-check runs before going in flight
    pub fn begin_attempt(&mut self) -> bool {
        match self.state {
            TaskState::Pending { attempt } => {
                self.attempt_count = attempt;
                true
            }
            _ => self.reject("begin_attempt"),
        }
    }

    /// `Pending -> InFlight`
    pub fn start(&mut self) -> bool {
        match self.state {
            TaskState::Pending { attempt } => {
                self.attempt_count = attempt;
                self.state = TaskState::InFlight { attempt };
                true
            }
            _ => self.reject("start"),
        }
    }

    /// Back to `Pending` for the next attempt
    pub fn requeue(&mut self) -> bool {
        match self.state {
            TaskState::Pending { attempt } | TaskState::InFlight { attempt } => {
                self.state = TaskState::Pending {
                    attempt: attempt + 1,
                };
                true
            }
            _ => self.reject("requeue"),
        }
    }

    /// `InFlight -> Succeeded`
    pub fn succeed(&mut self) -> bool {
        match self.state {
            TaskState::InFlight { .. } => {
                self.state = TaskState::Succeeded;
                true
            }
            _ => self.reject("succeed"),
        }
    }

    /// Any non-terminal state to `Failed`
    pub fn fail(&mut self, kind: ErrorKind) -> bool {
        if self.state.is_terminal() {
            return self.reject("fail");
        }
        self.state = TaskState::Failed(kind);
        true
    }

    /// `Pending -> Skipped`
    pub fn skip(&mut self, reason: SkipReason) -> bool {
        match self.state {
            TaskState::Pending { .. } => {
                self.state = TaskState::Skipped(reason);
                true
            }
            _ => self.reject("skip"),
        }
    }

    /// `InFlight -> Skipped(AlreadyExists)` when the store refuses to replace
    /// an object that appeared during the attempt
    pub fn lose_race(&mut self) -> bool {
        match self.state {
            TaskState::InFlight { .. } => {
                self.state = TaskState::Skipped(SkipReason::AlreadyExists);
                true
            }
            _ => self.reject("lose_race"),
        }
    }

    fn reject(&self, transition: &str) -> bool {
        tracing::error!(
            target_name = %self.target_name,
            state = ?self.state,
            transition,
            "Invalid task state transition"
        );
        false
    }
}

/// Terminal status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Succeeded,
    Failed,
    Skipped,
}

/// Immutable record of how a task ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferOutcome {
    target_name: String,
    source_path: PathBuf,
    status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    skip_reason: Option<SkipReason>,
    bytes_transferred: u64,
    attempts: u32,
    integrity: Integrity,
    #[serde(skip)]
    duration: Duration,
}

impl TransferOutcome {
    /// Build the outcome for a task that reached a terminal state
    pub(crate) fn from_task(
        task: &TransferTask,
        bytes_transferred: u64,
        integrity: Integrity,
        error_message: Option<String>,
        duration: Duration,
    ) -> Self {
        let (status, error_kind, skip_reason) = match task.state() {
            TaskState::Succeeded => (OutcomeStatus::Succeeded, None, None),
            TaskState::Skipped(reason) => (OutcomeStatus::Skipped, None, Some(reason)),
            TaskState::Failed(kind) => (OutcomeStatus::Failed, Some(kind), None),
            // Not terminal: only reachable through a bug in the caller
            TaskState::Pending { .. } | TaskState::InFlight { .. } => {
                (OutcomeStatus::Failed, Some(ErrorKind::Unknown), None)
            }
        };

        Self {
            target_name: task.target_name.clone(),
            source_path: task.source_path.clone(),
            status,
            error_kind,
            error_message,
            skip_reason,
            bytes_transferred,
            attempts: task.attempt_count(),
            integrity,
            duration,
        }
    }

    /// Outcome for a task that was never dispatched
    pub fn skipped(task: &TransferTask, reason: SkipReason) -> Self {
        Self {
            target_name: task.target_name.clone(),
            source_path: task.source_path.clone(),
            status: OutcomeStatus::Skipped,
            error_kind: None,
            error_message: None,
            skip_reason: Some(reason),
            bytes_transferred: 0,
            attempts: 0,
            integrity: Integrity::Unavailable,
            duration: Duration::ZERO,
        }
    }

    /// Outcome for a task that failed outside the normal attempt loop
    pub fn failed(task: &TransferTask, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            target_name: task.target_name.clone(),
            source_path: task.source_path.clone(),
            status: OutcomeStatus::Failed,
            error_kind: Some(kind),
            error_message: Some(message.into()),
            skip_reason: None,
            bytes_transferred: 0,
            attempts: task.attempt_count(),
            integrity: Integrity::Unavailable,
            duration: Duration::ZERO,
        }
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn status(&self) -> OutcomeStatus {
        self.status
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        self.skip_reason
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }

    /// Attempts started, including any pre-check
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn integrity(&self) -> Integrity {
        self.integrity
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Succeeded
    }

    /// True only when the store confirmed the local digest
    pub fn digest_verified(&self) -> bool {
        self.integrity == Integrity::Verified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> TransferTask {
        TransferTask::new("/tmp/a.txt", "a.txt")
    }

    #[test]
    fn test_new_task_is_pending() {
        let t = task();
        assert_eq!(t.state(), TaskState::Pending { attempt: 1 });
        assert_eq!(t.attempt_count(), 0);
        assert!(!t.overwrite);
    }

    #[test]
    fn test_success_path() {
        let mut t = task();
        assert!(t.start());
        assert_eq!(t.state(), TaskState::InFlight { attempt: 1 });
        assert!(t.succeed());
        assert_eq!(t.state(), TaskState::Succeeded);
        assert_eq!(t.attempt_count(), 1);
    }

    #[test]
    fn test_retry_path_counts_attempts() {
        let mut t = task();
        t.start();
        assert!(t.requeue());
        assert_eq!(t.state(), TaskState::Pending { attempt: 2 });
        t.start();
        t.requeue();
        t.start();
        assert_eq!(t.state(), TaskState::InFlight { attempt: 3 });
        t.succeed();
        assert_eq!(t.attempt_count(), 3);
    }

    #[test]
    fn test_skip_only_from_pending() {
        let mut t = task();
        assert!(t.skip(SkipReason::AlreadyExists));
        assert_eq!(t.state(), TaskState::Skipped(SkipReason::AlreadyExists));

        let mut t = task();
        t.start();
        assert!(!t.skip(SkipReason::AlreadyExists));
        assert_eq!(t.state(), TaskState::InFlight { attempt: 1 });
    }

    #[test]
    fn test_lost_race_skips_from_in_flight() {
        let mut t = task();
        assert!(!t.lose_race());
        t.start();
        assert!(t.lose_race());
        assert_eq!(t.state(), TaskState::Skipped(SkipReason::AlreadyExists));
        assert_eq!(t.attempt_count(), 1);
        assert!(!t.lose_race());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut t = task();
        t.start();
        t.succeed();
        assert!(!t.fail(ErrorKind::Transient));
        assert!(!t.requeue());
        assert!(!t.start());
        assert!(!t.skip(SkipReason::Cancelled));
        assert_eq!(t.state(), TaskState::Succeeded);

        let mut t = task();
        t.fail(ErrorKind::Authentication);
        assert!(!t.start());
        assert!(!t.succeed());
        assert_eq!(t.state(), TaskState::Failed(ErrorKind::Authentication));
    }

    #[test]
    fn test_succeed_requires_in_flight() {
        let mut t = task();
        assert!(!t.succeed());
        assert_eq!(t.state(), TaskState::Pending { attempt: 1 });
    }

    #[test]
    fn test_outcome_from_failed_task() {
        let mut t = task();
        t.start();
        t.fail(ErrorKind::PermissionDenied);
        let outcome = TransferOutcome::from_task(
            &t,
            0,
            Integrity::Unavailable,
            Some("denied".to_string()),
            Duration::from_millis(5),
        );
        assert_eq!(outcome.status(), OutcomeStatus::Failed);
        assert_eq!(outcome.error_kind(), Some(ErrorKind::PermissionDenied));
        assert_eq!(outcome.attempts(), 1);
        assert!(!outcome.is_success());
        assert!(!outcome.digest_verified());
    }

    #[test]
    fn test_skipped_outcome_serialization() {
        let outcome = TransferOutcome::skipped(&task(), SkipReason::Cancelled);
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"status\":\"skipped\""));
        assert!(json.contains("\"skip_reason\":\"cancelled\""));
        assert!(!json.contains("error_kind"));
    }
}
