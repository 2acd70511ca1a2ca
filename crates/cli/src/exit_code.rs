//! Process exit codes
//!
//! Scripts rely on these values, so they must stay stable.

use bulkup_core::{AggregateResult, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    /// Unexpected failure, or every file in a batch failed
    GeneralError = 1,
    /// Bad arguments or configuration
    UsageError = 2,
    /// Store unreachable or failing after retries
    NetworkError = 3,
    /// Credentials rejected or access denied
    AuthError = 4,
    /// Local path does not exist
    NotFound = 5,
    /// Some files uploaded, some failed
    PartialFailure = 6,
    /// Run cancelled with Ctrl-C
    Interrupted = 130,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_i32(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1 => Some(Self::GeneralError),
            2 => Some(Self::UsageError),
            3 => Some(Self::NetworkError),
            4 => Some(Self::AuthError),
            5 => Some(Self::NotFound),
            6 => Some(Self::PartialFailure),
            130 => Some(Self::Interrupted),
            _ => None,
        }
    }

    /// Exit code for a single failed transfer
    pub fn from_error_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Authentication | ErrorKind::PermissionDenied => Self::AuthError,
            ErrorKind::Transient | ErrorKind::RateLimited | ErrorKind::Timeout => {
                Self::NetworkError
            }
            ErrorKind::InvalidArgument => Self::UsageError,
            ErrorKind::Cancelled => Self::Interrupted,
            ErrorKind::AlreadyExists | ErrorKind::Io | ErrorKind::Unknown => Self::GeneralError,
        }
    }

    /// Exit code for a finished directory upload
    ///
    /// When every failure in a failed batch shares one class, that class
    /// decides the code.
    pub fn for_batch(result: &AggregateResult, interrupted: bool) -> Self {
        if interrupted {
            return Self::Interrupted;
        }
        if result.failed == 0 {
            return Self::Success;
        }
        if !result.is_batch_failure() {
            return Self::PartialFailure;
        }

        let mut codes = result
            .failures()
            .filter_map(|o| o.error_kind())
            .map(Self::from_error_kind);
        match codes.next() {
            Some(first) if codes.all(|c| c == first) => first,
            _ => Self::GeneralError,
        }
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}
