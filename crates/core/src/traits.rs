//! Object store collaborator
//!
//! The upload engine never talks to a storage SDK directly. Backends
//! implement [`ObjectStore`] and report failures as a [`StoreError`]
//! carrying an [`ErrorKind`], which drives the retry policy.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::integrity::Digest;

/// Failure classes reported by a store or produced by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network blip or temporary server unavailability
    Transient,
    /// Request throttled by the store
    RateLimited,
    /// Request did not complete in time
    Timeout,
    /// Credentials rejected
    Authentication,
    /// Credentials valid but not allowed
    PermissionDenied,
    /// Request rejected as malformed
    InvalidArgument,
    /// Conditional write found an existing object
    AlreadyExists,
    /// Local file could not be read
    Io,
    /// Run was cancelled before the task could finish
    Cancelled,
    /// Anything the store could not classify
    Unknown,
}

impl ErrorKind {
    /// Whether another attempt may succeed
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Transient | ErrorKind::RateLimited | ErrorKind::Timeout
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Transient => "transient",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Authentication => "authentication",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::Io => "io",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure from a store call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct StoreError {
    pub kind: ErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// One object write
///
/// The store streams the body from `source`; the engine does not buffer
/// file contents.
#[derive(Debug, Clone, Copy)]
pub struct PutRequest<'a> {
    /// Remote object name
    pub name: &'a str,
    /// Local file to stream
    pub source: &'a Path,
    /// Size of `source` in bytes at scheduling time
    pub size: u64,
    pub metadata: &'a HashMap<String, String>,
    pub content_type: &'a str,
    /// When false the store must not replace an existing object
    pub overwrite: bool,
    /// Read buffer hint for streaming the body
    pub chunk_size: usize,
}

/// What the store reports back for a successful write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutReceipt {
    /// Digest of the bytes as the store received them, if it computes one
    pub remote_digest: Option<Digest>,
}

/// Storage backend used by the upload engine
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Check whether an object with this name already exists
    async fn exists(&self, name: &str) -> Result<bool, StoreError>;

    /// Write one object
    async fn put(&self, request: PutRequest<'_>) -> Result<PutReceipt, StoreError>;
}
