//! Error types for bulkup-core
//!
//! Only configuration and invocation problems surface as [`Error`]. Per-file
//! failures are captured as outcomes and never abort a batch.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Result type alias for bulkup-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort an operation before or instead of scheduling
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid worker, retry, pattern or store settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// Path is missing or of the wrong type
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Local I/O failure outside of a single transfer
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file could not be parsed
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// A subtree that could not be read during a directory scan
///
/// Recorded and reported; the rest of the tree is still scanned.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[error("cannot read {}: {message}", .path.display())]
pub struct ScanError {
    /// Directory or entry that failed
    pub path: PathBuf,
    /// Underlying error message
    pub message: String,
}

impl ScanError {
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}
