//! Terminal and JSON output

mod formatter;

pub use formatter::{Formatter, Theme, format_size};

/// Global output flags shared by every command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputConfig {
    /// Emit one JSON document on stdout instead of human text
    pub json: bool,
    pub no_color: bool,
    /// Suppress everything except errors
    pub quiet: bool,
    /// Hide progress bars even on a terminal
    pub no_progress: bool,
}
