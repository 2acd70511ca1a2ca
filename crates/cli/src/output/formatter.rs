//! Output formatter for human-readable and JSON output
//!
//! In JSON mode stdout carries exactly one JSON document per command and
//! nothing else; human messages, warnings and progress go to stderr or are
//! dropped.

use console::{Style, Term};
use serde::Serialize;

use super::OutputConfig;

/// Styles applied to each kind of value in human output
#[derive(Debug, Clone)]
pub struct Theme {
    /// Remote object and bucket names
    pub target: Style,
    /// Local files and directories
    pub source: Style,
    pub bytes: Style,
    /// Summary and table labels
    pub label: Style,
    /// Durations, reasons and other secondary text
    pub detail: Style,
    pub ok: Style,
    pub fail: Style,
    pub warn: Style,
    pub skip: Style,
}

impl Theme {
    pub fn colored() -> Self {
        Self {
            target: Style::new().bold(),
            source: Style::new(),
            bytes: Style::new().green(),
            label: Style::new().cyan(),
            detail: Style::new().dim(),
            ok: Style::new().green(),
            fail: Style::new().red(),
            warn: Style::new().yellow(),
            skip: Style::new().yellow(),
        }
    }

    /// Every role unstyled, for `--no-color` and JSON mode
    pub fn plain() -> Self {
        let none = Style::new();
        Self {
            target: none.clone(),
            source: none.clone(),
            bytes: none.clone(),
            label: none.clone(),
            detail: none.clone(),
            ok: none.clone(),
            fail: none.clone(),
            warn: none.clone(),
            skip: none,
        }
    }
}

/// Formatter for CLI output
#[derive(Debug, Clone)]
pub struct Formatter {
    config: OutputConfig,
    theme: Theme,
}

impl Formatter {
    pub fn new(config: OutputConfig) -> Self {
        let theme = if config.no_color || config.json {
            Theme::plain()
        } else {
            Theme::colored()
        };
        Self { config, theme }
    }

    pub fn is_json(&self) -> bool {
        self.config.json
    }

    pub fn is_quiet(&self) -> bool {
        self.config.quiet
    }

    pub fn colors_enabled(&self) -> bool {
        !self.config.no_color && !self.config.json
    }

    /// Progress bars only make sense for a human watching a terminal
    pub fn progress_enabled(&self) -> bool {
        !self.config.json
            && !self.config.quiet
            && !self.config.no_progress
            && Term::stderr().is_term()
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    pub fn style_target(&self, text: &str) -> String {
        self.theme.target.apply_to(text).to_string()
    }

    pub fn style_source(&self, text: &str) -> String {
        self.theme.source.apply_to(text).to_string()
    }

    pub fn style_bytes(&self, bytes: u64) -> String {
        self.theme.bytes.apply_to(format_size(bytes)).to_string()
    }

    pub fn style_label(&self, text: &str) -> String {
        self.theme.label.apply_to(text).to_string()
    }

    pub fn style_detail(&self, text: &str) -> String {
        self.theme.detail.apply_to(text).to_string()
    }

    /// Print a success line (human mode only)
    pub fn success(&self, message: &str) {
        if self.config.quiet || self.config.json {
            return;
        }
        let checkmark = self.theme.ok.apply_to("✓");
        println!("{checkmark} {message}");
    }

    /// Print a skipped line (human mode only)
    pub fn skipped(&self, message: &str) {
        if self.config.quiet || self.config.json {
            return;
        }
        let marker = self.theme.skip.apply_to("-");
        println!("{marker} {message}");
    }

    /// Errors are always printed, even in quiet mode
    pub fn error(&self, message: &str) {
        if self.config.json {
            let error = serde_json::json!({ "error": message });
            eprintln!(
                "{}",
                serde_json::to_string_pretty(&error).unwrap_or_else(|_| message.to_string())
            );
        } else {
            let cross = self.theme.fail.apply_to("✗");
            eprintln!("{cross} {message}");
        }
    }

    pub fn warning(&self, message: &str) {
        if self.config.quiet || self.config.json {
            return;
        }
        let warn_icon = self.theme.warn.apply_to("⚠");
        eprintln!("{warn_icon} {message}");
    }

    /// Print a JSON document on stdout, regardless of quiet mode
    pub fn json<T: Serialize>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Error serializing output: {e}"),
        }
    }

    /// Print a line of text (respects quiet mode)
    pub fn println(&self, message: &str) {
        if self.config.quiet {
            return;
        }
        println!("{message}");
    }
}

impl Default for Formatter {
    fn default() -> Self {
        Self::new(OutputConfig::default())
    }
}

/// Human-readable byte count
pub fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
