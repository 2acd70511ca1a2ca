//! Include/exclude pattern matching for relative paths
//!
//! Patterns use shell-glob syntax (`*`, `?`, `[...]`). A pattern without a
//! `/` is matched against the last path segment; a pattern with one is
//! matched against the whole forward-slash relative path, and `*` does not
//! cross separators.

use glob::{MatchOptions, Pattern};

use crate::error::{Error, Result};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
struct Rule {
    pattern: Pattern,
    full_path: bool,
}

impl Rule {
    fn parse(raw: &str) -> Result<Self> {
        let pattern = Pattern::new(raw)
            .map_err(|e| Error::Config(format!("invalid pattern '{raw}': {e}")))?;
        Ok(Self {
            pattern,
            full_path: raw.contains('/'),
        })
    }

    fn matches(&self, relative_path: &str) -> bool {
        let subject = if self.full_path {
            relative_path
        } else {
            file_name(relative_path)
        };
        self.pattern.matches_with(subject, MATCH_OPTIONS)
    }
}

fn file_name(relative_path: &str) -> &str {
    relative_path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(relative_path)
}

/// Compiled include and exclude pattern sets
#[derive(Debug, Clone, Default)]
pub struct PathMatcher {
    include: Vec<Rule>,
    exclude: Vec<Rule>,
}

impl PathMatcher {
    /// Compile the pattern lists; an invalid pattern is a configuration error
    pub fn new<I, E>(include: I, exclude: E) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        let include = include
            .into_iter()
            .map(|p| Rule::parse(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let exclude = exclude
            .into_iter()
            .map(|p| Rule::parse(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { include, exclude })
    }

    /// Matcher that accepts everything
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Whether a file at `relative_path` is eligible for upload
    pub fn is_match(&self, relative_path: &str) -> bool {
        let included =
            self.include.is_empty() || self.include.iter().any(|r| r.matches(relative_path));
        included && !self.is_excluded(relative_path)
    }

    /// Whether any exclude pattern matches
    ///
    /// Also used to prune whole directories during a scan.
    pub fn is_excluded(&self, relative_path: &str) -> bool {
        self.exclude.iter().any(|r| r.matches(relative_path))
    }
}

/// One-shot form of [`PathMatcher::is_match`]
pub fn matches(relative_path: &str, include: &[String], exclude: &[String]) -> Result<bool> {
    Ok(PathMatcher::new(include, exclude)?.is_match(relative_path))
}
