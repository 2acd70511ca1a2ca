//! Directory scanning for upload
//!
//! Walks a directory depth-first in lexicographic order and yields the
//! regular files that pass the pattern and size filters. Relative paths use
//! `/` as separator on every platform so remote names are deterministic.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::ScanError;
use crate::matcher::PathMatcher;

/// A file discovered during traversal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadCandidate {
    pub local_path: PathBuf,
    /// Path below the scan root, `/`-separated
    pub relative_path: String,
    pub size_bytes: u64,
}

/// Start a scan of `root`
///
/// The returned iterator is lazy and finite; scanning again means calling
/// this function again. Unreadable subtrees are yielded as `Err` and skipped
/// while the rest of the tree is still visited. Symbolic links are never
/// followed, and files larger than `max_size` are left out.
pub fn scan(root: impl AsRef<Path>, matcher: PathMatcher, max_size: Option<u64>) -> Scan {
    let root = root.as_ref().to_path_buf();
    let walker = WalkDir::new(&root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    Scan {
        root,
        walker,
        matcher,
        max_size,
    }
}

/// Lazy iterator over upload candidates
pub struct Scan {
    root: PathBuf,
    walker: walkdir::IntoIter,
    matcher: PathMatcher,
    max_size: Option<u64>,
}

impl Scan {
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Iterator for Scan {
    type Item = Result<UploadCandidate, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.root.clone());
                    tracing::warn!(path = %path.display(), error = %err, "Skipping unreadable entry");
                    return Some(Err(ScanError::new(path, err.to_string())));
                }
            };

            if entry.depth() == 0 {
                continue;
            }

            let file_type = entry.file_type();
            let Some(relative_path) = relative_path(&self.root, entry.path()) else {
                // A lossy name could collide with another target
                if file_type.is_dir() {
                    self.walker.skip_current_dir();
                }
                tracing::warn!(
                    path = %entry.path().display(),
                    "Skipping entry whose name is not valid UTF-8"
                );
                return Some(Err(ScanError::new(
                    entry.path(),
                    "name is not valid UTF-8",
                )));
            };

            if file_type.is_dir() {
                if self.matcher.is_excluded(&relative_path) {
                    tracing::debug!(dir = %relative_path, "Pruning excluded directory");
                    self.walker.skip_current_dir();
                }
                continue;
            }

            if !file_type.is_file() || !self.matcher.is_match(&relative_path) {
                continue;
            }

            let size_bytes = match entry.metadata() {
                Ok(metadata) => metadata.len(),
                Err(err) => {
                    return Some(Err(ScanError::new(entry.path(), err.to_string())));
                }
            };

            if let Some(max) = self.max_size
                && size_bytes > max
            {
                tracing::warn!(
                    file = %relative_path,
                    size = size_bytes,
                    max_size = max,
                    "File too large, skipping"
                );
                continue;
            }

            return Some(Ok(UploadCandidate {
                local_path: entry.into_path(),
                relative_path,
                size_bytes,
            }));
        }
    }
}

/// Forward-slash path relative to `root`, or `None` if any segment is not UTF-8
fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()
        .map(|segments| segments.join("/"))
}
