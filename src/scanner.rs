//! Directory scanning
//!
//! [`DirectoryScanner`] walks a root directory and yields every regular file
//! beneath it, split into the directory relative to the root and the file
//! name. Directories are traversed but never yielded themselves.
//!
//! Relative directories always use `/` as separator and are empty for
//! files directly under the root, so the same tree produces the same keys
//! on every platform.
//!
//! ## Filtering
//!
//! - **Ignore patterns**: glob patterns matched against the path relative to
//!   the root (`*.log`, `target/**`). A directory matching a pattern is not
//!   descended into.
//! - **Size limit**: files above `max_file_size` are skipped (0 = unlimited).
//! - **Symbolic links**: not followed by default, and a link is not a regular
//!   file, so unfollowed links are skipped.
//! - **Excluded paths**: exact absolute paths to leave out, used to keep the
//!   store's own database out of snapshots of the directory it lives in.
//!
//! ## Example
//!
//! ```rust,no_run
//! use cairn::scanner::DirectoryScanner;
//! use std::path::Path;
//!
//! # fn main() -> cairn::Result<()> {
//! let scanner = DirectoryScanner::new().with_ignore_patterns(&["*.tmp".to_string()])?;
//! let scan = scanner.scan(Path::new("./project"))?;
//! for file in &scan.files {
//!     println!("{} ({} bytes)", file.path_key(), file.size);
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::{CairnError, Result};
use crate::types::{path_key, FileFailure};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, instrument, trace, warn};
use walkdir::WalkDir;

/// A regular file found under the scanned root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    /// Directory relative to the root, `/`-separated, empty at the root
    pub relative_dir: String,
    /// File name
    pub filename: String,
    /// Path usable for reading the file
    pub absolute_path: PathBuf,
    /// Size reported by the filesystem at scan time
    pub size: u64,
}

impl ScannedFile {
    /// Key used to match against recorded state
    pub fn path_key(&self) -> String {
        path_key(&self.relative_dir, &self.filename)
    }
}

/// Output of one scan
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Regular files, sorted by path key
    pub files: Vec<ScannedFile>,
    /// Entries that could not be examined
    pub failures: Vec<FileFailure>,
}

/// Recursive enumerator of regular files
#[derive(Debug, Clone)]
pub struct DirectoryScanner {
    ignore: GlobSet,
    max_file_size: u64,
    follow_symlinks: bool,
    excluded: HashSet<PathBuf>,
}

impl Default for DirectoryScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectoryScanner {
    /// Scanner with no ignore patterns, no size limit and no symlink following
    pub fn new() -> Self {
        Self {
            ignore: GlobSet::empty(),
            max_file_size: 0,
            follow_symlinks: false,
            excluded: HashSet::new(),
        }
    }

    /// Set glob patterns to exclude
    ///
    /// # Errors
    ///
    /// Returns [`CairnError::InvalidPattern`] if any pattern fails to parse.
    pub fn with_ignore_patterns(mut self, patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(Glob::new(pattern.trim_end_matches('/'))?);
        }
        self.ignore = builder.build()?;
        Ok(self)
    }

    /// Skip files larger than `size` bytes (0 = unlimited)
    pub fn with_max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = size;
        self
    }

    /// Follow symbolic links while walking
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Leave out these exact paths
    ///
    /// Paths that do not exist yet are resolved through their parent
    /// directory, so files created later (such as SQLite `-wal` files) still
    /// match.
    pub fn with_excluded_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        for path in paths {
            self.excluded.insert(resolve(path.as_ref()));
        }
        self
    }

    /// Enumerate every regular file under `root`
    ///
    /// Entries that cannot be read (permission denied on a subdirectory,
    /// non-UTF-8 names) are reported in [`ScanResult::failures`] and the walk
    /// continues.
    ///
    /// # Errors
    ///
    /// Returns [`CairnError::DirectoryNotFound`] if `root` does not exist or
    /// is not a directory.
    #[instrument(skip(self))]
    pub fn scan(&self, root: &Path) -> Result<ScanResult> {
        if !root.is_dir() {
            return Err(CairnError::DirectoryNotFound(root.to_path_buf()));
        }
        let canonical_root = root
            .canonicalize()
            .map_err(|_| CairnError::DirectoryNotFound(root.to_path_buf()))?;

        let mut result = ScanResult::default();

        let walker = WalkDir::new(root)
            .follow_links(self.follow_symlinks)
            .into_iter()
            .filter_entry(|entry| {
                // Never prune the root itself
                if entry.depth() == 0 {
                    return true;
                }
                match entry.path().strip_prefix(root) {
                    Ok(rel) => !self.ignore.is_match(rel),
                    Err(_) => true,
                }
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                    warn!("Skipping unreadable entry {:?}: {}", path, e);
                    result.failures.push(FileFailure::new(path, e));
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let rel = match path.strip_prefix(root) {
                Ok(rel) => rel,
                Err(_) => continue,
            };

            if !self.excluded.is_empty() && self.excluded.contains(&canonical_root.join(rel)) {
                debug!("Excluding {:?}", path);
                continue;
            }

            let (relative_dir, filename) = match split_relative(rel) {
                Some(parts) => parts,
                None => {
                    warn!("Skipping {:?}: name is not valid UTF-8", path);
                    result
                        .failures
                        .push(FileFailure::new(path, "file name is not valid UTF-8"));
                    continue;
                }
            };

            let size = match entry.metadata() {
                Ok(metadata) => metadata.len(),
                Err(e) => {
                    warn!("Skipping {:?}: {}", path, e);
                    result.failures.push(FileFailure::new(path, e));
                    continue;
                }
            };

            if self.max_file_size > 0 && size > self.max_file_size {
                debug!("Skipping {:?}: {} bytes exceeds size limit", path, size);
                continue;
            }

            trace!("Found {:?}", rel);
            result.files.push(ScannedFile {
                relative_dir,
                filename,
                absolute_path: path.to_path_buf(),
                size,
            });
        }

        result.files.sort_by_key(|f| f.path_key());
        debug!(
            "Scanned {:?}: {} files, {} failures",
            root,
            result.files.len(),
            result.failures.len()
        );
        Ok(result)
    }
}

/// Canonical form of `path`, falling back to its canonical parent
fn resolve(path: &Path) -> PathBuf {
    if let Ok(resolved) = path.canonicalize() {
        return resolved;
    }
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    match (parent.canonicalize(), path.file_name()) {
        (Ok(parent), Some(name)) => parent.join(name),
        _ => path.to_path_buf(),
    }
}

/// Split a root-relative file path into (`/`-joined directory, file name)
fn split_relative(rel: &Path) -> Option<(String, String)> {
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }
    let filename = parts.pop()?.to_string();
    Some((parts.join("/"), filename))
}
