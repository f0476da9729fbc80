//! Core data types used throughout the Cairn library
//!
//! This module contains the data model shared by the engines and the store:
//!
//! - **Identifiers**: [`SnapshotId`], [`BlobId`], [`ContentHash`]
//! - **Records**: [`Snapshot`], [`FileRecord`], [`RecordedState`]
//! - **Outcomes**: [`SnapshotOutcome`], [`RestoreOutcome`], [`PruneOutcome`]
//!   and the reports they carry
//!
//! ## Examples
//!
//! ```rust
//! use cairn::types::{path_key, SnapshotId};
//!
//! let id: SnapshotId = "42".parse().unwrap();
//! assert_eq!(id.get(), 42);
//! assert!("-1".parse::<SnapshotId>().is_err());
//!
//! assert_eq!(path_key("docs/notes", "a.txt"), "docs/notes/a.txt");
//! assert_eq!(path_key("", "a.txt"), "/a.txt");
//! ```

use crate::error::CairnError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Display format for snapshot timestamps and prune cutoffs
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Identifier of a snapshot, assigned by the store
///
/// Always a positive integer. Parsing rejects anything else with
/// [`CairnError::InvalidSnapshotId`] so malformed input never reaches the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(i64);

impl SnapshotId {
    /// Wrap a raw id, returning `None` unless it is positive
    pub fn new(raw: i64) -> Option<Self> {
        (raw > 0).then_some(Self(raw))
    }

    /// Raw integer value
    pub fn get(self) -> i64 {
        self.0
    }
}

impl FromStr for SnapshotId {
    type Err = CairnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        // Only plain ASCII digits: no sign, no whitespace inside, no exponent
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CairnError::InvalidSnapshotId(s.to_string()));
        }
        trimmed
            .parse::<i64>()
            .ok()
            .and_then(SnapshotId::new)
            .ok_or_else(|| CairnError::InvalidSnapshotId(s.to_string()))
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a content blob, assigned by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobId(pub i64);

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hex-encoded content digest
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Wrap an already hex-encoded digest
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Full hex string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 characters, for log lines
    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Build the key used to match a file against recorded state
///
/// The key is `relative_dir + "/" + filename`; root-level files therefore
/// start with a slash.
pub fn path_key(relative_dir: &str, filename: &str) -> String {
    format!("{}/{}", relative_dir, filename)
}

/// Path key to content hash, taken from each path's most recent snapshot
pub type RecordedState = HashMap<String, ContentHash>;

/// A named point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Store-assigned id, increasing with creation order
    pub id: SnapshotId,
    /// Creation time, truncated to whole seconds
    pub timestamp: DateTime<Utc>,
}

impl Snapshot {
    /// Timestamp rendered as `YYYY-MM-DD HH:MM:SS`
    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// One file's membership in one snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Owning snapshot
    pub snapshot_id: SnapshotId,
    /// Directory relative to the scanned root, `/`-separated, empty at the root
    pub relative_path: String,
    /// File name
    pub filename: String,
    /// Content blob holding the bytes
    pub blob_id: BlobId,
    /// Digest of the blob's raw bytes
    pub content_hash: ContentHash,
    /// Raw size in bytes
    pub size: u64,
}

impl FileRecord {
    /// Key matching [`path_key`]
    pub fn path_key(&self) -> String {
        path_key(&self.relative_path, &self.filename)
    }

    /// Relative file path (directory joined with filename)
    pub fn relative_file_path(&self) -> PathBuf {
        let mut path = PathBuf::new();
        for part in self.relative_path.split('/').filter(|p| !p.is_empty()) {
            path.push(part);
        }
        path.push(&self.filename);
        path
    }
}

/// A file that was skipped during snapshot or restore
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    /// Path of the file (absolute for snapshots, relative for restores)
    pub path: PathBuf,
    /// Human readable cause
    pub reason: String,
}

impl FileFailure {
    /// Build a failure from any displayable cause
    pub fn new(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        Self {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Statistics for a committed snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotReport {
    /// The snapshot that was created
    pub snapshot: Snapshot,
    /// File records written
    pub files_recorded: usize,
    /// Files with no recorded state
    pub files_new: usize,
    /// Files whose hash differs from recorded state
    pub files_modified: usize,
    /// Files matching recorded state
    pub files_unchanged: usize,
    /// Content blobs inserted by this snapshot
    pub blobs_created: usize,
    /// Raw bytes of newly inserted blobs
    pub bytes_stored: u64,
    /// Files skipped because they could not be read or stored
    pub failures: Vec<FileFailure>,
    /// Time taken in milliseconds
    pub duration_ms: u64,
}

/// Result of a snapshot request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SnapshotOutcome {
    /// A new snapshot was committed
    Created(SnapshotReport),
    /// Every file matched recorded state; nothing was written
    NoChanges {
        /// Files found in the directory
        files_scanned: usize,
        /// Files that could not be hashed
        failures: Vec<FileFailure>,
    },
    /// The directory holds no regular files
    EmptyDirectory,
    /// Changes were detected but no file could be recorded
    NoValidFiles {
        /// Every per-file failure
        failures: Vec<FileFailure>,
    },
}

impl SnapshotOutcome {
    /// The committed snapshot, if one was created
    pub fn snapshot(&self) -> Option<&Snapshot> {
        match self {
            SnapshotOutcome::Created(report) => Some(&report.snapshot),
            _ => None,
        }
    }
}

/// Statistics for a completed restore
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreResult {
    /// Snapshot that was restored
    pub snapshot_id: SnapshotId,
    /// Directory the files were written to
    pub output_root: PathBuf,
    /// Files written
    pub files_restored: usize,
    /// Bytes written
    pub bytes_written: u64,
    /// Files that could not be written
    pub failures: Vec<FileFailure>,
    /// Time taken in milliseconds
    pub duration_ms: u64,
}

/// Result of a restore request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RestoreOutcome {
    /// Files were written to the output root
    Restored(RestoreResult),
    /// No snapshot with this id exists
    NotFound(SnapshotId),
    /// The snapshot exists but has no file records
    Empty(SnapshotId),
}

/// Rows removed by a snapshot deletion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedSnapshots {
    /// Snapshots removed
    pub snapshots_deleted: u64,
    /// File records removed with them
    pub file_records_deleted: u64,
}

/// Content reclaimed by orphan collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReclaimStats {
    /// Content blobs deleted
    pub blobs_deleted: u64,
    /// Raw bytes those blobs held
    pub bytes_reclaimed: u64,
}

/// Statistics for a completed prune
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PruneReport {
    /// Snapshots and file records removed
    pub deleted: DeletedSnapshots,
    /// Orphaned content reclaimed afterwards
    pub reclaimed: ReclaimStats,
    /// Time taken in milliseconds
    pub duration_ms: u64,
}

/// Result of a prune-by-id request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PruneOutcome {
    /// The snapshot was deleted
    Pruned(PruneReport),
    /// No snapshot with this id exists
    NotFound(SnapshotId),
}

/// Row counts across the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Snapshots
    pub snapshots: u64,
    /// File records across all snapshots
    pub file_records: u64,
    /// Distinct content blobs
    pub content_blobs: u64,
    /// Raw bytes held by content blobs
    pub content_bytes: u64,
}
