//! Metadata store contract
//!
//! The engines never talk to a database directly. Everything they persist
//! goes through [`MetadataStore`], which models three collections:
//!
//! - **Content blobs**, keyed by content hash. At most one blob exists per
//!   hash; blobs are never mutated, only referenced or reclaimed.
//! - **Snapshots**, keyed by an increasing id and carrying a timestamp.
//! - **File records**, keyed by (relative path, filename, snapshot id) and
//!   referencing one blob each.
//!
//! [`SqliteStore`] is the relational implementation shipped with the crate.
//!
//! ## Hash algorithm
//!
//! Content lookup is only meaningful when every blob in a store was hashed
//! with the same algorithm. Implementations record the algorithm on first use
//! and [`MetadataStore::ensure_hash_algorithm`] rejects any other.

pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::digest::HashAlgorithm;
use crate::error::Result;
use crate::types::{
    BlobId, ContentHash, DeletedSnapshots, FileRecord, ReclaimStats, RecordedState, Snapshot,
    SnapshotId, StoreStats,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;

/// Result of [`MetadataStore::create_content_if_absent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredContent {
    /// Blob holding the content
    pub blob_id: BlobId,
    /// Whether this call inserted the blob, false if it already existed
    pub created: bool,
}

/// Persistence backend used by the snapshot, restore and prune engines
///
/// Implementations must be safe to call concurrently from many tasks.
#[async_trait]
pub trait MetadataStore: Send + Sync + fmt::Debug {
    /// Look up the blob holding content with this hash
    async fn find_content_by_hash(&self, hash: &ContentHash) -> Result<Option<BlobId>>;

    /// Insert content unless a blob with this hash already exists
    ///
    /// Must be a single atomic operation: two concurrent calls with the same
    /// new hash converge on one blob, the second acting as a lookup.
    async fn create_content_if_absent(&self, hash: &ContentHash, bytes: &[u8])
        -> Result<StoredContent>;

    /// Raw bytes of a blob
    async fn load_content(&self, blob: BlobId) -> Result<Vec<u8>>;

    /// Bind a path to a blob within a snapshot
    ///
    /// Idempotent: writing the same (path, filename, snapshot) again replaces
    /// the blob reference instead of adding a row.
    async fn upsert_file_record(
        &self,
        relative_path: &str,
        filename: &str,
        snapshot: SnapshotId,
        blob: BlobId,
    ) -> Result<()>;

    /// Create a snapshot at `timestamp` and return its id
    async fn create_snapshot(&self, timestamp: DateTime<Utc>) -> Result<SnapshotId>;

    /// Fetch one snapshot, `None` if it does not exist
    async fn get_snapshot(&self, id: SnapshotId) -> Result<Option<Snapshot>>;

    /// Every file record of a snapshot, ordered by path
    async fn list_file_records(&self, id: SnapshotId) -> Result<Vec<FileRecord>>;

    /// Path key to hash, taken from each path's most recent snapshot
    ///
    /// When a path appears in several snapshots the highest snapshot id wins.
    async fn latest_recorded_state(&self) -> Result<RecordedState>;

    /// Delete a snapshot and its file records
    async fn delete_snapshot(&self, id: SnapshotId) -> Result<DeletedSnapshots>;

    /// Delete every snapshot strictly older than `cutoff`, with its file records
    async fn delete_snapshots_older_than(&self, cutoff: DateTime<Utc>) -> Result<DeletedSnapshots>;

    /// Delete blobs no file record references
    async fn reclaim_orphan_content(&self) -> Result<ReclaimStats>;

    /// All snapshots, most recent first
    async fn list_snapshots(&self) -> Result<Vec<Snapshot>>;

    /// Total file records across all snapshots
    async fn count_file_records(&self) -> Result<u64>;

    /// Row counts and stored bytes
    async fn stats(&self) -> Result<StoreStats>;

    /// Record `algorithm` on first use, or fail if the store uses another
    async fn ensure_hash_algorithm(&self, algorithm: HashAlgorithm) -> Result<()>;

    /// Release backend resources
    async fn close(&self);
}
