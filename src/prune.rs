//! Prune and garbage collection
//!
//! Deleting a snapshot removes its file records; any content blob that is
//! no longer referenced by a surviving snapshot is then reclaimed. Deletion
//! is immediate and permanent.

use crate::error::Result;
use crate::store::MetadataStore;
use crate::types::{PruneOutcome, PruneReport, ReclaimStats, SnapshotId};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

/// Deletes snapshots and reclaims orphaned content
#[derive(Debug, Clone)]
pub struct PruneEngine {
    store: Arc<dyn MetadataStore>,
}

impl PruneEngine {
    /// Create an engine over `store`
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// Delete one snapshot, then reclaim orphaned content
    ///
    /// Returns [`PruneOutcome::NotFound`] without touching the store when the
    /// snapshot does not exist.
    #[instrument(skip(self))]
    pub async fn prune_by_id(&self, id: SnapshotId) -> Result<PruneOutcome> {
        let start = Instant::now();
        if self.store.get_snapshot(id).await?.is_none() {
            info!("Snapshot {} not found, nothing to prune", id);
            return Ok(PruneOutcome::NotFound(id));
        }

        let deleted = self.store.delete_snapshot(id).await?;
        let reclaimed = self.store.reclaim_orphan_content().await?;
        let report = PruneReport {
            deleted,
            reclaimed,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Pruned snapshot {}: {} file records, {} blobs reclaimed",
            id, report.deleted.file_records_deleted, report.reclaimed.blobs_deleted
        );
        Ok(PruneOutcome::Pruned(report))
    }

    /// Delete every snapshot strictly older than `cutoff`, then reclaim
    #[instrument(skip(self))]
    pub async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<PruneReport> {
        let start = Instant::now();
        let deleted = self.store.delete_snapshots_older_than(cutoff).await?;
        let reclaimed = self.store.reclaim_orphan_content().await?;
        let report = PruneReport {
            deleted,
            reclaimed,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Pruned {} snapshots older than {}: {} blobs reclaimed",
            report.deleted.snapshots_deleted, cutoff, report.reclaimed.blobs_deleted
        );
        Ok(report)
    }

    /// Reclaim orphaned content without deleting any snapshot
    #[instrument(skip(self))]
    pub async fn collect_garbage(&self) -> Result<ReclaimStats> {
        let reclaimed = self.store.reclaim_orphan_content().await?;
        info!(
            "Garbage collection reclaimed {} blobs ({} bytes)",
            reclaimed.blobs_deleted, reclaimed.bytes_reclaimed
        );
        Ok(reclaimed)
    }
}
