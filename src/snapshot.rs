//! Snapshot engine
//!
//! Produces a new, complete, deduplicated snapshot of a directory:
//!
//! 1. Read the recorded state (latest hash per path) from the store
//! 2. Scan the directory and classify every file as new, modified or unchanged
//! 3. Stop without writing anything if nothing is new or modified
//! 4. Create the snapshot and record *every* current file under it, storing
//!    bytes only for content the store does not hold yet
//!
//! Each snapshot lists the whole directory rather than a delta, so any
//! snapshot can be restored on its own.
//!
//! Per-file read failures are logged and skipped. A store failure aborts the
//! snapshot and the partially written snapshot is deleted again.
//!
//! The engine assumes it is the only writer creating snapshots against its
//! store; [`Cairn`](crate::Cairn) serializes calls to guarantee that.

use crate::compare::{ClassifiedFile, FileComparator, FileStatus};
use crate::digest::Digester;
use crate::error::{CairnError, Result};
use crate::scanner::DirectoryScanner;
use crate::store::MetadataStore;
use crate::types::{
    BlobId, FileFailure, SnapshotId, SnapshotOutcome, SnapshotReport,
};
use chrono::{SubsecRound, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, trace, warn};

/// What happened to one file while recording it
#[derive(Debug)]
enum FileOutcome {
    Recorded { created: bool, bytes: u64 },
    Failed(FileFailure),
}

/// Running totals while per-file tasks complete
#[derive(Debug, Default)]
struct Tally {
    recorded: usize,
    blobs_created: usize,
    bytes_stored: u64,
    failures: Vec<FileFailure>,
}

impl Tally {
    fn add(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Recorded { created, bytes } => {
                self.recorded += 1;
                if created {
                    self.blobs_created += 1;
                    self.bytes_stored += bytes;
                }
            }
            FileOutcome::Failed(failure) => self.failures.push(failure),
        }
    }
}

/// Orchestrates scanner, comparator and store into one snapshot
#[derive(Debug, Clone)]
pub struct SnapshotEngine {
    store: Arc<dyn MetadataStore>,
    scanner: DirectoryScanner,
    digester: Digester,
    parallel_workers: usize,
}

impl SnapshotEngine {
    /// Create an engine
    ///
    /// `parallel_workers` bounds how many files are read and stored at once.
    pub fn new(
        store: Arc<dyn MetadataStore>,
        scanner: DirectoryScanner,
        digester: Digester,
        parallel_workers: usize,
    ) -> Self {
        Self {
            store,
            scanner,
            digester,
            parallel_workers: parallel_workers.max(1),
        }
    }

    /// Snapshot the directory at `root`
    ///
    /// # Returns
    ///
    /// - [`SnapshotOutcome::Created`] with statistics when a snapshot was committed
    /// - [`SnapshotOutcome::NoChanges`] when every file matches recorded state
    /// - [`SnapshotOutcome::EmptyDirectory`] when there are no files at all
    /// - [`SnapshotOutcome::NoValidFiles`] when files exist but none could be recorded
    ///
    /// # Errors
    ///
    /// - [`CairnError::DirectoryNotFound`] if `root` is not a directory
    /// - [`CairnError::Store`] if the store fails; no snapshot is left behind
    #[instrument(skip(self), fields(root = %root.display()))]
    pub async fn take_snapshot(&self, root: &Path) -> Result<SnapshotOutcome> {
        let start = Instant::now();
        if !root.is_dir() {
            return Err(CairnError::DirectoryNotFound(root.to_path_buf()));
        }
        info!("Taking snapshot of {:?}", root);

        let recorded = self.store.latest_recorded_state().await?;
        debug!("Recorded state covers {} paths", recorded.len());

        let scanner = self.scanner.clone();
        let scan_root = root.to_path_buf();
        let scan = tokio::task::spawn_blocking(move || scanner.scan(&scan_root)).await??;
        let files_scanned = scan.files.len();

        let comparator = FileComparator::new(self.digester);
        let comparison =
            tokio::task::spawn_blocking(move || comparator.compare(scan.files, &recorded)).await?;

        let files_new = comparison.new.len();
        let files_modified = comparison.modified.len();
        let files_unchanged = comparison.unchanged.len();
        let has_changes = comparison.has_changes();
        let total = comparison.total();

        let (listing, compare_failures) = comparison.into_listing();
        let mut failures = scan.failures;
        failures.extend(compare_failures);

        if total == 0 {
            return Ok(if failures.is_empty() {
                info!("No files found in {:?}", root);
                SnapshotOutcome::EmptyDirectory
            } else {
                warn!("No readable files in {:?}", root);
                SnapshotOutcome::NoValidFiles { failures }
            });
        }
        if !has_changes {
            info!("No changes detected in {:?}", root);
            return Ok(SnapshotOutcome::NoChanges {
                files_scanned,
                failures,
            });
        }

        let timestamp = Utc::now().trunc_subsecs(0);
        let snapshot_id = self.store.create_snapshot(timestamp).await?;
        debug!(
            "Created snapshot {}: {} new, {} modified, {} unchanged",
            snapshot_id, files_new, files_modified, files_unchanged
        );

        let mut tally = match self.record_files(snapshot_id, listing).await {
            Ok(tally) => tally,
            Err(e) => {
                warn!("Snapshot {} aborted: {}", snapshot_id, e);
                if let Err(cleanup) = self.store.delete_snapshot(snapshot_id).await {
                    warn!("Failed to remove aborted snapshot {}: {}", snapshot_id, cleanup);
                }
                match self.store.reclaim_orphan_content().await {
                    Ok(reclaimed) if reclaimed.blobs_deleted > 0 => debug!(
                        "Reclaimed {} blobs left by aborted snapshot {}",
                        reclaimed.blobs_deleted, snapshot_id
                    ),
                    Ok(_) => {}
                    Err(cleanup) => {
                        warn!("Failed to reclaim content of aborted snapshot {}: {}", snapshot_id, cleanup)
                    }
                }
                return Err(e);
            }
        };
        failures.append(&mut tally.failures);

        if tally.recorded == 0 {
            warn!("No files recorded for snapshot {}, discarding it", snapshot_id);
            self.store.delete_snapshot(snapshot_id).await?;
            return Ok(SnapshotOutcome::NoValidFiles { failures });
        }

        let snapshot = self
            .store
            .get_snapshot(snapshot_id)
            .await?
            .ok_or_else(|| CairnError::internal(format!("snapshot {} vanished", snapshot_id)))?;

        let report = SnapshotReport {
            snapshot,
            files_recorded: tally.recorded,
            files_new,
            files_modified,
            files_unchanged,
            blobs_created: tally.blobs_created,
            bytes_stored: tally.bytes_stored,
            failures,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Snapshot {} committed: {} files, {} new blobs in {}ms",
            snapshot_id, report.files_recorded, report.blobs_created, report.duration_ms
        );
        Ok(SnapshotOutcome::Created(report))
    }

    /// Record every listed file under `snapshot_id`, at most `parallel_workers` at a time
    async fn record_files(&self, snapshot_id: SnapshotId, listing: Vec<ClassifiedFile>) -> Result<Tally> {
        let semaphore = Arc::new(Semaphore::new(self.parallel_workers));
        let mut tasks = JoinSet::new();
        let mut tally = Tally::default();

        for file in listing {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| CairnError::internal(format!("worker pool closed: {}", e)))?;
            let store = Arc::clone(&self.store);
            let digester = self.digester;

            tasks.spawn(async move {
                let _permit = permit;
                record_file(store.as_ref(), digester, snapshot_id, file).await
            });

            // Surface store failures without waiting for the whole listing
            while let Some(joined) = tasks.try_join_next() {
                match joined? {
                    Ok(outcome) => tally.add(outcome),
                    Err(e) => {
                        tasks.shutdown().await;
                        return Err(e);
                    }
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            match joined? {
                Ok(outcome) => tally.add(outcome),
                Err(e) => {
                    tasks.shutdown().await;
                    return Err(e);
                }
            }
        }

        Ok(tally)
    }
}

/// Resolve one file to a blob and bind it into the snapshot
///
/// Read failures become [`FileOutcome::Failed`]; store failures are errors.
async fn record_file(
    store: &dyn MetadataStore,
    digester: Digester,
    snapshot_id: SnapshotId,
    file: ClassifiedFile,
) -> Result<FileOutcome> {
    let path = &file.file.absolute_path;

    let known = match file.status {
        FileStatus::Unchanged => store.find_content_by_hash(&file.hash).await?,
        FileStatus::New | FileStatus::Modified => None,
    };

    let (blob_id, created, bytes): (BlobId, bool, u64) = match known {
        Some(blob_id) => (blob_id, false, 0),
        None => {
            let content = match tokio::fs::read(path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!("Skipping {:?}: {}", path, e);
                    return Ok(FileOutcome::Failed(FileFailure::new(path, e)));
                }
            };
            // Hash what was actually read; the file may have changed since comparison
            let (content, hash) = tokio::task::spawn_blocking(move || {
                let hash = digester.digest_bytes(&content);
                (content, hash)
            })
            .await?;
            if hash != file.hash {
                debug!("{:?} changed while snapshotting", path);
            }
            let stored = store.create_content_if_absent(&hash, &content).await?;
            (stored.blob_id, stored.created, content.len() as u64)
        }
    };

    store
        .upsert_file_record(&file.file.relative_dir, &file.file.filename, snapshot_id, blob_id)
        .await?;
    trace!("Recorded {} -> blob {}", file.file.path_key(), blob_id);

    Ok(FileOutcome::Recorded { created, bytes })
}
