//! Restore engine
//!
//! Rebuilds a directory tree from a single snapshot's file records. Because
//! every snapshot is a complete listing, no other snapshot is consulted.
//!
//! Existing files at a destination path are overwritten; files in the output
//! directory that the snapshot does not list are left alone.

use crate::error::{CairnError, Result};
use crate::store::MetadataStore;
use crate::types::{FileFailure, FileRecord, RestoreOutcome, RestoreResult, SnapshotId};
use std::path::{Component, Path};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, instrument, trace, warn};

/// Writes snapshot contents back to disk
#[derive(Debug, Clone)]
pub struct RestoreEngine {
    store: Arc<dyn MetadataStore>,
    parallel_workers: usize,
}

impl RestoreEngine {
    /// Create an engine writing at most `parallel_workers` files at once
    pub fn new(store: Arc<dyn MetadataStore>, parallel_workers: usize) -> Self {
        Self {
            store,
            parallel_workers: parallel_workers.max(1),
        }
    }

    /// Restore snapshot `id` into `output_root`
    ///
    /// Nothing is written, and `output_root` is not created, when the
    /// snapshot does not exist or has no records.
    ///
    /// # Errors
    ///
    /// - [`CairnError::Io`] if `output_root` cannot be created
    /// - [`CairnError::Store`] if the store fails
    #[instrument(skip(self), fields(output = %output_root.display()))]
    pub async fn restore(&self, id: SnapshotId, output_root: &Path) -> Result<RestoreOutcome> {
        let start = Instant::now();

        let records = self.store.list_file_records(id).await?;
        if records.is_empty() {
            return Ok(match self.store.get_snapshot(id).await? {
                None => {
                    info!("Snapshot {} not found", id);
                    RestoreOutcome::NotFound(id)
                }
                Some(_) => {
                    info!("Snapshot {} has no files", id);
                    RestoreOutcome::Empty(id)
                }
            });
        }

        info!("Restoring {} files from snapshot {} to {:?}", records.len(), id, output_root);
        tokio::fs::create_dir_all(output_root).await?;

        let semaphore = Arc::new(Semaphore::new(self.parallel_workers));
        let mut tasks = JoinSet::new();
        let mut files_restored = 0usize;
        let mut bytes_written = 0u64;
        let mut failures = Vec::new();

        for record in records {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| CairnError::internal(format!("worker pool closed: {}", e)))?;
            let store = Arc::clone(&self.store);
            let output_root = output_root.to_path_buf();

            tasks.spawn(async move {
                let _permit = permit;
                restore_file(store.as_ref(), &output_root, record).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined? {
                Ok(Ok(bytes)) => {
                    files_restored += 1;
                    bytes_written += bytes;
                }
                Ok(Err(failure)) => failures.push(failure),
                Err(e) => {
                    tasks.abort_all();
                    return Err(e);
                }
            }
        }

        let result = RestoreResult {
            snapshot_id: id,
            output_root: output_root.to_path_buf(),
            files_restored,
            bytes_written,
            failures,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Restored {} files ({} bytes) from snapshot {} in {}ms",
            result.files_restored, result.bytes_written, id, result.duration_ms
        );
        Ok(RestoreOutcome::Restored(result))
    }
}

/// Write one record under `output_root`
///
/// The outer `Result` carries store failures, the inner one per-file failures.
async fn restore_file(
    store: &dyn MetadataStore,
    output_root: &Path,
    record: FileRecord,
) -> Result<std::result::Result<u64, FileFailure>> {
    let relative = record.relative_file_path();
    if !is_contained(&relative, &record.filename) {
        warn!("Refusing to restore {:?}: path escapes the output directory", relative);
        return Ok(Err(FileFailure::new(
            relative,
            "path escapes the output directory",
        )));
    }

    let content = match store.load_content(record.blob_id).await {
        Ok(content) => content,
        Err(e) if e.is_store_failure() => return Err(e),
        Err(e) => {
            warn!("Cannot restore {:?}: {}", relative, e);
            return Ok(Err(FileFailure::new(relative, e)));
        }
    };

    let destination = output_root.join(&relative);
    if let Some(parent) = destination.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            warn!("Cannot create {:?}: {}", parent, e);
            return Ok(Err(FileFailure::new(relative, e)));
        }
    }
    if let Err(e) = tokio::fs::write(&destination, &content).await {
        warn!("Cannot write {:?}: {}", destination, e);
        return Ok(Err(FileFailure::new(relative, e)));
    }

    trace!("Restored {:?} ({} bytes)", destination, content.len());
    Ok(Ok(content.len() as u64))
}

/// Whether `relative` stays inside the directory it is joined onto
fn is_contained(relative: &Path, filename: &str) -> bool {
    let filename_ok = !filename.is_empty()
        && filename != "."
        && filename != ".."
        && !filename.contains('/')
        && !(cfg!(windows) && filename.contains('\\'));
    filename_ok && relative.components().all(|c| matches!(c, Component::Normal(_)))
}
