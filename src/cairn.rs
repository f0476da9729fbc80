//! Main Cairn API
//!
//! [`Cairn`] ties a metadata store to the snapshot, restore and prune
//! engines and is the entry point for library users. Construct it with
//! [`CairnBuilder`].
//!
//! ## Concurrency
//!
//! Snapshot creation reads the recorded state before writing new records, and
//! reclamation deletes blobs nobody references *yet*. Both would race with a
//! concurrent snapshot, so a `Cairn` serializes every snapshot, prune and
//! garbage collection through one lock. Restores and read-only queries run
//! freely alongside them.
//!
//! ## Example
//!
//! ```rust,no_run
//! use cairn::{CairnBuilder, SnapshotOutcome, RestoreOutcome};
//! use std::path::Path;
//!
//! # async fn example() -> cairn::Result<()> {
//! let cairn = CairnBuilder::new()
//!     .database("backups.db")
//!     .ignore_patterns(vec!["*.tmp".to_string()])
//!     .open()
//!     .await?;
//!
//! if let SnapshotOutcome::Created(report) = cairn.take_snapshot(Path::new("./documents")).await? {
//!     println!("snapshot {} recorded {} files", report.snapshot.id, report.files_recorded);
//!
//!     if let RestoreOutcome::Restored(result) =
//!         cairn.restore(report.snapshot.id, Path::new("./restored")).await?
//!     {
//!         println!("restored {} files", result.files_restored);
//!     }
//! }
//!
//! cairn.close().await;
//! # Ok(())
//! # }
//! ```

use crate::compression::CompressionStrategy;
use crate::config::CairnConfig;
use crate::digest::{Digester, HashAlgorithm};
use crate::error::Result;
use crate::prune::PruneEngine;
use crate::restore::RestoreEngine;
use crate::scanner::DirectoryScanner;
use crate::snapshot::SnapshotEngine;
use crate::store::{MetadataStore, SqliteStore};
use crate::types::{
    PruneOutcome, PruneReport, ReclaimStats, RestoreOutcome, Snapshot, SnapshotId,
    SnapshotOutcome, StoreStats,
};
use chrono::{DateTime, Utc};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

/// Snapshot store over one metadata backend
#[derive(Debug)]
pub struct Cairn {
    store: Arc<dyn MetadataStore>,
    config: CairnConfig,
    snapshots: SnapshotEngine,
    restores: RestoreEngine,
    prunes: PruneEngine,
    /// Serializes snapshot creation with prune and gc
    write_lock: Mutex<()>,
}

impl Cairn {
    /// Open the store described by `config`
    ///
    /// Shorthand for `CairnBuilder::from_config(config).open()`.
    pub async fn open(config: CairnConfig) -> Result<Self> {
        CairnBuilder::from_config(config).open().await
    }

    /// Configuration in use
    pub fn config(&self) -> &CairnConfig {
        &self.config
    }

    /// Underlying metadata store
    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    /// Snapshot the directory at `root`
    ///
    /// See [`SnapshotEngine::take_snapshot`] for the possible outcomes.
    pub async fn take_snapshot(&self, root: &Path) -> Result<SnapshotOutcome> {
        let _guard = self.write_lock.lock().await;
        self.snapshots.take_snapshot(root).await
    }

    /// Restore snapshot `id` into `output_root`
    pub async fn restore(&self, id: SnapshotId, output_root: &Path) -> Result<RestoreOutcome> {
        self.restores.restore(id, output_root).await
    }

    /// Delete snapshot `id` and reclaim content only it referenced
    pub async fn prune_by_id(&self, id: SnapshotId) -> Result<PruneOutcome> {
        let _guard = self.write_lock.lock().await;
        self.prunes.prune_by_id(id).await
    }

    /// Delete every snapshot strictly older than `cutoff` and reclaim content
    pub async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<PruneReport> {
        let _guard = self.write_lock.lock().await;
        self.prunes.prune_older_than(cutoff).await
    }

    /// Reclaim content no snapshot references
    pub async fn collect_garbage(&self) -> Result<ReclaimStats> {
        let _guard = self.write_lock.lock().await;
        self.prunes.collect_garbage().await
    }

    /// All snapshots, most recent first
    pub async fn list_snapshots(&self) -> Result<Vec<Snapshot>> {
        self.store.list_snapshots().await
    }

    /// Total file records across all snapshots
    pub async fn count_file_records(&self) -> Result<u64> {
        self.store.count_file_records().await
    }

    /// Row counts and stored bytes
    pub async fn stats(&self) -> Result<StoreStats> {
        self.store.stats().await
    }

    /// Release the store's resources
    pub async fn close(&self) {
        info!("Closing store");
        self.store.close().await;
    }
}

/// Builder for [`Cairn`] instances
///
/// # Examples
///
/// ```rust,no_run
/// use cairn::{CairnBuilder, HashAlgorithm};
///
/// # async fn example() -> cairn::Result<()> {
/// let cairn = CairnBuilder::new()
///     .database("/var/backups/home.db")
///     .hash_algorithm(HashAlgorithm::Blake3)
///     .parallel_workers(4)
///     .max_file_size(512 * 1024 * 1024)
///     .open()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct CairnBuilder {
    config: CairnConfig,
    store: Option<Arc<dyn MetadataStore>>,
}

impl CairnBuilder {
    /// Builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder starting from an existing configuration
    pub fn from_config(config: CairnConfig) -> Self {
        Self { config, store: None }
    }

    /// SQLite database file
    pub fn database(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.database = path.into();
        self
    }

    /// Content hash algorithm; must match what the store was created with
    pub fn hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.config.hash_algorithm = algorithm;
        self
    }

    /// Connection pool size
    pub fn max_connections(mut self, count: u32) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Maximum concurrent per-file tasks (minimum 1)
    pub fn parallel_workers(mut self, count: usize) -> Self {
        self.config.parallel_workers = count.max(1);
        self
    }

    /// Glob patterns excluded from snapshots
    pub fn ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.config.ignore_patterns = patterns;
        self
    }

    /// Skip files larger than `size` bytes (0 = no limit)
    pub fn max_file_size(mut self, size: u64) -> Self {
        self.config.max_file_size = size;
        self
    }

    /// Follow symbolic links while scanning
    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.config.follow_symlinks = follow;
        self
    }

    /// Blob payload compression
    pub fn compression(mut self, strategy: CompressionStrategy) -> Self {
        self.config.compression = strategy;
        self
    }

    /// Use a custom metadata backend instead of opening the SQLite database
    pub fn store(mut self, store: Arc<dyn MetadataStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Open the configured store and build the engines
    ///
    /// # Errors
    ///
    /// - [`CairnError::InvalidConfiguration`](crate::CairnError::InvalidConfiguration) for out-of-range settings
    /// - [`CairnError::InvalidPattern`](crate::CairnError::InvalidPattern) for a bad ignore pattern
    /// - [`CairnError::Store`](crate::CairnError::Store) if the database cannot be opened
    /// - [`CairnError::HashAlgorithmMismatch`](crate::CairnError::HashAlgorithmMismatch) if the
    ///   store was created with a different algorithm
    #[instrument(skip(self), fields(database = %self.config.database.display()))]
    pub async fn open(self) -> Result<Cairn> {
        self.config.validate()?;

        let (store, excluded) = match self.store {
            Some(store) => (store, Vec::new()),
            None => {
                let sqlite = SqliteStore::connect(&self.config.database, Some(self.config.max_connections))
                    .await?
                    .with_compression(self.config.compression);
                let store: Arc<dyn MetadataStore> = Arc::new(sqlite);
                (store, database_files(&self.config.database))
            }
        };
        Self::assemble(self.config, store, excluded).await
    }

    /// Build on a private in-memory database, discarded when closed
    pub async fn open_in_memory(self) -> Result<Cairn> {
        self.config.validate()?;
        let sqlite = SqliteStore::connect_in_memory()
            .await?
            .with_compression(self.config.compression);
        Self::assemble(self.config, Arc::new(sqlite), Vec::new()).await
    }

    async fn assemble(
        config: CairnConfig,
        store: Arc<dyn MetadataStore>,
        excluded: Vec<PathBuf>,
    ) -> Result<Cairn> {
        store.ensure_hash_algorithm(config.hash_algorithm).await?;

        let scanner = DirectoryScanner::new()
            .with_ignore_patterns(&config.ignore_patterns)?
            .with_max_file_size(config.max_file_size)
            .with_follow_symlinks(config.follow_symlinks)
            .with_excluded_paths(excluded);
        let digester = Digester::new(config.hash_algorithm);

        debug!(
            "Opened store: hash={}, workers={}, ignore={:?}",
            config.hash_algorithm, config.parallel_workers, config.ignore_patterns
        );

        Ok(Cairn {
            snapshots: SnapshotEngine::new(
                Arc::clone(&store),
                scanner,
                digester,
                config.parallel_workers,
            ),
            restores: RestoreEngine::new(Arc::clone(&store), config.parallel_workers),
            prunes: PruneEngine::new(Arc::clone(&store)),
            store,
            config,
            write_lock: Mutex::new(()),
        })
    }
}

/// The database file and the SQLite sidecar files next to it
fn database_files(database: &Path) -> Vec<PathBuf> {
    let mut files = vec![database.to_path_buf()];
    for suffix in ["-wal", "-shm", "-journal"] {
        let mut name = OsString::from(database.as_os_str());
        name.push(suffix);
        files.push(PathBuf::from(name));
    }
    files
}
