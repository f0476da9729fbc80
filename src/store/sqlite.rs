//! SQLite implementation of [`MetadataStore`]
//!
//! Backed by an sqlx connection pool. The schema lives in `migrations/` and
//! is applied on connect; each statement lives in `queries/`.
//!
//! Timestamps are stored as Unix seconds. Blob payloads are framed by
//! [`CompressionEngine`], so the table holds compressed bytes while the
//! contract only ever deals in raw bytes.

use super::{MetadataStore, StoredContent};
use crate::compression::{CompressionEngine, CompressionStrategy};
use crate::digest::HashAlgorithm;
use crate::error::{CairnError, Result};
use crate::types::{
    path_key, BlobId, ContentHash, DeletedSnapshots, FileRecord, ReclaimStats, RecordedState,
    Snapshot, SnapshotId, StoreStats,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnectionMetadata;
use sqlx::sqlite::{
    SqliteAutoVacuum, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteSynchronous,
};
use sqlx::SqliteConnection;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, instrument, trace};

/// Embedded migrations, run automatically on connect
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Pool size when none is configured
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Settings key holding the store's hash algorithm
const HASH_ALGORITHM_KEY: &str = "hash_algorithm";

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    id: i64,
    created_at: i64,
}

impl TryFrom<SnapshotRow> for Snapshot {
    type Error = CairnError;

    fn try_from(row: SnapshotRow) -> Result<Self> {
        Ok(Snapshot {
            id: snapshot_id(row.id)?,
            timestamp: DateTime::from_timestamp(row.created_at, 0).ok_or_else(|| {
                CairnError::internal(format!("snapshot {} has invalid timestamp", row.id))
            })?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct FileRecordRow {
    snapshot_id: i64,
    relative_path: String,
    filename: String,
    content_id: i64,
    content_hash: String,
    size: i64,
}

impl TryFrom<FileRecordRow> for FileRecord {
    type Error = CairnError;

    fn try_from(row: FileRecordRow) -> Result<Self> {
        Ok(FileRecord {
            snapshot_id: snapshot_id(row.snapshot_id)?,
            relative_path: row.relative_path,
            filename: row.filename,
            blob_id: BlobId(row.content_id),
            content_hash: ContentHash::new(row.content_hash),
            size: u64::try_from(row.size)
                .map_err(|_| CairnError::internal(format!("negative blob size {}", row.size)))?,
        })
    }
}

fn snapshot_id(raw: i64) -> Result<SnapshotId> {
    SnapshotId::new(raw).ok_or_else(|| CairnError::internal(format!("invalid stored snapshot id {}", raw)))
}

fn to_u64(value: i64, what: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| CairnError::internal(format!("negative {} {}", what, value)))
}

/// Relational [`MetadataStore`] over SQLite
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    compression: CompressionEngine,
}

impl SqliteStore {
    async fn new(options: SqliteConnectOptions, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            // Apply query-based pragmas to every pooled connection, not just the first
            .after_connect(|conn, meta| Box::pin(async move { Self::apply_pragmas(conn, meta).await }))
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;
        let store = Self {
            pool,
            compression: CompressionEngine::default(),
        };
        store.migrate().await?;
        Ok(store)
    }

    /// Open (creating if missing) the database at `path`
    ///
    /// # Errors
    ///
    /// - [`CairnError::Store`] if the database cannot be opened
    /// - [`CairnError::Migration`] if the schema cannot be applied
    pub async fn connect(path: impl AsRef<Path>, max_connections: Option<u32>) -> Result<Self> {
        let options = Self::base_options()
            .filename(path.as_ref())
            .create_if_missing(true);
        Self::new(options, max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS)).await
    }

    /// Open a private in-memory database
    ///
    /// Limited to one connection: separate in-memory connections would each
    /// see their own empty database.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = Self::base_options().filename(":memory:");
        Self::new(options, 1).await
    }

    /// Use `strategy` for blobs written from now on
    ///
    /// Existing payloads stay readable whatever strategy wrote them.
    pub fn with_compression(mut self, strategy: CompressionStrategy) -> Self {
        self.compression = CompressionEngine::new(strategy);
        self
    }

    /// Underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn base_options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .synchronous(SqliteSynchronous::Normal)
            // Concurrent per-file writers share one WAL writer slot
            .busy_timeout(Duration::from_millis(1500))
            .auto_vacuum(SqliteAutoVacuum::None)
    }

    async fn apply_pragmas(
        conn: &mut SqliteConnection,
        _meta: PoolConnectionMetadata,
    ) -> sqlx::Result<()> {
        sqlx::query(
            r#"
                PRAGMA cache_size = -8192;
                PRAGMA temp_store = MEMORY;
            "#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn find_content_by_hash(&self, hash: &ContentHash) -> Result<Option<BlobId>> {
        let id: Option<i64> = sqlx::query_scalar(include_str!("../../queries/find_content_by_hash.sql"))
            .bind(hash.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(id.map(BlobId))
    }

    async fn create_content_if_absent(
        &self,
        hash: &ContentHash,
        bytes: &[u8],
    ) -> Result<StoredContent> {
        // Skip compressing content the store already holds
        if let Some(blob_id) = self.find_content_by_hash(hash).await? {
            return Ok(StoredContent { blob_id, created: false });
        }

        let payload = self.compression.compress(bytes);
        let size = i64::try_from(bytes.len())
            .map_err(|_| CairnError::internal("content too large to store"))?;

        let inserted: Option<i64> = sqlx::query_scalar(include_str!("../../queries/insert_content.sql"))
            .bind(hash.as_str())
            .bind(payload)
            .bind(size)
            .fetch_optional(&self.pool)
            .await?;

        match inserted {
            Some(id) => {
                trace!("Stored blob {} for {}", id, hash.short());
                Ok(StoredContent {
                    blob_id: BlobId(id),
                    created: true,
                })
            }
            // Another writer inserted the same hash between our lookup and insert
            None => {
                let blob_id = self.find_content_by_hash(hash).await?.ok_or_else(|| {
                    CairnError::internal(format!("content {} vanished after conflict", hash.short()))
                })?;
                Ok(StoredContent { blob_id, created: false })
            }
        }
    }

    async fn load_content(&self, blob: BlobId) -> Result<Vec<u8>> {
        let payload: Option<Vec<u8>> = sqlx::query_scalar(include_str!("../../queries/load_content.sql"))
            .bind(blob.0)
            .fetch_optional(&self.pool)
            .await?;
        let payload =
            payload.ok_or_else(|| CairnError::internal(format!("content blob {} does not exist", blob)))?;
        self.compression.decompress(&payload)
    }

    async fn upsert_file_record(
        &self,
        relative_path: &str,
        filename: &str,
        snapshot: SnapshotId,
        blob: BlobId,
    ) -> Result<()> {
        sqlx::query(include_str!("../../queries/upsert_file_record.sql"))
            .bind(relative_path)
            .bind(filename)
            .bind(snapshot.get())
            .bind(blob.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_snapshot(&self, timestamp: DateTime<Utc>) -> Result<SnapshotId> {
        let id: i64 = sqlx::query_scalar(include_str!("../../queries/insert_snapshot.sql"))
            .bind(timestamp.timestamp())
            .fetch_one(&self.pool)
            .await?;
        snapshot_id(id)
    }

    async fn get_snapshot(&self, id: SnapshotId) -> Result<Option<Snapshot>> {
        let row: Option<SnapshotRow> = sqlx::query_as(include_str!("../../queries/get_snapshot.sql"))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Snapshot::try_from).transpose()
    }

    async fn list_file_records(&self, id: SnapshotId) -> Result<Vec<FileRecord>> {
        let rows: Vec<FileRecordRow> = sqlx::query_as(include_str!("../../queries/list_file_records.sql"))
            .bind(id.get())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(FileRecord::try_from).collect()
    }

    async fn latest_recorded_state(&self) -> Result<RecordedState> {
        let rows: Vec<(String, String, String)> =
            sqlx::query_as(include_str!("../../queries/latest_recorded_state.sql"))
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(relative_path, filename, hash)| {
                (path_key(&relative_path, &filename), ContentHash::new(hash))
            })
            .collect())
    }

    #[instrument(skip(self))]
    async fn delete_snapshot(&self, id: SnapshotId) -> Result<DeletedSnapshots> {
        let mut tx = self.pool.begin().await?;
        let file_records_deleted = sqlx::query(include_str!("../../queries/delete_snapshot_records.sql"))
            .bind(id.get())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let snapshots_deleted = sqlx::query(include_str!("../../queries/delete_snapshot.sql"))
            .bind(id.get())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;

        debug!("Deleted snapshot {}: {} file records", id, file_records_deleted);
        Ok(DeletedSnapshots {
            snapshots_deleted,
            file_records_deleted,
        })
    }

    #[instrument(skip(self))]
    async fn delete_snapshots_older_than(&self, cutoff: DateTime<Utc>) -> Result<DeletedSnapshots> {
        let cutoff = cutoff.timestamp();
        let mut tx = self.pool.begin().await?;
        let file_records_deleted = sqlx::query(include_str!("../../queries/delete_records_older_than.sql"))
            .bind(cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let snapshots_deleted = sqlx::query(include_str!("../../queries/delete_snapshots_older_than.sql"))
            .bind(cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;

        debug!(
            "Deleted {} snapshots older than {}: {} file records",
            snapshots_deleted, cutoff, file_records_deleted
        );
        Ok(DeletedSnapshots {
            snapshots_deleted,
            file_records_deleted,
        })
    }

    #[instrument(skip(self))]
    async fn reclaim_orphan_content(&self) -> Result<ReclaimStats> {
        let sizes: Vec<i64> = sqlx::query_scalar(include_str!("../../queries/reclaim_orphan_content.sql"))
            .fetch_all(&self.pool)
            .await?;
        let stats = ReclaimStats {
            blobs_deleted: sizes.len() as u64,
            bytes_reclaimed: sizes
                .into_iter()
                .map(|size| to_u64(size, "blob size"))
                .sum::<Result<u64>>()?,
        };
        debug!(
            "Reclaimed {} orphaned blobs ({} bytes)",
            stats.blobs_deleted, stats.bytes_reclaimed
        );
        Ok(stats)
    }

    async fn list_snapshots(&self) -> Result<Vec<Snapshot>> {
        let rows: Vec<SnapshotRow> = sqlx::query_as(include_str!("../../queries/list_snapshots.sql"))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Snapshot::try_from).collect()
    }

    async fn count_file_records(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(include_str!("../../queries/count_file_records.sql"))
            .fetch_one(&self.pool)
            .await?;
        to_u64(count, "file record count")
    }

    async fn stats(&self) -> Result<StoreStats> {
        let (snapshots, file_records, content_blobs, content_bytes): (i64, i64, i64, i64) =
            sqlx::query_as(include_str!("../../queries/stats.sql"))
                .fetch_one(&self.pool)
                .await?;
        Ok(StoreStats {
            snapshots: to_u64(snapshots, "snapshot count")?,
            file_records: to_u64(file_records, "file record count")?,
            content_blobs: to_u64(content_blobs, "blob count")?,
            content_bytes: to_u64(content_bytes, "content size")?,
        })
    }

    async fn ensure_hash_algorithm(&self, algorithm: HashAlgorithm) -> Result<()> {
        sqlx::query(include_str!("../../queries/insert_setting.sql"))
            .bind(HASH_ALGORITHM_KEY)
            .bind(algorithm.as_str())
            .execute(&self.pool)
            .await?;
        let stored: String = sqlx::query_scalar(include_str!("../../queries/get_setting.sql"))
            .bind(HASH_ALGORITHM_KEY)
            .fetch_one(&self.pool)
            .await?;

        if stored != algorithm.as_str() {
            return Err(CairnError::HashAlgorithmMismatch {
                stored,
                configured: algorithm,
            });
        }
        Ok(())
    }

    async fn close(&self) {
        // Let SQLite refresh query planner statistics
        let _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }
}
