//! End-to-end snapshot scenarios
//!
//! Drives a [`Cairn`] over a scratch directory through snapshot, restore and
//! prune sequences and checks the store contents after each step.

use ::cairn::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

/// Scratch directory plus a store to snapshot it into
pub struct SnapshotHarness {
    pub source: TempDir,
    pub cairn: Cairn,
}

impl SnapshotHarness {
    /// Harness over an in-memory store
    pub async fn new() -> Self {
        Self::with_builder(CairnBuilder::new()).await
    }

    /// Harness with custom builder settings
    pub async fn with_builder(builder: CairnBuilder) -> Self {
        Self {
            source: TempDir::new().unwrap(),
            cairn: builder.open_in_memory().await.unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.source.path()
    }

    /// Write `content` at `relative`, creating parent directories
    pub fn write(&self, relative: &str, content: impl AsRef<[u8]>) {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    pub fn remove(&self, relative: &str) {
        fs::remove_file(self.root().join(relative)).unwrap();
    }

    /// Take a snapshot that must produce a new one
    pub async fn snapshot(&self) -> SnapshotReport {
        match self.cairn.take_snapshot(self.root()).await.unwrap() {
            SnapshotOutcome::Created(report) => report,
            other => panic!("expected a new snapshot, got {:?}", other),
        }
    }

    /// Restore `id` into a fresh directory
    pub async fn restore(&self, id: SnapshotId) -> (TempDir, RestoreResult) {
        let out = TempDir::new().unwrap();
        match self.cairn.restore(id, out.path()).await.unwrap() {
            RestoreOutcome::Restored(result) => (out, result),
            other => panic!("expected a restore, got {:?}", other),
        }
    }

    /// Map of record path to blob id for one snapshot
    pub async fn blobs_of(&self, id: SnapshotId) -> BTreeMap<String, BlobId> {
        self.cairn
            .store()
            .list_file_records(id)
            .await
            .unwrap()
            .into_iter()
            .map(|record| (record.path_key(), record.blob_id))
            .collect()
    }
}

/// Every regular file under `root`, keyed by relative path
pub fn try_read_tree(root: &Path) -> anyhow::Result<BTreeMap<PathBuf, Vec<u8>>> {
    let mut tree = BTreeMap::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if entry.file_type().is_file() {
            let relative = entry.path().strip_prefix(root)?.to_path_buf();
            tree.insert(relative, fs::read(entry.path())?);
        }
    }
    Ok(tree)
}

pub fn read_tree(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    try_read_tree(root).unwrap()
}

/// Deterministic random project tree
pub struct FileGenerator {
    rng: StdRng,
}

impl FileGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Write `count` files across nested directories; some contents repeat
    pub fn populate(&mut self, root: &Path, count: usize) -> Vec<PathBuf> {
        let shared: Vec<Vec<u8>> = (0..4)
            .map(|i| format!("shared content block {}", i).repeat(50).into_bytes())
            .collect();

        let mut written = Vec::with_capacity(count);
        for i in 0..count {
            let depth = self.rng.random_range(0..4);
            let mut relative = PathBuf::new();
            for level in 0..depth {
                relative.push(format!("dir{}_{}", level, self.rng.random_range(0..3)));
            }
            relative.push(format!("file_{}.dat", i));

            let content = if self.rng.random_bool(0.3) {
                shared[self.rng.random_range(0..shared.len())].clone()
            } else {
                let len = self.rng.random_range(0..8192);
                (0..len).map(|_| self.rng.random::<u8>()).collect()
            };

            let path = root.join(&relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
            written.push(relative);
        }
        written
    }
}

#[tokio::test]
async fn test_hello_world_scenario() {
    let harness = SnapshotHarness::new().await;
    harness.write("a.txt", "hello");
    harness.write("b.txt", "world");

    let first = harness.snapshot().await;
    assert_eq!(first.files_recorded, 2);
    assert_eq!(harness.cairn.stats().await.unwrap().content_blobs, 2);

    harness.write("a.txt", "hello!");
    let second = harness.snapshot().await;
    assert_eq!(second.files_recorded, 2);
    assert_eq!(second.files_modified, 1);
    assert_eq!(second.files_unchanged, 1);
    assert_eq!(harness.cairn.stats().await.unwrap().content_blobs, 3);

    let first_blobs = harness.blobs_of(first.snapshot.id).await;
    let second_blobs = harness.blobs_of(second.snapshot.id).await;
    assert_ne!(first_blobs["/a.txt"], second_blobs["/a.txt"]);
    assert_eq!(first_blobs["/b.txt"], second_blobs["/b.txt"]);

    let outcome = harness.cairn.prune_by_id(first.snapshot.id).await.unwrap();
    let report = match outcome {
        PruneOutcome::Pruned(report) => report,
        other => panic!("expected a prune, got {:?}", other),
    };
    assert_eq!(report.deleted.file_records_deleted, 2);
    assert_eq!(report.reclaimed.blobs_deleted, 1);
    assert_eq!(report.reclaimed.bytes_reclaimed, 5);

    let stats = harness.cairn.stats().await.unwrap();
    assert_eq!(stats.snapshots, 1);
    assert_eq!(stats.content_blobs, 2);

    let (out, _) = harness.restore(second.snapshot.id).await;
    assert_eq!(fs::read_to_string(out.path().join("a.txt")).unwrap(), "hello!");
    assert_eq!(fs::read_to_string(out.path().join("b.txt")).unwrap(), "world");
}

#[tokio::test]
async fn test_far_future_cutoff_clears_the_store() {
    let harness = SnapshotHarness::new().await;
    harness.write("one.txt", "1");
    harness.snapshot().await;
    harness.write("two.txt", "2");
    harness.snapshot().await;
    harness.write("one.txt", "uno");
    harness.snapshot().await;

    let cutoff = command::parse_cutoff("2099-01-01 00:00:00").unwrap();
    let report = harness.cairn.prune_older_than(cutoff).await.unwrap();
    assert_eq!(report.deleted.snapshots_deleted, 3);
    assert_eq!(report.deleted.file_records_deleted, 1 + 2 + 2);
    assert_eq!(report.reclaimed.blobs_deleted, 3);

    assert_eq!(harness.cairn.stats().await.unwrap(), StoreStats::default());
    assert_eq!(harness.cairn.count_file_records().await.unwrap(), 0);
}

#[tokio::test]
async fn test_restore_missing_snapshot_writes_nothing() {
    let harness = SnapshotHarness::new().await;
    harness.write("a.txt", "a");
    harness.snapshot().await;

    let parent = TempDir::new().unwrap();
    let out = parent.path().join("out");
    let missing = SnapshotId::new(9999).unwrap();

    let outcome = harness.cairn.restore(missing, &out).await.unwrap();
    assert!(matches!(outcome, RestoreOutcome::NotFound(id) if id == missing));
    assert!(!out.exists());
}

#[tokio::test]
async fn test_round_trip_is_byte_identical() {
    let harness = SnapshotHarness::new().await;
    FileGenerator::new(7).populate(harness.root(), 120);
    let before = read_tree(harness.root());

    let report = harness.snapshot().await;
    assert_eq!(report.files_recorded, before.len());

    let (out, result) = harness.restore(report.snapshot.id).await;
    assert!(result.failures.is_empty());
    assert_eq!(result.files_restored, before.len());
    assert_eq!(read_tree(out.path()), before);
}

#[tokio::test]
async fn test_every_snapshot_is_self_contained() {
    let harness = SnapshotHarness::new().await;
    let mut trees = Vec::new();

    harness.write("src/lib.rs", "pub fn a() {}");
    harness.write("README.md", "# readme");
    trees.push((harness.snapshot().await.snapshot.id, read_tree(harness.root())));

    harness.write("src/lib.rs", "pub fn a() {}\npub fn b() {}");
    harness.write("src/extra.rs", "mod extra;");
    trees.push((harness.snapshot().await.snapshot.id, read_tree(harness.root())));

    harness.remove("README.md");
    harness.write("docs/guide.md", "guide");
    trees.push((harness.snapshot().await.snapshot.id, read_tree(harness.root())));

    // Removing the middle snapshot must not affect its neighbours
    harness.cairn.prune_by_id(trees[1].0).await.unwrap();
    trees.remove(1);

    for (id, expected) in &trees {
        let (out, _) = harness.restore(*id).await;
        assert_eq!(&read_tree(out.path()), expected, "snapshot {} differs", id);
    }
}

#[tokio::test]
async fn test_identical_content_shares_one_blob() {
    let harness = SnapshotHarness::new().await;
    harness.write("a/copy.txt", "same bytes");
    harness.write("b/copy.txt", "same bytes");
    harness.write("c/other.txt", "different bytes");
    let first = harness.snapshot().await;

    harness.write("d/late.txt", "same bytes");
    let second = harness.snapshot().await;

    let mut by_hash: HashMap<ContentHash, BlobId> = HashMap::new();
    for id in [first.snapshot.id, second.snapshot.id] {
        for record in harness.cairn.store().list_file_records(id).await.unwrap() {
            let blob = *by_hash.entry(record.content_hash.clone()).or_insert(record.blob_id);
            assert_eq!(blob, record.blob_id, "{} not deduplicated", record.path_key());
        }
    }
    assert_eq!(harness.cairn.stats().await.unwrap().content_blobs, 2);
}

#[tokio::test]
async fn test_unchanged_directory_is_a_no_op() {
    let harness = SnapshotHarness::new().await;
    FileGenerator::new(11).populate(harness.root(), 30);
    harness.snapshot().await;

    for _ in 0..3 {
        let outcome = harness.cairn.take_snapshot(harness.root()).await.unwrap();
        assert!(matches!(outcome, SnapshotOutcome::NoChanges { .. }));
    }
    assert_eq!(harness.cairn.list_snapshots().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_reverting_content_reuses_the_original_blob() {
    let harness = SnapshotHarness::new().await;
    harness.write("config.toml", "v1");
    let first = harness.snapshot().await;

    harness.write("config.toml", "v2");
    harness.snapshot().await;

    harness.write("config.toml", "v1");
    let third = harness.snapshot().await;
    assert_eq!(third.files_modified, 1);
    assert_eq!(third.blobs_created, 0);

    assert_eq!(
        harness.blobs_of(first.snapshot.id).await,
        harness.blobs_of(third.snapshot.id).await
    );
}

#[tokio::test]
async fn test_listing_is_most_recent_first() {
    let harness = SnapshotHarness::new().await;
    let mut ids = Vec::new();
    for i in 0..4 {
        harness.write("counter.txt", i.to_string());
        ids.push(harness.snapshot().await.snapshot.id);
    }

    let listed: Vec<SnapshotId> = harness
        .cairn
        .list_snapshots()
        .await
        .unwrap()
        .into_iter()
        .map(|snapshot| snapshot.id)
        .collect();
    ids.reverse();
    assert_eq!(listed, ids);
}

#[tokio::test]
async fn test_persistent_store_survives_reopen() {
    let harness_dir = TempDir::new().unwrap();
    let database = harness_dir.path().join("store/cairn.db");
    fs::create_dir_all(database.parent().unwrap()).unwrap();
    let source = TempDir::new().unwrap();
    fs::write(source.path().join("kept.txt"), "persisted").unwrap();

    let cairn = CairnBuilder::new()
        .database(&database)
        .hash_algorithm(HashAlgorithm::Blake3)
        .compression(CompressionStrategy::None)
        .open()
        .await
        .unwrap();
    let id = match cairn.take_snapshot(source.path()).await.unwrap() {
        SnapshotOutcome::Created(report) => report.snapshot.id,
        other => panic!("expected a new snapshot, got {:?}", other),
    };
    cairn.close().await;

    let reopened = CairnBuilder::new()
        .database(&database)
        .hash_algorithm(HashAlgorithm::Blake3)
        .open()
        .await
        .unwrap();
    assert!(matches!(
        reopened.take_snapshot(source.path()).await.unwrap(),
        SnapshotOutcome::NoChanges { .. }
    ));

    let out = TempDir::new().unwrap();
    reopened.restore(id, out.path()).await.unwrap();
    assert_eq!(fs::read_to_string(out.path().join("kept.txt")).unwrap(), "persisted");
    reopened.close().await;
}

#[tokio::test]
async fn test_compressible_content_round_trips() {
    let harness = SnapshotHarness::with_builder(
        CairnBuilder::new().compression(CompressionStrategy::Fast),
    )
    .await;
    let text = "log line with a lot of repetition\n".repeat(2000);
    harness.write("logs/app.log", &text);

    let report = harness.snapshot().await;
    assert_eq!(report.bytes_stored, text.len() as u64);

    let (out, result) = harness.restore(report.snapshot.id).await;
    assert_eq!(result.bytes_written, text.len() as u64);
    assert_eq!(fs::read_to_string(out.path().join("logs/app.log")).unwrap(), text);
}
