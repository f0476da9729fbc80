//! Property-based testing for Cairn
//!
//! Uses proptest to check classification, deduplication and restore
//! invariants across randomly generated directory trees.

use ::cairn::compare::{FileComparator, FileStatus};
use ::cairn::*;
use proptest::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Random relative file paths, at most three directories deep
fn path_strategy() -> impl Strategy<Value = PathBuf> {
    let dirs = prop::collection::vec("[a-z]{1,6}", 0..=3);
    let filename = prop_oneof![
        "file[0-9]{1,3}\\.txt".prop_map(|s| s),
        "[a-z]{3,8}\\.(rs|md)".prop_map(|s| s),
    ];
    (dirs, filename).prop_map(|(dirs, filename)| {
        let mut path: PathBuf = dirs.into_iter().collect();
        path.push(filename);
        path
    })
}

/// Contents drawn from a small pool so collisions are common
fn content_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        (0u8..4).prop_map(|i| format!("pooled content {}", i).into_bytes()),
        prop::collection::vec(any::<u8>(), 0..2048),
    ]
}

/// Map of path to content; later duplicates of a path win
fn tree_strategy() -> impl Strategy<Value = BTreeMap<PathBuf, Vec<u8>>> {
    prop::collection::vec((path_strategy(), content_strategy()), 1..25)
        .prop_map(|entries| entries.into_iter().collect())
}

/// Write `tree` under `root`, skipping paths that clash with a directory
fn write_tree(root: &Path, tree: &BTreeMap<PathBuf, Vec<u8>>) -> BTreeMap<PathBuf, Vec<u8>> {
    let mut written = BTreeMap::new();
    for (relative, content) in tree {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            if fs::create_dir_all(parent).is_err() {
                continue;
            }
        }
        if path.is_dir() || fs::write(&path, content).is_err() {
            continue;
        }
        written.insert(relative.clone(), content.clone());
    }
    written
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Snapshot then restore reproduces exactly the files that were scanned
    #[test]
    fn snapshot_restore_identity(tree in tree_strategy()) {
        let source = TempDir::new().unwrap();
        let written = write_tree(source.path(), &tree);
        prop_assume!(!written.is_empty());

        runtime().block_on(async {
            let cairn = CairnBuilder::new().open_in_memory().await.unwrap();
            let id = match cairn.take_snapshot(source.path()).await.unwrap() {
                SnapshotOutcome::Created(report) => report.snapshot.id,
                other => panic!("expected a new snapshot, got {:?}", other),
            };

            let out = TempDir::new().unwrap();
            cairn.restore(id, out.path()).await.unwrap();
            for (relative, content) in &written {
                assert_eq!(&fs::read(out.path().join(relative)).unwrap(), content);
            }
        });
    }

    /// Identical bytes always resolve to a single blob, across snapshots
    #[test]
    fn identical_content_is_stored_once(first in tree_strategy(), second in tree_strategy()) {
        let source = TempDir::new().unwrap();
        let mut contents: Vec<Vec<u8>> = write_tree(source.path(), &first).into_values().collect();
        prop_assume!(!contents.is_empty());

        runtime().block_on(async {
            let cairn = CairnBuilder::new().open_in_memory().await.unwrap();
            let mut ids = Vec::new();
            ids.extend(cairn.take_snapshot(source.path()).await.unwrap().snapshot().map(|s| s.id));

            contents.extend(write_tree(source.path(), &second).into_values());
            ids.extend(cairn.take_snapshot(source.path()).await.unwrap().snapshot().map(|s| s.id));

            let mut by_hash: HashMap<ContentHash, BlobId> = HashMap::new();
            for id in ids {
                for record in cairn.store().list_file_records(id).await.unwrap() {
                    let blob = *by_hash.entry(record.content_hash.clone()).or_insert(record.blob_id);
                    assert_eq!(blob, record.blob_id);
                }
            }

            // Blob count never exceeds the distinct contents written
            contents.sort();
            contents.dedup();
            let stats = cairn.stats().await.unwrap();
            assert!(stats.content_blobs as usize <= contents.len());
            assert_eq!(stats.content_blobs as usize, by_hash.len());
        });
    }

    /// Classification depends only on the recorded hash for the path
    #[test]
    fn classification_matches_recorded_state(
        key in "/[a-z]{1,8}\\.txt",
        current in prop::collection::vec(any::<u8>(), 0..64),
        recorded in prop::option::of(prop::collection::vec(any::<u8>(), 0..64)),
    ) {
        let digester = Digester::default();
        let hash = digester.digest_bytes(&current);
        let mut state = RecordedState::new();
        if let Some(bytes) = &recorded {
            state.insert(key.clone(), digester.digest_bytes(bytes));
        }

        let expected = match &recorded {
            None => FileStatus::New,
            Some(bytes) if *bytes == current => FileStatus::Unchanged,
            Some(_) => FileStatus::Modified,
        };
        prop_assert_eq!(FileComparator::classify(&key, &hash, &state), expected);
    }

    /// Streaming and one-shot digests agree for every algorithm
    #[test]
    fn streaming_digest_matches_one_shot(data in prop::collection::vec(any::<u8>(), 0..40_000)) {
        for algorithm in [HashAlgorithm::Sha256, HashAlgorithm::Sha512, HashAlgorithm::Blake3] {
            let digester = Digester::new(algorithm);
            let streamed = digester.digest_reader(data.as_slice()).unwrap();
            let hash = digester.digest_bytes(&data);
            prop_assert_eq!(hash.as_str().len(), algorithm.hex_len());
            prop_assert_eq!(streamed, hash);
        }
    }
}
