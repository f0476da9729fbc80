//! Main test module for Cairn
//!
//! This module includes all test suites:
//! - Integration tests for end-to-end snapshot scenarios
//! - Property-based tests for invariants

pub mod integration;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use ::cairn::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    async fn open() -> Cairn {
        CairnBuilder::new().open_in_memory().await.unwrap()
    }

    fn created(outcome: SnapshotOutcome) -> SnapshotReport {
        match outcome {
            SnapshotOutcome::Created(report) => report,
            other => panic!("expected a new snapshot, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("only/dirs/here")).unwrap();
        let cairn = open().await;

        let outcome = cairn.take_snapshot(temp_dir.path()).await.unwrap();
        assert!(matches!(outcome, SnapshotOutcome::EmptyDirectory));
        assert!(cairn.list_snapshots().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_directory() {
        let cairn = open().await;
        let result = cairn.take_snapshot(Path::new("/definitely/not/here")).await;
        assert!(matches!(result, Err(CairnError::DirectoryNotFound(_))));
        assert_eq!(cairn.stats().await.unwrap(), StoreStats::default());
    }

    #[tokio::test]
    async fn test_file_as_snapshot_root() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("plain.txt");
        fs::write(&file, "not a directory").unwrap();

        let cairn = open().await;
        let result = cairn.take_snapshot(&file).await;
        assert!(matches!(result, Err(CairnError::DirectoryNotFound(_))));
    }

    #[tokio::test]
    async fn test_empty_files_are_recorded() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("empty1"), "").unwrap();
        fs::write(temp_dir.path().join("empty2"), "").unwrap();

        let cairn = open().await;
        let report = created(cairn.take_snapshot(temp_dir.path()).await.unwrap());
        assert_eq!(report.files_recorded, 2);
        assert_eq!(report.blobs_created, 1);

        let out = TempDir::new().unwrap();
        cairn.restore(report.snapshot.id, out.path()).await.unwrap();
        assert_eq!(fs::read(out.path().join("empty1")).unwrap(), b"");
        assert_eq!(fs::read(out.path().join("empty2")).unwrap(), b"");
    }

    #[tokio::test]
    async fn test_unicode_and_spaces_in_names() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("My Documents/café");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("notes 日本.txt"), "unicode").unwrap();

        let cairn = open().await;
        let report = created(cairn.take_snapshot(temp_dir.path()).await.unwrap());

        let out = TempDir::new().unwrap();
        cairn.restore(report.snapshot.id, out.path()).await.unwrap();
        assert_eq!(
            fs::read_to_string(out.path().join("My Documents/café/notes 日本.txt")).unwrap(),
            "unicode"
        );
    }

    #[tokio::test]
    async fn test_deleting_a_file_alone_is_not_a_change() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("keep.txt"), "keep").unwrap();
        fs::write(temp_dir.path().join("drop.txt"), "drop").unwrap();

        let cairn = open().await;
        created(cairn.take_snapshot(temp_dir.path()).await.unwrap());

        fs::remove_file(temp_dir.path().join("drop.txt")).unwrap();
        let outcome = cairn.take_snapshot(temp_dir.path()).await.unwrap();
        assert!(matches!(outcome, SnapshotOutcome::NoChanges { files_scanned: 1, .. }));
    }

    #[tokio::test]
    async fn test_restore_zero_and_negative_ids_rejected_by_parse() {
        assert!(matches!("0".parse::<SnapshotId>(), Err(CairnError::InvalidSnapshotId(_))));
        assert!(matches!("-1".parse::<SnapshotId>(), Err(CairnError::InvalidSnapshotId(_))));
        assert!(matches!("1.5".parse::<SnapshotId>(), Err(CairnError::InvalidSnapshotId(_))));
        assert_eq!("42".parse::<SnapshotId>().unwrap().get(), 42);
    }

    #[tokio::test]
    async fn test_ignore_patterns_and_size_limit() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("target/debug")).unwrap();
        fs::write(temp_dir.path().join("target/debug/app"), "binary").unwrap();
        fs::write(temp_dir.path().join("scratch.tmp"), "tmp").unwrap();
        fs::write(temp_dir.path().join("big.bin"), vec![7u8; 4096]).unwrap();
        fs::write(temp_dir.path().join("main.rs"), "fn main() {}").unwrap();

        let cairn = CairnBuilder::new()
            .ignore_patterns(vec!["target/".to_string(), "*.tmp".to_string()])
            .max_file_size(1024)
            .open_in_memory()
            .await
            .unwrap();

        let report = created(cairn.take_snapshot(temp_dir.path()).await.unwrap());
        assert_eq!(report.files_recorded, 1);

        let records = cairn.store().list_file_records(report.snapshot.id).await.unwrap();
        assert_eq!(records[0].filename, "main.rs");
    }
}
