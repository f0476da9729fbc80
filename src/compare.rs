//! Classification of scanned files against recorded state
//!
//! Every scanned file is hashed (in parallel, on the rayon pool) and put in
//! exactly one bucket:
//!
//! | recorded state for the path key | hash      | bucket      |
//! |---------------------------------|-----------|-------------|
//! | absent                          | any       | `new`       |
//! | present                         | differs   | `modified`  |
//! | present                         | equal     | `unchanged` |
//!
//! Files that cannot be read are reported in `failures` instead.

use crate::digest::Digester;
use crate::scanner::ScannedFile;
use crate::types::{ContentHash, FileFailure, RecordedState};
use rayon::prelude::*;
use tracing::{debug, trace, warn};

/// How a file relates to recorded state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    /// No recorded state for this path
    New,
    /// Recorded with a different hash
    Modified,
    /// Recorded with the same hash
    Unchanged,
}

/// A scanned file with its current content hash
#[derive(Debug, Clone)]
pub struct ClassifiedFile {
    /// The scanned file
    pub file: ScannedFile,
    /// Hash of its bytes at comparison time
    pub hash: ContentHash,
    /// Bucket the file fell into
    pub status: FileStatus,
}

/// Files split by status
#[derive(Debug, Default)]
pub struct Comparison {
    /// Files with no recorded state
    pub new: Vec<ClassifiedFile>,
    /// Files whose hash changed
    pub modified: Vec<ClassifiedFile>,
    /// Files matching recorded state
    pub unchanged: Vec<ClassifiedFile>,
    /// Files that could not be hashed
    pub failures: Vec<FileFailure>,
}

impl Comparison {
    /// Whether anything new or modified was found
    pub fn has_changes(&self) -> bool {
        !self.new.is_empty() || !self.modified.is_empty()
    }

    /// Number of successfully classified files
    pub fn total(&self) -> usize {
        self.new.len() + self.modified.len() + self.unchanged.len()
    }

    /// Consume into one listing of every classified file
    pub fn into_listing(self) -> (Vec<ClassifiedFile>, Vec<FileFailure>) {
        let mut listing = self.new;
        listing.extend(self.modified);
        listing.extend(self.unchanged);
        (listing, self.failures)
    }
}

/// Hashes and classifies scanned files
#[derive(Debug, Clone, Copy, Default)]
pub struct FileComparator {
    digester: Digester,
}

impl FileComparator {
    /// Create a comparator hashing with `digester`
    pub fn new(digester: Digester) -> Self {
        Self { digester }
    }

    /// Classify a single already-hashed path
    pub fn classify(path_key: &str, hash: &ContentHash, recorded: &RecordedState) -> FileStatus {
        match recorded.get(path_key) {
            None => FileStatus::New,
            Some(previous) if previous != hash => FileStatus::Modified,
            Some(_) => FileStatus::Unchanged,
        }
    }

    /// Hash every file and split the listing into new, modified and unchanged
    pub fn compare(&self, files: Vec<ScannedFile>, recorded: &RecordedState) -> Comparison {
        let digester = self.digester;
        let hashed: Vec<_> = files
            .into_par_iter()
            .map(|file| {
                let hash = digester.digest_file(&file.absolute_path);
                (file, hash)
            })
            .collect();

        let mut comparison = Comparison::default();
        for (file, hash) in hashed {
            let hash = match hash {
                Ok(hash) => hash,
                Err(e) => {
                    warn!("Skipping {:?}: {}", file.absolute_path, e);
                    comparison
                        .failures
                        .push(FileFailure::new(&file.absolute_path, e));
                    continue;
                }
            };

            let key = file.path_key();
            let status = Self::classify(&key, &hash, recorded);
            trace!("{} -> {:?}", key, status);

            let classified = ClassifiedFile { file, hash, status };
            match status {
                FileStatus::New => comparison.new.push(classified),
                FileStatus::Modified => comparison.modified.push(classified),
                FileStatus::Unchanged => comparison.unchanged.push(classified),
            }
        }

        debug!(
            "Compared files: {} new, {} modified, {} unchanged, {} failed",
            comparison.new.len(),
            comparison.modified.len(),
            comparison.unchanged.len(),
            comparison.failures.len()
        );
        comparison
    }
}
