//! Runtime configuration
//!
//! [`CairnConfig`] collects every tunable the library and the binary use.
//! It deserializes from JSON with per-field defaults, so a config file only
//! needs to name the values it changes:
//!
//! ```json
//! {
//!   "database": "/var/backups/home.db",
//!   "hash_algorithm": "blake3",
//!   "ignore_patterns": ["*.tmp", "target/**"]
//! }
//! ```

use crate::compression::CompressionStrategy;
use crate::digest::HashAlgorithm;
use crate::error::{CairnError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for a [`Cairn`](crate::Cairn) instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CairnConfig {
    /// SQLite database file
    pub database: PathBuf,
    /// Digest used for content addressing; fixed for the lifetime of a store
    pub hash_algorithm: HashAlgorithm,
    /// Connection pool size
    pub max_connections: u32,
    /// Maximum concurrent per-file tasks during snapshot and restore
    pub parallel_workers: usize,
    /// Glob patterns, relative to the scanned root, excluded from snapshots
    pub ignore_patterns: Vec<String>,
    /// Files larger than this are skipped (0 = unlimited)
    pub max_file_size: u64,
    /// Whether symbolic links are followed during scans
    pub follow_symlinks: bool,
    /// Blob payload compression
    pub compression: CompressionStrategy,
    /// Directory snapshotted when none is given
    pub default_snapshot_dir: PathBuf,
    /// Directory restored into when none is given
    pub default_restore_dir: PathBuf,
}

impl Default for CairnConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("cairn.db"),
            hash_algorithm: HashAlgorithm::default(),
            max_connections: 5,
            parallel_workers: num_cpus::get(),
            ignore_patterns: Vec::new(),
            max_file_size: 0,
            follow_symlinks: false,
            compression: CompressionStrategy::default(),
            default_snapshot_dir: PathBuf::from("."),
            default_restore_dir: PathBuf::from("restored_files"),
        }
    }
}

impl CairnConfig {
    /// Load a JSON config file, filling unspecified fields with defaults
    ///
    /// # Errors
    ///
    /// - [`CairnError::Io`] if the file cannot be read
    /// - [`CairnError::Json`] if it is not valid JSON for this structure
    /// - [`CairnError::InvalidConfiguration`] if a value is out of range
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: CairnConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(CairnError::InvalidConfiguration(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.parallel_workers == 0 {
            return Err(CairnError::InvalidConfiguration(
                "parallel_workers must be at least 1".to_string(),
            ));
        }
        if self.database.as_os_str().is_empty() {
            return Err(CairnError::InvalidConfiguration(
                "database path must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
