//! Error types for the Cairn library
//!
//! This module defines all error types that can occur during Cairn operations.
//! Failures that break an operation's precondition (a missing directory, a
//! malformed snapshot id, an unreachable store) surface as [`CairnError`].
//! Failures confined to a single file during snapshot or restore are not
//! errors: they are recorded on the operation's report and the operation
//! carries on with the remaining files.

use crate::digest::HashAlgorithm;
use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the Cairn library
pub type Result<T> = std::result::Result<T, CairnError>;

/// Main error type for all Cairn operations
#[derive(Debug, Error)]
pub enum CairnError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Scan target does not exist or is not a directory
    #[error("Directory not found: {0:?}")]
    DirectoryNotFound(PathBuf),

    /// Snapshot identifier is not a positive integer
    #[error("Invalid snapshot id: {0:?}")]
    InvalidSnapshotId(String),

    /// A single file could not be read
    #[error("Failed to read {path:?}: {source}")]
    FileRead {
        /// Path of the unreadable file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Any persistence call failed
    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Schema migration failed while opening the store
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Store was created with another hash algorithm
    #[error("Hash algorithm mismatch - store uses {stored}, configured {configured}")]
    HashAlgorithmMismatch {
        /// Algorithm recorded in the store
        stored: String,
        /// Algorithm in the current configuration
        configured: HashAlgorithm,
    },

    /// Timestamp does not match `YYYY-MM-DD HH:MM:SS` or is not a real date
    #[error("Invalid timestamp: {0:?}")]
    InvalidTimestamp(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Pattern parsing error
    #[error("Invalid ignore pattern: {0}")]
    InvalidPattern(#[from] globset::Error),

    /// Stored blob payload could not be decoded
    #[error("Decompression error: {0}")]
    Decompression(String),

    /// Interactive command could not be parsed
    #[error("Unknown command: {0:?}")]
    UnknownCommand(String),

    /// Interactive command is missing a required argument
    #[error("Missing argument: {0}")]
    MissingArgument(String),

    /// Background task panicked or was cancelled
    #[error("Task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CairnError {
    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        CairnError::Internal(msg.into())
    }

    /// Create a decompression error with a custom message
    pub fn decompression(msg: impl Into<String>) -> Self {
        CairnError::Decompression(msg.into())
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors are confined to their input: the next command
    /// can succeed without any change to the store or the environment.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CairnError::DirectoryNotFound(_)
                | CairnError::InvalidSnapshotId(_)
                | CairnError::InvalidTimestamp(_)
                | CairnError::UnknownCommand(_)
                | CairnError::MissingArgument(_)
                | CairnError::FileRead { .. }
        )
    }

    /// Check if this error came from the persistence backend
    pub fn is_store_failure(&self) -> bool {
        matches!(self, CairnError::Store(_) | CairnError::Migration(_))
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            CairnError::DirectoryNotFound(path) => {
                format!("Directory {:?} does not exist or is not a directory.", path)
            }
            CairnError::InvalidSnapshotId(raw) => {
                format!("'{}' is not a valid snapshot id. Use 'list' to see available snapshots.", raw)
            }
            CairnError::InvalidTimestamp(_) => {
                "Invalid timestamp, please use: YYYY-MM-DD HH:MM:SS".to_string()
            }
            CairnError::UnknownCommand(_) => {
                "Unknown command, type 'help' to see the available commands.".to_string()
            }
            CairnError::MissingArgument(what) => format!("{} is required.", what),
            CairnError::HashAlgorithmMismatch { stored, configured } => {
                format!(
                    "This store hashes content with {}, but {} is configured. \
                     Set the hash algorithm back to {} or use a new database.",
                    stored, configured, stored
                )
            }
            _ => self.to_string(),
        }
    }
}
