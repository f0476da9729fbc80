//! # Cairn - Deduplicated directory snapshots
//!
//! Cairn records point-in-time snapshots of a directory tree into a
//! content-addressed store, and can later list, restore or prune them.
//!
//! ## Overview
//!
//! - **Complete snapshots**: every snapshot lists every file the directory
//!   held when it was taken, so any snapshot restores on its own without
//!   replaying history
//! - **Deduplication**: file bytes are stored once per distinct content hash,
//!   no matter how many paths or snapshots share them
//! - **Change detection**: files are compared against the most recently
//!   recorded hash for their path; an unchanged directory produces no snapshot
//! - **Safe reclamation**: pruning a snapshot deletes its file records, then
//!   reclaims only the content no surviving snapshot references
//!
//! ## Architecture
//!
//! Snapshotting flows one way (filesystem → hash → compare → store) and
//! restoring the other (store → filesystem). Pruning stays inside the store.
//!
//! - [`scanner`]: enumerates regular files under a root
//! - [`digest`]: streaming content hashes (SHA-256, SHA-512, BLAKE3)
//! - [`compare`]: classifies files as new, modified or unchanged
//! - [`store`]: the [`MetadataStore`] contract and its SQLite implementation
//! - [`snapshot`], [`restore`], [`prune`]: the engines
//! - [`Cairn`]: ties a store to the engines and serializes writers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cairn::{CairnBuilder, SnapshotOutcome};
//! use std::path::Path;
//!
//! # #[tokio::main]
//! # async fn main() -> cairn::Result<()> {
//! let cairn = CairnBuilder::new().database("backups.db").open().await?;
//!
//! match cairn.take_snapshot(Path::new("./project")).await? {
//!     SnapshotOutcome::Created(report) => {
//!         println!("Snapshot {} with {} files", report.snapshot.id, report.files_recorded);
//!     }
//!     SnapshotOutcome::NoChanges { .. } => println!("Nothing changed"),
//!     other => println!("{:?}", other),
//! }
//!
//! for snapshot in cairn.list_snapshots().await? {
//!     println!("{} | {}", snapshot.id, snapshot.formatted_timestamp());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Hash Algorithm
//!
//! A store is bound to the hash algorithm it was created with. Opening it
//! with a different one fails with [`CairnError::HashAlgorithmMismatch`]
//! rather than silently breaking deduplication.
//!
//! ## Error Handling
//!
//! Operations return [`Result<T, CairnError>`](Result). Problems confined to a
//! single file (unreadable during a snapshot, unwritable during a restore) are
//! not errors: they are collected on the operation's report and the rest of
//! the files are still processed.

pub mod cairn;
pub mod command;
pub mod compare;
pub mod compression;
pub mod config;
pub mod digest;
pub mod error;
pub mod prune;
pub mod restore;
pub mod scanner;
pub mod snapshot;
pub mod store;
pub mod types;

pub use crate::cairn::{Cairn, CairnBuilder};
pub use compression::CompressionStrategy;
pub use config::CairnConfig;
pub use digest::{Digester, HashAlgorithm};
pub use error::{CairnError, Result};
pub use store::{MetadataStore, SqliteStore};
pub use types::*;
