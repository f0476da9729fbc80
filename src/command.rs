//! Interactive command parsing
//!
//! Parses one line typed at the `cairn shell` prompt into a [`Command`].
//! Parsing validates arguments completely (snapshot ids, timestamps) so a
//! malformed command never reaches the store.
//!
//! ```rust
//! use cairn::command::Command;
//!
//! let command: Command = "prune-by-timestamp 2024-01-31 23:59:59".parse().unwrap();
//! assert!(matches!(command, Command::PruneByTimestamp { .. }));
//!
//! assert!("restore abc".parse::<Command>().is_err());
//! ```

use crate::error::{CairnError, Result};
use crate::types::{SnapshotId, TIMESTAMP_FORMAT};
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::LazyLock;

/// Literal `YYYY-MM-DD HH:MM:SS`, checked before date parsing
static TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}$").expect("timestamp regex is valid")
});

/// Prompt help listing every command
pub const HELP: &str = "\
Available commands (command <argument>):
  snapshot [directory]                     Take a snapshot
  list                                     List snapshots, most recent first
  restore <snapshot-id> [output-directory] Restore a snapshot
  prune <snapshot-id>                      Delete a snapshot
  prune-by-timestamp <YYYY-MM-DD HH:MM:SS> Delete snapshots older than a UTC time
  count                                    Count file records
  gc                                       Reclaim unreferenced content
  stats                                    Show store statistics
  help                                     Show this help
  exit                                     Close the store and quit";

/// One parsed prompt command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Snapshot a directory, the configured default if `None`
    Snapshot {
        /// Directory to snapshot
        directory: Option<PathBuf>,
    },
    /// List snapshots
    List,
    /// Restore a snapshot
    Restore {
        /// Snapshot to restore
        id: SnapshotId,
        /// Output directory, the configured default if `None`
        output: Option<PathBuf>,
    },
    /// Prune one snapshot
    Prune {
        /// Snapshot to delete
        id: SnapshotId,
    },
    /// Prune every snapshot strictly older than `cutoff`
    PruneByTimestamp {
        /// Cutoff, interpreted as UTC
        cutoff: DateTime<Utc>,
    },
    /// Count file records
    Count,
    /// Reclaim orphaned content
    Gc,
    /// Show store statistics
    Stats,
    /// Show help
    Help,
    /// Leave the prompt
    Exit,
}

impl FromStr for Command {
    type Err = CairnError;

    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        match word.to_ascii_lowercase().as_str() {
            "snapshot" => Ok(Command::Snapshot {
                directory: optional_path(rest),
            }),
            "list" => Ok(Command::List),
            "restore" => {
                let (id, output) = match rest.split_once(char::is_whitespace) {
                    Some((id, output)) => (id, output.trim()),
                    None => (rest, ""),
                };
                if id.is_empty() {
                    return Err(CairnError::MissingArgument(
                        "Snapshot ID for directory restoration".to_string(),
                    ));
                }
                Ok(Command::Restore {
                    id: id.parse()?,
                    output: optional_path(output),
                })
            }
            "prune" => {
                if rest.is_empty() {
                    return Err(CairnError::MissingArgument(
                        "Snapshot ID to prune".to_string(),
                    ));
                }
                Ok(Command::Prune { id: rest.parse()? })
            }
            "prune-by-timestamp" => Ok(Command::PruneByTimestamp {
                cutoff: parse_cutoff(rest)?,
            }),
            "count" => Ok(Command::Count),
            "gc" => Ok(Command::Gc),
            "stats" => Ok(Command::Stats),
            "help" | "?" => Ok(Command::Help),
            "exit" | "quit" => Ok(Command::Exit),
            _ => Err(CairnError::UnknownCommand(line.to_string())),
        }
    }
}

fn optional_path(raw: &str) -> Option<PathBuf> {
    (!raw.is_empty()).then(|| PathBuf::from(raw))
}

/// Parse a `YYYY-MM-DD HH:MM:SS` cutoff as UTC
///
/// The input must match the literal shape exactly and name a real date and
/// time; anything else is [`CairnError::InvalidTimestamp`].
pub fn parse_cutoff(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if !TIMESTAMP_RE.is_match(raw) {
        return Err(CairnError::InvalidTimestamp(raw.to_string()));
    }
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| CairnError::InvalidTimestamp(raw.to_string()))
}
