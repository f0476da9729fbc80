//! # Cairn CLI - Deduplicated directory snapshots
//!
//! Command-line front end for the cairn library. Every operation is available
//! as a one-shot subcommand, and `cairn shell` opens an interactive prompt
//! that accepts the same commands until `exit`.
//!
//! ## Usage
//! ```bash
//! # Snapshot a directory
//! cairn snapshot ~/documents
//!
//! # List snapshots, most recent first
//! cairn list
//!
//! # Restore snapshot 3 into ./restored
//! cairn restore 3 ./restored
//!
//! # Delete everything older than a UTC cutoff
//! cairn prune-by-timestamp "2024-01-31 23:59:59"
//!
//! # Interactive prompt
//! cairn --database backups.db shell
//! ```

use clap::{Parser, Subcommand};
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use cairn::command::{self, Command, HELP};
use cairn::{
    Cairn, CairnConfig, CairnError, FileFailure, HashAlgorithm, PruneOutcome, RestoreOutcome,
    Result, SnapshotId, SnapshotOutcome,
};

/// Cairn CLI - point-in-time directory snapshots
#[derive(Parser)]
#[command(name = "cairn")]
#[command(version)]
#[command(about = "Snapshot directories into a deduplicated store, then restore or prune them")]
#[command(long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file (defaults to cairn.db)
    #[arg(short, long, global = true, env = "CAIRN_DATABASE")]
    database: Option<PathBuf>,

    /// Content hash algorithm: sha256, sha512 or blake3
    #[arg(long, global = true, env = "CAIRN_HASH")]
    hash: Option<String>,

    /// Connection pool size
    #[arg(long, global = true, env = "CAIRN_MAX_CONNECTIONS")]
    max_connections: Option<u32>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Take a snapshot of a directory
    #[command(alias = "snap")]
    Snapshot {
        /// Directory to snapshot (defaults to the configured directory)
        directory: Option<PathBuf>,
    },

    /// List snapshots, most recent first
    #[command(alias = "ls")]
    List,

    /// Restore a snapshot into a directory
    #[command(alias = "rs")]
    Restore {
        /// Snapshot ID
        snapshot: String,

        /// Output directory (defaults to the configured directory)
        output: Option<PathBuf>,
    },

    /// Delete one snapshot and reclaim its unshared content
    Prune {
        /// Snapshot ID
        snapshot: String,
    },

    /// Delete every snapshot older than a UTC time
    PruneByTimestamp {
        /// Cutoff as "YYYY-MM-DD HH:MM:SS"
        timestamp: String,
    },

    /// Count file records across all snapshots
    Count,

    /// Reclaim content no snapshot references
    Gc,

    /// Show store statistics
    Stats,

    /// Open an interactive prompt
    Shell,
}

impl Commands {
    /// The prompt command equivalent to this subcommand, `None` for the shell
    fn into_command(self) -> Result<Option<Command>> {
        Ok(Some(match self {
            Commands::Snapshot { directory } => Command::Snapshot { directory },
            Commands::List => Command::List,
            Commands::Restore { snapshot, output } => Command::Restore {
                id: snapshot.parse()?,
                output,
            },
            Commands::Prune { snapshot } => Command::Prune {
                id: snapshot.parse()?,
            },
            Commands::PruneByTimestamp { timestamp } => Command::PruneByTimestamp {
                cutoff: command::parse_cutoff(&timestamp)?,
            },
            Commands::Count => Command::Count,
            Commands::Gc => Command::Gc,
            Commands::Stats => Command::Stats,
            Commands::Shell => return Ok(None),
        }))
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("cairn=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli).await {
        eprintln!("{}: {}", "Error".red().bold(), e.user_message());
        std::process::exit(1);
    }
}

/// Main command runner
async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    // Argument errors surface before the store is opened
    let command = cli.command.into_command()?;

    let cairn = Cairn::open(config).await?;
    let result = match command {
        Some(command) => dispatch(&cairn, command).await.map(|_| ()),
        None => run_shell(&cairn).await,
    };
    cairn.close().await;
    result
}

/// Defaults, then the config file, then flags and environment
fn load_config(cli: &Cli) -> Result<CairnConfig> {
    let mut config = match &cli.config {
        Some(path) => CairnConfig::from_file(path)?,
        None => CairnConfig::default(),
    };
    if let Some(database) = &cli.database {
        config.database = database.clone();
    }
    if let Some(hash) = &cli.hash {
        config.hash_algorithm = hash.parse::<HashAlgorithm>()?;
    }
    if let Some(max_connections) = cli.max_connections {
        config.max_connections = max_connections;
    }
    config.validate()?;
    Ok(config)
}

/// Whether the prompt should keep reading after a command
enum Flow {
    Continue,
    Exit,
}

/// Interactive prompt
///
/// A failed command prints its diagnostic and the prompt keeps running.
/// `exit` or end of input leaves the loop; the caller closes the store.
async fn run_shell(cairn: &Cairn) -> Result<()> {
    println!("{}", "Cairn interactive shell".blue().bold());
    println!("{}", "Type 'help' to see the available commands.".dimmed());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", ">".green().bold());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let outcome = match line.parse::<Command>() {
            Ok(command) => dispatch(cairn, command).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(Flow::Continue) => {}
            Ok(Flow::Exit) => break,
            Err(e) => print_error(&e),
        }
    }

    println!("Have a nice day!");
    Ok(())
}

fn print_error(error: &CairnError) {
    if error.is_recoverable() {
        println!("{} {}", "✗".red().bold(), error.user_message());
    } else {
        eprintln!("{}: {}", "Error".red().bold(), error.user_message());
    }
}

/// Run one command against the store
async fn dispatch(cairn: &Cairn, command: Command) -> Result<Flow> {
    match command {
        Command::Snapshot { directory } => {
            let directory = directory.unwrap_or_else(|| cairn.config().default_snapshot_dir.clone());
            cmd_snapshot(cairn, &directory).await?;
        }
        Command::List => cmd_list(cairn).await?,
        Command::Restore { id, output } => {
            let output = output.unwrap_or_else(|| cairn.config().default_restore_dir.clone());
            cmd_restore(cairn, id, &output).await?;
        }
        Command::Prune { id } => cmd_prune(cairn, id).await?,
        Command::PruneByTimestamp { cutoff } => cmd_prune_by_timestamp(cairn, cutoff).await?,
        Command::Count => {
            let count = cairn.count_file_records().await?;
            println!("Total file records: {}", count.to_string().cyan());
        }
        Command::Gc => cmd_gc(cairn).await?,
        Command::Stats => cmd_stats(cairn).await?,
        Command::Help => println!("{}", HELP),
        Command::Exit => return Ok(Flow::Exit),
    }
    Ok(Flow::Continue)
}

/// Take a snapshot
///
/// Only files that are new or changed since the last recorded state get new
/// content; the snapshot still lists every file in the directory.
async fn cmd_snapshot(cairn: &Cairn, directory: &Path) -> Result<()> {
    println!(
        "{} {}",
        "Snapshotting".blue().bold(),
        directory.display().to_string().yellow()
    );

    let pb = spinner("Scanning files...");
    let outcome = cairn.take_snapshot(directory).await;
    pb.finish_and_clear();

    match outcome? {
        SnapshotOutcome::Created(report) => {
            println!(
                "{} Created snapshot {}",
                "✓".green().bold(),
                report.snapshot.id.to_string().yellow().bold()
            );
            println!("  Taken at: {}", report.snapshot.formatted_timestamp().cyan());
            println!("  Files: {}", report.files_recorded.to_string().cyan());
            println!(
                "  New: {}  Modified: {}  Unchanged: {}",
                report.files_new.to_string().green(),
                report.files_modified.to_string().yellow(),
                report.files_unchanged.to_string().dimmed()
            );
            println!(
                "  Stored: {} in {} new blobs",
                format_bytes(report.bytes_stored).cyan(),
                report.blobs_created.to_string().cyan()
            );
            println!("  Time: {}", millis(report.duration_ms).cyan());
            print_failures("Skipped files", &report.failures);
        }
        SnapshotOutcome::NoChanges {
            files_scanned,
            failures,
        } => {
            println!(
                "{} No changes detected in {} files, no snapshot taken",
                "•".blue().bold(),
                files_scanned
            );
            print_failures("Unreadable files", &failures);
        }
        SnapshotOutcome::EmptyDirectory => {
            println!("{} Directory has no files, no snapshot taken", "•".blue().bold());
        }
        SnapshotOutcome::NoValidFiles { failures } => {
            println!(
                "{} No valid files could be recorded, no snapshot taken",
                "✗".red().bold()
            );
            print_failures("Failed files", &failures);
        }
    }
    Ok(())
}

/// List snapshots as `id | timestamp`
async fn cmd_list(cairn: &Cairn) -> Result<()> {
    let snapshots = cairn.list_snapshots().await?;
    if snapshots.is_empty() {
        println!("{}", "No snapshots found".yellow());
        return Ok(());
    }

    for snapshot in &snapshots {
        println!(
            "{} | {}",
            snapshot.id.to_string().yellow(),
            snapshot.formatted_timestamp()
        );
    }
    Ok(())
}

/// Restore a snapshot
///
/// Files are written under `output`, overwriting anything already at the
/// same path. Files in `output` that the snapshot does not list are left alone.
async fn cmd_restore(cairn: &Cairn, id: SnapshotId, output: &Path) -> Result<()> {
    println!(
        "{} {} into {}",
        "Restoring snapshot".blue().bold(),
        id.to_string().yellow(),
        output.display().to_string().yellow()
    );

    let pb = spinner("Restoring files...");
    let outcome = cairn.restore(id, output).await;
    pb.finish_and_clear();

    match outcome? {
        RestoreOutcome::Restored(result) => {
            println!("{} Restoration complete", "✓".green().bold());
            println!("  Files restored: {}", result.files_restored.to_string().cyan());
            println!("  Bytes written: {}", format_bytes(result.bytes_written).cyan());
            println!("  Time: {}", millis(result.duration_ms).cyan());
            print_failures("Failed files", &result.failures);
        }
        RestoreOutcome::NotFound(id) => {
            println!("{} No snapshot found with ID: {}", "✗".red().bold(), id);
        }
        RestoreOutcome::Empty(id) => {
            println!("{} Snapshot {} has no files to restore", "•".blue().bold(), id);
        }
    }
    Ok(())
}

/// Delete one snapshot
async fn cmd_prune(cairn: &Cairn, id: SnapshotId) -> Result<()> {
    match cairn.prune_by_id(id).await? {
        PruneOutcome::Pruned(report) => {
            println!(
                "{} Pruned snapshot {}",
                "✓".green().bold(),
                id.to_string().yellow().bold()
            );
            println!(
                "  File records deleted: {}",
                report.deleted.file_records_deleted.to_string().cyan()
            );
            println!(
                "  Blobs reclaimed: {} ({})",
                report.reclaimed.blobs_deleted.to_string().green(),
                format_bytes(report.reclaimed.bytes_reclaimed).green()
            );
        }
        PruneOutcome::NotFound(id) => {
            println!("{} No snapshot found with ID: {}", "✗".red().bold(), id);
        }
    }
    Ok(())
}

/// Delete snapshots strictly older than `cutoff`
async fn cmd_prune_by_timestamp(cairn: &Cairn, cutoff: chrono::DateTime<chrono::Utc>) -> Result<()> {
    let report = cairn.prune_older_than(cutoff).await?;
    println!(
        "{} Pruned {} snapshots older than {}",
        "✓".green().bold(),
        report.deleted.snapshots_deleted.to_string().yellow().bold(),
        cutoff.format(cairn::TIMESTAMP_FORMAT).to_string().cyan()
    );
    println!(
        "  File records deleted: {}",
        report.deleted.file_records_deleted.to_string().cyan()
    );
    println!(
        "  Blobs reclaimed: {} ({})",
        report.reclaimed.blobs_deleted.to_string().green(),
        format_bytes(report.reclaimed.bytes_reclaimed).green()
    );
    Ok(())
}

/// Reclaim orphaned content
async fn cmd_gc(cairn: &Cairn) -> Result<()> {
    let start = Instant::now();
    println!("{}", "Running garbage collection...".blue().bold());
    let stats = cairn.collect_garbage().await?;

    println!("{} Garbage collection complete", "✓".green().bold());
    println!("  Blobs deleted: {}", stats.blobs_deleted.to_string().green());
    println!("  Space reclaimed: {}", format_bytes(stats.bytes_reclaimed).green());
    println!("  Time: {}", format_duration(trim_millis(start.elapsed())).to_string().cyan());
    Ok(())
}

/// Store-wide counts
async fn cmd_stats(cairn: &Cairn) -> Result<()> {
    let stats = cairn.stats().await?;
    println!("{}", "Store Statistics".bold());
    println!("  Database: {}", cairn.config().database.display());
    println!("  Hash algorithm: {}", cairn.config().hash_algorithm);
    println!("  Snapshots: {}", stats.snapshots.to_string().cyan());
    println!("  File records: {}", stats.file_records.to_string().cyan());
    println!("  Content blobs: {}", stats.content_blobs.to_string().cyan());
    println!("  Content size: {}", format_bytes(stats.content_bytes).cyan());
    Ok(())
}

fn spinner(message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Print at most ten per-file failures
fn print_failures(title: &str, failures: &[FileFailure]) {
    if failures.is_empty() {
        return;
    }
    println!("\n{}", format!("{}:", title).yellow().bold());
    for failure in failures.iter().take(10) {
        println!("  - {}: {}", failure.path.display(), failure.reason.yellow());
    }
    if failures.len() > 10 {
        println!("  ... and {} more", (failures.len() - 10).to_string().dimmed());
    }
}

fn millis(ms: u64) -> String {
    format_duration(Duration::from_millis(ms)).to_string()
}

fn trim_millis(duration: Duration) -> Duration {
    Duration::from_millis(duration.as_millis() as u64)
}

/// Format bytes in human-readable form
fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
