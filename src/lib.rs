//! linkdupe - content addressed file deduplication
//!
//! Files with identical content are replaced by symbolic links to a single
//! copy kept in a pool directory. A SQLite database in the pool records what
//! has been indexed, so later runs only read files that changed.
//!
//! The building blocks are usable on their own:
//!
//! - [`checksum`]: streaming fingerprint algorithms
//! - [`storage`]: the metadata store and its dry-run overlay
//! - [`dedup`]: the orchestrator tying both to the filesystem

pub mod checksum;
pub mod cli;
pub mod config;
pub mod copy;
pub mod dedup;
pub mod error;
pub mod logging;
pub mod platform;
pub mod progress;
pub mod storage;

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use bytesize::ByteSize;

use crate::checksum::checksum_file;
use crate::cli::{ChecksumArgs, Cli, Commands, DedupArgs, DigestFormat};
use crate::config::Config;
use crate::dedup::{DedupConfig, DedupError, DedupSummary, Deduplicator, RunPlan};
use crate::error::ExitCode;
use crate::progress::{NoProgress, Progress, TransferProgress};
use crate::storage::{DryRunStorage, MetadataStorage, SqliteMetadataStorage, DATABASE_FILE_NAME};

/// Run the command described by `cli`.
///
/// Logging must already be initialised.
///
/// # Errors
///
/// Returns any error that should end the process with
/// [`ExitCode::GeneralError`].
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    let config = Config::load()?;
    match cli.command {
        Commands::Checksum(args) => run_checksum(&args, &config),
        Commands::Dedup(args) => run_dedup(args, &config, !cli.quiet),
    }
}

fn run_checksum(args: &ChecksumArgs, config: &Config) -> Result<ExitCode> {
    let algorithm = match args.algo {
        Some(algorithm) => algorithm,
        None => config.algorithm()?,
    };
    let format = args.digest_format();

    for path in &args.files {
        if !path.is_file() {
            bail!("Not a file: {}", path.display());
        }
        let digest = checksum_file(path, algorithm, config.chunk_size, &NoProgress)
            .with_context(|| format!("Failed to checksum {}", path.display()))?;
        println!("{}", format_digest_line(path, digest, format));
    }
    Ok(ExitCode::Success)
}

/// One output line of the checksum command.
#[must_use]
pub fn format_digest_line(path: &Path, digest: u64, format: DigestFormat) -> String {
    match format {
        DigestFormat::Both => format!("{}\t{}\t{:#x}", path.display(), digest, digest),
        DigestFormat::Decimal => format!("{}\t{}", path.display(), digest),
        DigestFormat::Hex => format!("{}\t{:#x}", path.display(), digest),
    }
}

fn run_dedup(args: DedupArgs, config: &Config, show_progress: bool) -> Result<ExitCode> {
    let plan = if args.add_files.is_empty() {
        RunPlan {
            add_files: Vec::new(),
            index_sources: !args.no_index,
            index_pool: !args.no_symlink_index,
        }
    } else {
        RunPlan::files(args.add_files)
    };
    if !plan.has_work() {
        bail!("No work to do: --no-index and --no-symlink-index given without --add-file");
    }

    if !args.source_folder.is_dir() {
        bail!("Not a directory: {}", args.source_folder.display());
    }

    let pool_dir = args
        .symlink_folder
        .unwrap_or_else(|| config.symlink_folder.clone());
    let algorithm = match args.checksum_algo {
        Some(algorithm) => algorithm,
        None => config.algorithm()?,
    };
    let chunk_size = args.chunk_size.unwrap_or(config.chunk_size);

    let storage = if args.dry_run {
        open_dry_run_storage(&pool_dir)?
    } else {
        open_storage(&pool_dir)?
    };

    let dedup_config = DedupConfig::new(&args.source_folder, &pool_dir)
        .with_algorithm(algorithm)
        .with_chunk_size(chunk_size)
        .with_dry_run(args.dry_run);
    let progress: Box<dyn TransferProgress> = if show_progress {
        Box::new(Progress::default())
    } else {
        Box::new(NoProgress)
    };

    log::debug!(
        "Deduplicating {} into {} using {}",
        args.source_folder.display(),
        pool_dir.display(),
        algorithm
    );
    let mut dedup = Deduplicator::new(dedup_config, storage)?.with_progress(progress);
    let result = dedup.run(&plan);
    let closed = dedup.close();
    let summary = result?;
    closed?;

    println!("{}", format_summary(&summary, args.dry_run));
    Ok(ExitCode::Success)
}

/// Open the durable store, creating the pool and checking link support.
fn open_storage(pool_dir: &Path) -> Result<Box<dyn MetadataStorage>> {
    if pool_dir.exists() && !pool_dir.is_dir() {
        bail!("Could not create directory: {}", pool_dir.display());
    }
    fs::create_dir_all(pool_dir)
        .with_context(|| format!("Could not create directory: {}", pool_dir.display()))?;

    platform::ensure_link_support(pool_dir).map_err(|source| DedupError::Platform {
        path: pool_dir.to_path_buf(),
        source,
    })?;

    let storage = SqliteMetadataStorage::open(pool_dir)
        .with_context(|| format!("Failed to open metadata database in {}", pool_dir.display()))?;
    Ok(Box::new(storage))
}

/// Open the store read-only in effect, without creating anything on disk.
///
/// Without an existing database the overlay starts from an empty in-memory
/// store.
fn open_dry_run_storage(pool_dir: &Path) -> Result<Box<dyn MetadataStorage>> {
    if pool_dir.exists() && !pool_dir.is_dir() {
        bail!("Not a directory: {}", pool_dir.display());
    }
    let opened = if pool_dir.join(DATABASE_FILE_NAME).is_file() {
        SqliteMetadataStorage::open(pool_dir)
    } else {
        log::debug!(
            "No metadata database in {}, starting from an empty index",
            pool_dir.display()
        );
        SqliteMetadataStorage::open_in_memory()
    };
    let true_storage = opened.context("Failed to open metadata database")?;
    Ok(Box::new(DryRunStorage::new(true_storage)))
}

/// One line describing the outcome of a dedup run.
#[must_use]
pub fn format_summary(summary: &DedupSummary, dry_run: bool) -> String {
    let verb = if dry_run { "Would link" } else { "Linked" };
    format!(
        "{verb} {} files ({} saved), created {} pool entries; {} files seen, {} fingerprinted, {} unchanged or skipped",
        summary.linked.len(),
        ByteSize::b(summary.bytes_deduplicated),
        summary.pool_entries_created,
        summary.files_seen,
        summary.files_fingerprinted,
        summary.files_skipped,
    )
}
