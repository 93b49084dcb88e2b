//! Command-line interface definitions for linkdupe.
//!
//! This module defines all CLI arguments, subcommands, and options using the clap derive API.
//! Global options control verbosity and error reporting; subcommands select the operation.
//!
//! # Example
//!
//! ```bash
//! # Replace duplicate files under ~/Photos with links into ~/Photos/.symlinks
//! linkdupe dedup ~/Photos --symlink-folder ~/Photos/.symlinks
//!
//! # Show what would happen without changing anything
//! linkdupe dedup ~/Photos --dry-run
//!
//! # Index two new files only
//! linkdupe dedup ~/Photos --add-file a.jpg b.jpg
//!
//! # Print checksums
//! linkdupe checksum --algo adler32 a.jpg b.jpg
//! ```

use clap::builder::{PossibleValuesParser, TypedValueParser};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::checksum::{available_algorithms, Algorithm};

/// Deduplicate files by replacing copies with links into a content pool.
///
/// Files with identical content are stored once in the pool directory. Every
/// original location becomes a symbolic link to that single copy. A SQLite
/// database inside the pool remembers what was already indexed.
#[derive(Debug, Parser)]
#[command(name = "linkdupe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for per-file progress, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Report errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands for linkdupe.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Replace duplicate files in a folder with links into the pool
    Dedup(DedupArgs),
    /// Print the checksum of one or more files
    Checksum(ChecksumArgs),
}

/// Arguments for the dedup subcommand.
#[derive(Debug, Args)]
pub struct DedupArgs {
    /// Folder to scan for duplicate files
    #[arg(value_name = "SOURCE_FOLDER")]
    pub source_folder: PathBuf,

    /// Folder holding the pooled files and the metadata database
    ///
    /// Created if it does not exist. Defaults to `.symlinks`.
    #[arg(long, value_name = "DIR")]
    pub symlink_folder: Option<PathBuf>,

    /// Index only these files; implies --no-index and --no-symlink-index
    #[arg(long = "add-file", value_name = "PATH", num_args = 1..)]
    pub add_files: Vec<PathBuf>,

    /// Do not scan the source folder
    #[arg(long)]
    pub no_index: bool,

    /// Do not re-index files already in the pool
    #[arg(long)]
    pub no_symlink_index: bool,

    /// Algorithm used to fingerprint file contents (default: crc32)
    #[arg(long, value_name = "ALGO", value_parser = algorithm_parser())]
    pub checksum_algo: Option<Algorithm>,

    /// Report decisions without touching files or the database
    #[arg(long)]
    pub dry_run: bool,

    /// Read size when streaming files (e.g., 64KiB, 1MiB)
    #[arg(long, value_name = "SIZE", value_parser = parse_chunk_size)]
    pub chunk_size: Option<usize>,
}

/// Arguments for the checksum subcommand.
#[derive(Debug, Args)]
pub struct ChecksumArgs {
    /// Files to checksum
    #[arg(value_name = "FILE", required = true)]
    pub files: Vec<PathBuf>,

    /// Checksum algorithm (default: crc32)
    #[arg(long, value_name = "ALGO", value_parser = algorithm_parser())]
    pub algo: Option<Algorithm>,

    /// Print only the decimal digest
    #[arg(long, conflicts_with = "hex_only")]
    pub dec_only: bool,

    /// Print only the hexadecimal digest
    #[arg(long)]
    pub hex_only: bool,
}

/// Which renderings of a digest to print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestFormat {
    Both,
    Decimal,
    Hex,
}

impl ChecksumArgs {
    #[must_use]
    pub fn digest_format(&self) -> DigestFormat {
        match (self.dec_only, self.hex_only) {
            (true, _) => DigestFormat::Decimal,
            (_, true) => DigestFormat::Hex,
            _ => DigestFormat::Both,
        }
    }
}

fn algorithm_parser() -> impl TypedValueParser<Value = Algorithm> {
    PossibleValuesParser::new(available_algorithms()).try_map(|name| name.parse::<Algorithm>())
}

/// Parse a human-readable size string into a chunk size.
///
/// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB (case-insensitive).
///
/// # Examples
///
/// ```
/// use linkdupe::cli::parse_chunk_size;
///
/// assert_eq!(parse_chunk_size("4096").unwrap(), 4096);
/// assert_eq!(parse_chunk_size("64KiB").unwrap(), 65536);
/// assert_eq!(parse_chunk_size("1MB").unwrap(), 1_000_000);
/// assert!(parse_chunk_size("0").is_err());
/// ```
///
/// # Errors
///
/// Returns an error string if the format is invalid or the size is zero.
pub fn parse_chunk_size(s: &str) -> Result<usize, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }

    // Find where the number ends and the suffix begins
    let (num_str, suffix) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => (&s[..idx], s[idx..].trim().to_uppercase()),
        None => (s, String::new()),
    };

    let num: usize = num_str
        .parse()
        .map_err(|_| format!("Invalid number: '{num_str}'"))?;

    let multiplier: usize = match suffix.as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1_000,
        "KIB" => 1_024,
        "MB" | "M" => 1_000_000,
        "MIB" => 1_048_576,
        "GB" | "G" => 1_000_000_000,
        "GIB" => 1_073_741_824,
        _ => return Err(format!("Unknown size suffix: '{suffix}'")),
    };

    let size = num
        .checked_mul(multiplier)
        .ok_or_else(|| format!("Size too large: '{s}'"))?;
    if size == 0 {
        return Err("Chunk size must be greater than zero".to_string());
    }
    Ok(size)
}
