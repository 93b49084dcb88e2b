//! Layout of the pool directory.
//!
//! Pool entries are named by a random UUID. A new entry is first written to
//! a hidden `.<uuid>.partial` file, synced, and then renamed into place, so
//! a completed entry name never refers to a half written blob.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::DedupError;
use crate::copy::copy_stream;
use crate::progress::TransferProgress;
use crate::storage::DATABASE_FILE_NAME;

const PARTIAL_SUFFIX: &str = ".partial";

/// A fresh, unused entry path inside `pool_dir`.
#[must_use]
pub fn new_entry_path(pool_dir: &Path) -> PathBuf {
    pool_dir.join(Uuid::new_v4().to_string())
}

fn partial_path(entry: &Path) -> PathBuf {
    let name = entry
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    entry.with_file_name(format!(".{name}{PARTIAL_SUFFIX}"))
}

/// Whether a file in the pool directory must never be indexed as an entry.
///
/// This covers the metadata database with its journal files and unfinished
/// `.partial` copies.
#[must_use]
pub fn is_reserved(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy())
        .is_some_and(|name| name.starts_with(DATABASE_FILE_NAME) || name.ends_with(PARTIAL_SUFFIX))
}

/// Copy the whole of `source` into the pool at `entry`.
///
/// Returns the number of bytes written. On failure no file is left at
/// `entry` and the partial copy is removed.
pub fn write_entry(
    source: &Path,
    entry: &Path,
    chunk_size: usize,
    progress: &dyn TransferProgress,
) -> Result<u64, DedupError> {
    let partial = partial_path(entry);
    let result = copy_into(source, &partial, chunk_size, progress).and_then(|copied| {
        fs::rename(&partial, entry).map_err(|source| DedupError::Io {
            path: entry.to_path_buf(),
            source,
        })?;
        Ok(copied)
    });
    if result.is_err() {
        if let Err(e) = fs::remove_file(&partial) {
            if e.kind() != io::ErrorKind::NotFound {
                log::warn!("Could not remove {}: {}", partial.display(), e);
            }
        }
    }
    result
}

fn copy_into(
    source: &Path,
    partial: &Path,
    chunk_size: usize,
    progress: &dyn TransferProgress,
) -> Result<u64, DedupError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: io::Error| DedupError::Io { path, source }
    };

    let mut input = File::open(source).map_err(io_err(source))?;
    let size = input.metadata().map_err(io_err(source))?.len();
    let mut output = File::create(partial).map_err(io_err(partial))?;

    progress.on_start(source, size);
    let copied = copy_stream(&mut input, &mut output, Some(size), chunk_size, progress);
    progress.on_finish();
    let copied = copied?;

    output.sync_all().map_err(io_err(partial))?;
    Ok(copied)
}

/// Remove a pool entry that could not be recorded.
pub fn discard_entry(entry: &Path) {
    match fs::remove_file(entry) {
        Ok(()) => log::debug!("Removed unrecorded pool entry {}", entry.display()),
        Err(e) => log::warn!(
            "Could not remove unrecorded pool entry {}: {}",
            entry.display(),
            e
        ),
    }
}
