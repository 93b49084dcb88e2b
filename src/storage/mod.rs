//! Metadata storage for indexed files and pool entries.
//!
//! This module persists what the deduplicator knows about the filesystem,
//! so unchanged files are not fingerprinted again on the next run.
//!
//! # Architecture
//!
//! Two logical tables are kept behind the [`MetadataStorage`] trait:
//!
//! * **files**: one record per indexed source path, holding its size,
//!   modification time and checksum, or a reference to a pool entry once the
//!   path has been replaced by a link.
//! * **pool entries**: one record per canonical blob in the pool directory,
//!   unique per checksum.
//!
//! Implementations:
//!
//! * [`sqlite`]: the durable store, a SQLite database inside the pool.
//! * [`dry_run`]: an overlay that records writes in memory and reads through
//!   to a durable store, used to simulate a run without side effects.
//!
//! # Freshness
//!
//! [`FileMetadata`] (size and whole-second mtime) is stored with every record.
//! When the values read from disk match the stored ones, the file is
//! considered unchanged.

pub mod dry_run;
pub mod sqlite;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub use dry_run::DryRunStorage;
pub use sqlite::SqliteMetadataStorage;

/// Name of the database file inside the pool directory.
pub const DATABASE_FILE_NAME: &str = "data.sqlite3";

/// Size and modification time of a file, as used for freshness checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileMetadata {
    /// File size in bytes
    pub size: u64,
    /// Last modification time in whole seconds since the Unix epoch
    pub modified: i64,
}

impl FileMetadata {
    #[must_use]
    pub fn new(size: u64, modified: i64) -> Self {
        Self { size, modified }
    }

    /// Read the current metadata of `path` from the filesystem.
    ///
    /// Symbolic links are followed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the path does not exist, or
    /// [`StorageError::Io`] for other failures.
    pub fn read(path: &Path) -> StorageResult<Self> {
        let metadata = fs::metadata(path).map_err(|source| StorageError::from_io(path, source))?;
        let modified = metadata
            .modified()
            .map_err(|source| StorageError::from_io(path, source))?;
        Ok(Self {
            size: metadata.len(),
            modified: unix_seconds(modified),
        })
    }
}

/// Whole seconds since the Unix epoch, negative for earlier times.
fn unix_seconds(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_secs() as i64,
        Err(before) => {
            let d = before.duration();
            let secs = d.as_secs() as i64;
            if d.subsec_nanos() > 0 {
                -secs - 1
            } else {
                -secs
            }
        }
    }
}

/// Errors that can occur in a metadata storage.
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    /// A referenced path is not present on disk or in the store.
    #[error("not found: {0}")]
    NotFound(PathBuf),

    /// A unique path or checksum constraint would be violated.
    #[error("constraint violation for {path}: {message}")]
    ConstraintViolation { path: PathBuf, message: String },

    /// The database reported an error.
    #[error("database error: {0}")]
    Database(#[source] rusqlite::Error),

    /// The storage was already closed.
    #[error("metadata storage is closed")]
    Closed,

    /// A filesystem operation failed.
    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    fn from_io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound(path.to_path_buf())
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence interface over the files and pool-entry tables.
///
/// All paths are absolute. Checksums are the raw `u64` digests.
pub trait MetadataStorage {
    /// Insert or update the record of a source file.
    ///
    /// Size and modification time are read from the filesystem at call time.
    fn upsert_file(&mut self, path: &Path, checksum: u64) -> StorageResult<()>;

    /// Insert or update the record of a pool entry.
    ///
    /// # Errors
    ///
    /// [`StorageError::ConstraintViolation`] if another pool entry already
    /// holds this checksum.
    fn upsert_symlink(&mut self, path: &Path, checksum: u64) -> StorageResult<()>;

    /// Mark `path` as replaced by a link to the pool entry at `pool_path`.
    ///
    /// The file record loses its size, modification time and checksum.
    ///
    /// # Errors
    ///
    /// [`StorageError::NotFound`] if `pool_path` has no pool entry.
    fn link_file_to_symlink(&mut self, path: &Path, pool_path: &Path) -> StorageResult<()>;

    /// Paths of unlinked, non-empty files with the given checksum.
    fn get_unlinked_files(&self, checksum: u64) -> StorageResult<Vec<PathBuf>>;

    /// Path of the pool entry holding the given checksum, if any.
    fn get_symlink_file(&self, checksum: u64) -> StorageResult<Option<PathBuf>>;

    /// Last stored metadata of a source file.
    ///
    /// `None` if the path was never indexed or has been linked.
    fn get_stored_file_metadata(&self, path: &Path) -> StorageResult<Option<FileMetadata>>;

    /// Last stored metadata of a pool entry.
    fn get_stored_symlink_file_metadata(&self, path: &Path)
        -> StorageResult<Option<FileMetadata>>;

    /// Release underlying resources. Calling it again is a no-op.
    fn close(&mut self) -> StorageResult<()>;
}

impl<S: MetadataStorage + ?Sized> MetadataStorage for Box<S> {
    fn upsert_file(&mut self, path: &Path, checksum: u64) -> StorageResult<()> {
        (**self).upsert_file(path, checksum)
    }

    fn upsert_symlink(&mut self, path: &Path, checksum: u64) -> StorageResult<()> {
        (**self).upsert_symlink(path, checksum)
    }

    fn link_file_to_symlink(&mut self, path: &Path, pool_path: &Path) -> StorageResult<()> {
        (**self).link_file_to_symlink(path, pool_path)
    }

    fn get_unlinked_files(&self, checksum: u64) -> StorageResult<Vec<PathBuf>> {
        (**self).get_unlinked_files(checksum)
    }

    fn get_symlink_file(&self, checksum: u64) -> StorageResult<Option<PathBuf>> {
        (**self).get_symlink_file(checksum)
    }

    fn get_stored_file_metadata(&self, path: &Path) -> StorageResult<Option<FileMetadata>> {
        (**self).get_stored_file_metadata(path)
    }

    fn get_stored_symlink_file_metadata(
        &self,
        path: &Path,
    ) -> StorageResult<Option<FileMetadata>> {
        (**self).get_stored_symlink_file_metadata(path)
    }

    fn close(&mut self) -> StorageResult<()> {
        (**self).close()
    }
}
