//! Dry-run overlay over a durable metadata storage.
//!
//! [`DryRunStorage`] wraps a real store without ever writing to it. Writes
//! are described in the log and kept in memory; reads merge the pending
//! writes with the wrapped store, so a whole run sees the same state it
//! would have seen if the writes had been real.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use super::{FileMetadata, MetadataStorage, StorageError, StorageResult};

/// A write held in memory.
#[derive(Debug, Clone)]
struct Pending {
    /// `None` for pool entries that were never materialized on disk
    metadata: Option<FileMetadata>,
    checksum: u64,
    /// Insertion sequence, for deterministic query order
    seq: u64,
}

impl Pending {
    fn is_empty_file(&self) -> bool {
        self.metadata.is_some_and(|m| m.size == 0)
    }
}

/// Simulating [`MetadataStorage`] that never mutates the wrapped store.
#[derive(Debug)]
pub struct DryRunStorage<S> {
    true_storage: S,
    inserted_files: HashMap<PathBuf, Pending>,
    inserted_symlinks: HashMap<PathBuf, Pending>,
    linked_files: HashSet<PathBuf>,
    next_seq: u64,
}

impl<S: MetadataStorage> DryRunStorage<S> {
    /// Wrap `true_storage`; it is only ever read from.
    #[must_use]
    pub fn new(true_storage: S) -> Self {
        Self {
            true_storage,
            inserted_files: HashMap::new(),
            inserted_symlinks: HashMap::new(),
            linked_files: HashSet::new(),
            next_seq: 0,
        }
    }

    /// The wrapped store.
    #[must_use]
    pub fn true_storage(&self) -> &S {
        &self.true_storage
    }

    /// Unwrap the overlay, dropping all pending writes.
    #[must_use]
    pub fn into_inner(self) -> S {
        self.true_storage
    }

    /// Paths simulated as linked so far.
    #[must_use]
    pub fn linked_files(&self) -> &HashSet<PathBuf> {
        &self.linked_files
    }

    fn pending(&mut self, metadata: Option<FileMetadata>, checksum: u64) -> Pending {
        let seq = self.next_seq;
        self.next_seq += 1;
        Pending {
            metadata,
            checksum,
            seq,
        }
    }

    /// Paths in `source` holding `checksum`, in insertion order.
    fn matching(source: &HashMap<PathBuf, Pending>, checksum: u64) -> Vec<PathBuf> {
        let mut found: Vec<(&PathBuf, &Pending)> = source
            .iter()
            .filter(|(_, pending)| pending.checksum == checksum && !pending.is_empty_file())
            .collect();
        found.sort_by_key(|(_, pending)| pending.seq);
        found.into_iter().map(|(path, _)| path.clone()).collect()
    }
}

impl<S: MetadataStorage> MetadataStorage for DryRunStorage<S> {
    fn upsert_file(&mut self, path: &Path, checksum: u64) -> StorageResult<()> {
        let metadata = FileMetadata::read(path)?;
        log::info!(
            "dry-run: upsert {} with checksum {}",
            path.display(),
            checksum
        );
        let pending = self.pending(Some(metadata), checksum);
        self.inserted_files.insert(path.to_path_buf(), pending);
        self.linked_files.remove(path);
        Ok(())
    }

    fn upsert_symlink(&mut self, path: &Path, checksum: u64) -> StorageResult<()> {
        // A simulated promotion never writes the pool file.
        let metadata = match FileMetadata::read(path) {
            Ok(metadata) => Some(metadata),
            Err(StorageError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };

        let conflict = Self::matching(&self.inserted_symlinks, checksum)
            .into_iter()
            .find(|other| other != path)
            .or(self
                .true_storage
                .get_symlink_file(checksum)?
                .filter(|other| other != path));
        if let Some(other) = conflict {
            return Err(StorageError::ConstraintViolation {
                path: path.to_path_buf(),
                message: format!("checksum {checksum} already pooled at {}", other.display()),
            });
        }

        log::info!(
            "dry-run: upsert pool entry {} with checksum {}",
            path.display(),
            checksum
        );
        let pending = self.pending(metadata, checksum);
        self.inserted_symlinks.insert(path.to_path_buf(), pending);
        Ok(())
    }

    fn link_file_to_symlink(&mut self, path: &Path, pool_path: &Path) -> StorageResult<()> {
        let pool_known = self.inserted_symlinks.contains_key(pool_path)
            || self
                .true_storage
                .get_stored_symlink_file_metadata(pool_path)?
                .is_some();
        if !pool_known {
            return Err(StorageError::NotFound(pool_path.to_path_buf()));
        }
        let file_known = self.inserted_files.contains_key(path)
            || self.true_storage.get_stored_file_metadata(path)?.is_some();
        if !file_known {
            return Err(StorageError::NotFound(path.to_path_buf()));
        }

        log::info!("dry-run: link {} to {}", path.display(), pool_path.display());
        self.linked_files.insert(path.to_path_buf());
        Ok(())
    }

    fn get_unlinked_files(&self, checksum: u64) -> StorageResult<Vec<PathBuf>> {
        let mut paths: Vec<PathBuf> = self
            .true_storage
            .get_unlinked_files(checksum)?
            .into_iter()
            // A pending upsert of the same path supersedes the stored checksum.
            .filter(|path| !self.inserted_files.contains_key(path))
            .collect();
        paths.extend(Self::matching(&self.inserted_files, checksum));
        paths.retain(|path| !self.linked_files.contains(path));
        Ok(paths)
    }

    fn get_symlink_file(&self, checksum: u64) -> StorageResult<Option<PathBuf>> {
        if let Some(path) = Self::matching(&self.inserted_symlinks, checksum)
            .into_iter()
            .next()
        {
            return Ok(Some(path));
        }
        self.true_storage.get_symlink_file(checksum)
    }

    fn get_stored_file_metadata(&self, path: &Path) -> StorageResult<Option<FileMetadata>> {
        if self.linked_files.contains(path) {
            return Ok(None);
        }
        match self.inserted_files.get(path) {
            Some(pending) => Ok(pending.metadata),
            None => self.true_storage.get_stored_file_metadata(path),
        }
    }

    fn get_stored_symlink_file_metadata(
        &self,
        path: &Path,
    ) -> StorageResult<Option<FileMetadata>> {
        match self.inserted_symlinks.get(path) {
            Some(pending) => Ok(pending.metadata),
            None => self.true_storage.get_stored_symlink_file_metadata(path),
        }
    }

    fn close(&mut self) -> StorageResult<()> {
        self.true_storage.close()
    }
}
