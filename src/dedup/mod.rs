//! Content based deduplication into a pool of canonical files.
//!
//! # Overview
//!
//! A [`Deduplicator`] walks a source tree and decides for every regular
//! file whether it is new, unchanged, the first copy of its content or a
//! duplicate:
//!
//! 1. Files inside the pool directory are skipped.
//! 2. Files whose size and modification time match the stored record are
//!    skipped without reading them.
//! 3. Otherwise the file is fingerprinted and its record updated.
//! 4. If the pool already holds the fingerprint, the file is replaced by a
//!    link to that entry.
//! 5. If not, but other unlinked files share the fingerprint, the first of
//!    them is copied into the pool, and all of them plus the current file
//!    are replaced by links.
//!
//! The storage decides whether anything is persisted. With a
//! [`DryRunStorage`](crate::storage::DryRunStorage) and
//! [`DedupConfig::with_dry_run`] a run takes exactly the same decisions
//! without touching the filesystem or the database.
//!
//! # Example
//!
//! ```no_run
//! use linkdupe::dedup::{DedupConfig, Deduplicator, RunPlan};
//! use linkdupe::storage::SqliteMetadataStorage;
//! use std::path::Path;
//!
//! let storage = SqliteMetadataStorage::open(Path::new("photos/.symlinks")).unwrap();
//! let config = DedupConfig::new("photos", "photos/.symlinks");
//! let mut dedup = Deduplicator::new(config, storage).unwrap();
//! let summary = dedup.run(&RunPlan::full()).unwrap();
//! dedup.close().unwrap();
//! println!("{} files linked", summary.linked.len());
//! ```

pub mod pool;

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

use crate::checksum::{checksum_file, Algorithm, FingerprintError};
use crate::copy::{CopyError, DEFAULT_CHUNK_SIZE};
use crate::platform;
use crate::progress::{NoProgress, TransferProgress};
use crate::storage::{FileMetadata, MetadataStorage, StorageError};

/// Errors that abort a deduplication run.
#[derive(Debug, Error)]
pub enum DedupError {
    /// A file given to the deduplicator does not exist.
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    /// Links cannot be created on this system.
    #[error("cannot create symbolic links in {path}: {source}")]
    Platform {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),

    #[error(transparent)]
    Copy(#[from] CopyError),

    /// The source tree could not be walked.
    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    /// A filesystem operation failed.
    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DedupError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self {
        let path = path.to_path_buf();
        move |source| {
            if source.kind() == io::ErrorKind::NotFound {
                Self::NotFound(path)
            } else {
                Self::Io { path, source }
            }
        }
    }
}

/// Settings of a deduplication run.
#[derive(Debug, Clone)]
pub struct DedupConfig {
    /// Root of the tree to deduplicate
    pub source_folder: PathBuf,
    /// Directory holding the canonical copies
    pub symlink_folder: PathBuf,
    /// Fingerprint algorithm
    pub algorithm: Algorithm,
    /// Read size when streaming files
    pub chunk_size: usize,
    /// Take all decisions but leave the filesystem untouched
    pub dry_run: bool,
}

impl DedupConfig {
    /// Settings with the default algorithm and chunk size.
    #[must_use]
    pub fn new(source_folder: impl Into<PathBuf>, symlink_folder: impl Into<PathBuf>) -> Self {
        Self {
            source_folder: source_folder.into(),
            symlink_folder: symlink_folder.into(),
            algorithm: Algorithm::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            dry_run: false,
        }
    }

    #[must_use]
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// What a call to [`Deduplicator::run`] does.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunPlan {
    /// Index only these files. When non-empty both scans are skipped.
    pub add_files: Vec<PathBuf>,
    /// Walk the source tree
    pub index_sources: bool,
    /// Re-index the pool directory before walking the source tree
    pub index_pool: bool,
}

impl RunPlan {
    /// Re-index the pool, then walk the source tree.
    #[must_use]
    pub fn full() -> Self {
        Self {
            add_files: Vec::new(),
            index_sources: true,
            index_pool: true,
        }
    }

    /// Index only the given files.
    #[must_use]
    pub fn files(add_files: Vec<PathBuf>) -> Self {
        Self {
            add_files,
            index_sources: false,
            index_pool: false,
        }
    }

    /// Whether running this plan would do anything.
    #[must_use]
    pub fn has_work(&self) -> bool {
        !self.add_files.is_empty() || self.index_sources || self.index_pool
    }
}

/// Counters collected over a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupSummary {
    /// Paths considered, in the source tree and in the pool
    pub files_seen: usize,
    /// Paths left alone (pool contents, unchanged files, non-regular files)
    pub files_skipped: usize,
    /// Files read in full to compute a fingerprint
    pub files_fingerprinted: usize,
    /// New canonical entries written to the pool
    pub pool_entries_created: usize,
    /// Every path replaced by a link, in order
    pub linked: Vec<PathBuf>,
    /// Bytes no longer stored twice
    pub bytes_deduplicated: u64,
}

/// Drives fingerprinting, storage updates and linking.
pub struct Deduplicator<S> {
    source_folder: PathBuf,
    pool_dir: PathBuf,
    algorithm: Algorithm,
    chunk_size: usize,
    dry_run: bool,
    storage: S,
    progress: Box<dyn TransferProgress>,
    summary: DedupSummary,
    /// Paths a dry run pretends to have replaced by links
    simulated_links: HashSet<PathBuf>,
}

impl<S: MetadataStorage> Deduplicator<S> {
    /// Create a deduplicator over `storage`.
    ///
    /// Both folders are resolved to absolute paths. The pool folder does not
    /// need to exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be determined or a
    /// folder cannot be resolved.
    pub fn new(config: DedupConfig, storage: S) -> Result<Self, DedupError> {
        let source_folder = platform::normalize_dir(&config.source_folder)
            .map_err(DedupError::io(&config.source_folder))?;
        let pool_dir = platform::normalize_dir(&config.symlink_folder)
            .map_err(DedupError::io(&config.symlink_folder))?;
        Ok(Self {
            source_folder,
            pool_dir,
            algorithm: config.algorithm,
            chunk_size: config.chunk_size,
            dry_run: config.dry_run,
            storage,
            progress: Box::new(NoProgress),
            summary: DedupSummary::default(),
            simulated_links: HashSet::new(),
        })
    }

    /// Report file transfers to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Box<dyn TransferProgress>) -> Self {
        self.progress = progress;
        self
    }

    /// The resolved pool directory.
    #[must_use]
    pub fn pool_dir(&self) -> &Path {
        &self.pool_dir
    }

    /// The storage in use.
    #[must_use]
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Counters collected so far.
    #[must_use]
    pub fn summary(&self) -> &DedupSummary {
        &self.summary
    }

    /// Unwrap the deduplicator, returning its storage without closing it.
    #[must_use]
    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Close the underlying storage.
    pub fn close(&mut self) -> Result<(), DedupError> {
        self.storage.close().map_err(DedupError::from)
    }

    /// Execute `plan` and return the counters of this call.
    ///
    /// Explicit files are processed on their own. Otherwise the pool is
    /// re-indexed first so that changed pool entries are known before any
    /// source file is looked up.
    pub fn run(&mut self, plan: &RunPlan) -> Result<DedupSummary, DedupError> {
        let before = std::mem::take(&mut self.summary);

        let result = if plan.add_files.is_empty() {
            self.run_scans(plan)
        } else {
            plan.add_files
                .iter()
                .try_for_each(|path| self.add_file(path))
        };

        let summary = std::mem::replace(&mut self.summary, before);
        self.merge_summary(&summary);
        result.map(|()| summary)
    }

    fn run_scans(&mut self, plan: &RunPlan) -> Result<(), DedupError> {
        if plan.index_pool {
            log::debug!("Indexing pool entries in {}", self.pool_dir.display());
            self.index_symlink_files()?;
        }
        if plan.index_sources {
            log::debug!("Indexing source files in {}", self.source_folder.display());
            self.index_source_files()?;
        }
        Ok(())
    }

    fn merge_summary(&mut self, run: &DedupSummary) {
        let total = &mut self.summary;
        total.files_seen += run.files_seen;
        total.files_skipped += run.files_skipped;
        total.files_fingerprinted += run.files_fingerprinted;
        total.pool_entries_created += run.pool_entries_created;
        total.linked.extend(run.linked.iter().cloned());
        total.bytes_deduplicated += run.bytes_deduplicated;
    }

    /// Index a single file and link it if its content is already known.
    ///
    /// # Errors
    ///
    /// [`DedupError::NotFound`] if `path` does not exist. Storage and I/O
    /// errors abort the call.
    pub fn add_file(&mut self, path: &Path) -> Result<(), DedupError> {
        let path = platform::absolute_path(path).map_err(DedupError::io(path))?;
        let file_type = path
            .symlink_metadata()
            .map_err(DedupError::io(&path))?
            .file_type();

        self.summary.files_seen += 1;
        log::debug!("Indexing {}", path.display());

        if path.starts_with(&self.pool_dir) {
            log::debug!("Ignoring => in pool dir");
            self.summary.files_skipped += 1;
            return Ok(());
        }
        // A real run would find a symlink here.
        let linked = self.simulated_links.contains(&path);
        if !file_type.is_file() || linked || !self.should_index(&path, false)? {
            log::debug!("Ignoring => index not required");
            self.summary.files_skipped += 1;
            return Ok(());
        }

        let checksum = self.fingerprint(&path)?;
        self.storage.upsert_file(&path, checksum)?;

        if FileMetadata::read(&path)?.size == 0 {
            log::debug!("Not deduplicating empty file {}", path.display());
            return Ok(());
        }

        let mut pool_entry = self.storage.get_symlink_file(checksum)?;
        if pool_entry.is_none() {
            for candidate in self.storage.get_unlinked_files(checksum)? {
                if candidate == path {
                    continue;
                }
                if !candidate.symlink_metadata().is_ok_and(|m| m.is_file()) {
                    log::warn!(
                        "Indexed file {} is gone or no longer a regular file, skipping",
                        candidate.display()
                    );
                    continue;
                }
                if platform::same_file(&candidate, &path).map_err(DedupError::io(&candidate))? {
                    continue;
                }
                if !self.record_is_current(&candidate)? {
                    log::warn!(
                        "Indexed file {} changed since it was fingerprinted, skipping",
                        candidate.display()
                    );
                    continue;
                }
                pool_entry = Some(self.link(&candidate, checksum, pool_entry.take())?);
            }
        }

        if let Some(entry) = pool_entry {
            self.link(&path, checksum, Some(entry))?;
        }
        Ok(())
    }

    /// Walk the source tree depth first and index every file in it.
    ///
    /// The pool directory is not descended into when it lies inside the
    /// source tree. Symbolic links are never followed.
    pub fn index_source_files(&mut self) -> Result<(), DedupError> {
        let root = self.source_folder.clone();
        let pool_dir = self.pool_dir.clone();
        let walker = WalkDir::new(&root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !entry.path().starts_with(&pool_dir));

        for entry in walker {
            let entry = entry?;
            if entry.file_type().is_dir() {
                continue;
            }
            self.add_file(entry.path())?;
        }
        Ok(())
    }

    /// Re-fingerprint pool entries whose file changed since it was recorded.
    ///
    /// The scan is flat. Files in the pool without a record are left alone.
    pub fn index_symlink_files(&mut self) -> Result<(), DedupError> {
        let entries = match fs::read_dir(&self.pool_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound && self.dry_run => {
                log::debug!("Pool {} does not exist yet", self.pool_dir.display());
                return Ok(());
            }
            Err(source) => {
                return Err(DedupError::Io {
                    path: self.pool_dir.clone(),
                    source,
                })
            }
        };
        let mut paths = entries
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(DedupError::io(&self.pool_dir))?;
        paths.sort();

        for path in paths {
            if pool::is_reserved(&path) {
                continue;
            }
            self.summary.files_seen += 1;
            let is_file = path.symlink_metadata().is_ok_and(|m| m.is_file());
            if !is_file || !self.should_index(&path, true)? {
                self.summary.files_skipped += 1;
                continue;
            }
            log::debug!("Indexing {}", path.display());
            let checksum = self.fingerprint(&path)?;
            self.storage.upsert_symlink(&path, checksum)?;
        }
        Ok(())
    }

    /// Freshness check.
    ///
    /// Source files are indexed when they have no record or their record is
    /// stale. Pool files are indexed only when a stale record exists.
    fn should_index(&self, path: &Path, pool_entry: bool) -> Result<bool, DedupError> {
        let stored = if pool_entry {
            self.storage.get_stored_symlink_file_metadata(path)?
        } else {
            self.storage.get_stored_file_metadata(path)?
        };
        match stored {
            None => Ok(!pool_entry),
            Some(stored) => Ok(FileMetadata::read(path)? != stored),
        }
    }

    /// Whether the stored record of a source file still matches the disk.
    fn record_is_current(&self, path: &Path) -> Result<bool, DedupError> {
        let stored = self.storage.get_stored_file_metadata(path)?;
        Ok(stored == Some(FileMetadata::read(path)?))
    }

    fn fingerprint(&mut self, path: &Path) -> Result<u64, DedupError> {
        let checksum = checksum_file(path, self.algorithm, self.chunk_size, self.progress.as_ref())?;
        self.summary.files_fingerprinted += 1;
        log::debug!("=> checksum: {}", checksum);
        Ok(checksum)
    }

    /// Replace `path` by a link into the pool, creating the pool entry from
    /// `path` itself when `entry` is `None`. Returns the pool entry.
    fn link(
        &mut self,
        path: &Path,
        checksum: u64,
        entry: Option<PathBuf>,
    ) -> Result<PathBuf, DedupError> {
        let size = FileMetadata::read(path)?.size;
        let (entry, promoted) = match entry {
            Some(entry) => (entry, false),
            None => (self.promote(path, checksum)?, true),
        };

        self.storage.link_file_to_symlink(path, &entry)?;
        if self.dry_run {
            self.simulated_links.insert(path.to_path_buf());
        } else {
            fs::remove_file(path).map_err(DedupError::io(path))?;
            platform::create_file_link(&entry, path).map_err(DedupError::io(path))?;
        }
        log::info!("Linked {} -> {}", path.display(), entry.display());

        self.summary.linked.push(path.to_path_buf());
        if !promoted {
            self.summary.bytes_deduplicated += size;
        }
        Ok(entry)
    }

    /// Copy `path` into a new pool entry and record it.
    fn promote(&mut self, path: &Path, checksum: u64) -> Result<PathBuf, DedupError> {
        let entry = pool::new_entry_path(&self.pool_dir);
        if !self.dry_run {
            pool::write_entry(path, &entry, self.chunk_size, self.progress.as_ref())?;
        }
        if let Err(e) = self.storage.upsert_symlink(&entry, checksum) {
            if !self.dry_run {
                pool::discard_entry(&entry);
            }
            return Err(e.into());
        }
        log::info!(
            "Created pool entry {} with checksum {}",
            entry.display(),
            checksum
        );
        self.summary.pool_entries_created += 1;
        Ok(entry)
    }
}
