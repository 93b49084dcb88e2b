#![allow(dead_code)]

use linkdupe::dedup::{DedupConfig, Deduplicator};
use linkdupe::storage::{DryRunStorage, SqliteMetadataStorage};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A scratch source tree with a pool folder next to it.
pub struct Workspace {
    pub dir: TempDir,
    pub source: PathBuf,
    pub pool: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let source = fs::canonicalize(dir.path()).unwrap().join("source");
        let pool = fs::canonicalize(dir.path()).unwrap().join("pool");
        fs::create_dir_all(&source).unwrap();
        Self { dir, source, pool }
    }

    pub fn write(&self, relative: &str, content: &[u8]) -> PathBuf {
        let path = self.source.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    pub fn config(&self) -> DedupConfig {
        DedupConfig::new(&self.source, &self.pool)
    }

    pub fn deduplicator(&self) -> Deduplicator<SqliteMetadataStorage> {
        let storage = SqliteMetadataStorage::open(&self.pool).unwrap();
        Deduplicator::new(self.config(), storage).unwrap()
    }

    pub fn dry_run_deduplicator(&self) -> Deduplicator<DryRunStorage<SqliteMetadataStorage>> {
        let storage = DryRunStorage::new(SqliteMetadataStorage::open(&self.pool).unwrap());
        Deduplicator::new(self.config().with_dry_run(true), storage).unwrap()
    }

    /// Pool entries on disk, without the database files.
    pub fn pool_entries(&self) -> Vec<PathBuf> {
        let mut entries: Vec<PathBuf> = fs::read_dir(&self.pool)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| !p.file_name().unwrap().to_string_lossy().starts_with("data.sqlite3"))
            .collect();
        entries.sort();
        entries
    }
}

pub fn is_symlink(path: &Path) -> bool {
    path.symlink_metadata().unwrap().file_type().is_symlink()
}
