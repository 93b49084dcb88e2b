//! SQLite-backed metadata storage.
//!
//! The database lives inside the pool directory (see
//! [`DATABASE_FILE_NAME`](super::DATABASE_FILE_NAME)) and holds two tables:
//!
//! ```text
//! Symlink_index(id, path UNIQUE, file_size, modified_date, checksum UNIQUE)
//! File_index(id, path UNIQUE, file_size?, modified_date?, checksum?,
//!            symlink? -> Symlink_index.id)
//! ```
//!
//! Upserts read the row by path and then insert or update it. This is not
//! atomic across processes; one writer per database is assumed.

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use super::{
    FileMetadata, MetadataStorage, StorageError, StorageResult, DATABASE_FILE_NAME,
};

const SQL_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS Symlink_index (
    id INTEGER PRIMARY KEY,
    path TEXT NOT NULL,
    file_size INTEGER NOT NULL,
    modified_date INTEGER NOT NULL,
    checksum INTEGER NOT NULL,

    CONSTRAINT si_path_unique UNIQUE (path),
    CONSTRAINT si_checksum_unique UNIQUE (checksum)
);
CREATE TABLE IF NOT EXISTS File_index (
    id INTEGER PRIMARY KEY,
    path TEXT NOT NULL,
    file_size INTEGER,
    modified_date INTEGER,
    checksum INTEGER,
    symlink INTEGER REFERENCES Symlink_index(id),

    CONSTRAINT fi_path_unique UNIQUE (path)
);
CREATE INDEX IF NOT EXISTS fi_checksum ON File_index (checksum);
"#;

/// Which of the two tables an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Table {
    Files,
    Pool,
}

impl Table {
    fn name(self) -> &'static str {
        match self {
            Self::Files => "File_index",
            Self::Pool => "Symlink_index",
        }
    }

    /// Update statement; re-indexing a source file also clears a stale link.
    fn update_sql(self) -> String {
        match self {
            Self::Files => "UPDATE File_index SET file_size = ?1, modified_date = ?2, \
                            checksum = ?3, symlink = NULL WHERE id = ?4"
                .to_string(),
            Self::Pool => "UPDATE Symlink_index SET file_size = ?1, modified_date = ?2, \
                           checksum = ?3 WHERE id = ?4"
                .to_string(),
        }
    }
}

/// A row of the files table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub id: i64,
    pub path: PathBuf,
    pub file_size: Option<u64>,
    pub modified_date: Option<i64>,
    pub checksum: Option<u64>,
    /// Row id of the pool entry this path links to
    pub pool_ref: Option<i64>,
}

impl FileRecord {
    /// Whether this path has been replaced by a link into the pool.
    #[must_use]
    pub fn is_linked(&self) -> bool {
        self.pool_ref.is_some()
    }
}

/// A row of the pool-entries table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymlinkRecord {
    pub id: i64,
    pub path: PathBuf,
    pub file_size: u64,
    pub modified_date: i64,
    pub checksum: u64,
}

/// Durable [`MetadataStorage`] on top of a SQLite database.
pub struct SqliteMetadataStorage {
    conn: Option<Connection>,
    database_path: PathBuf,
}

impl std::fmt::Debug for SqliteMetadataStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteMetadataStorage")
            .field("database_path", &self.database_path)
            .field("open", &self.conn.is_some())
            .finish()
    }
}

impl SqliteMetadataStorage {
    /// Open (or create) the database inside `pool_dir`.
    ///
    /// The pool directory is created if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the database
    /// cannot be opened or initialized.
    pub fn open(pool_dir: &Path) -> StorageResult<Self> {
        fs::create_dir_all(pool_dir).map_err(|source| StorageError::Io {
            path: pool_dir.to_path_buf(),
            source,
        })?;
        let database_path = pool_dir.join(DATABASE_FILE_NAME);
        let conn = Connection::open(&database_path).map_err(StorageError::Database)?;
        Self::init(conn, database_path)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory().map_err(StorageError::Database)?;
        Self::init(conn, PathBuf::from(":memory:"))
    }

    fn init(conn: Connection, database_path: PathBuf) -> StorageResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(StorageError::Database)?;
        conn.execute_batch(SQL_SCHEMA)
            .map_err(StorageError::Database)?;
        log::debug!("Opened metadata database at {}", database_path.display());
        Ok(Self {
            conn: Some(conn),
            database_path,
        })
    }

    /// Location of the database file.
    #[must_use]
    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    fn conn(&self) -> StorageResult<&Connection> {
        self.conn.as_ref().ok_or(StorageError::Closed)
    }

    /// All rows of the files table, in insertion order.
    pub fn file_records(&self) -> StorageResult<Vec<FileRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, path, file_size, modified_date, checksum, symlink \
                 FROM File_index ORDER BY id",
            )
            .map_err(StorageError::Database)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(FileRecord {
                    id: row.get(0)?,
                    path: PathBuf::from(row.get::<_, String>(1)?),
                    file_size: row.get::<_, Option<i64>>(2)?.map(|s| s as u64),
                    modified_date: row.get(3)?,
                    checksum: row.get::<_, Option<i64>>(4)?.map(checksum_from_sql),
                    pool_ref: row.get(5)?,
                })
            })
            .map_err(StorageError::Database)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StorageError::Database)
    }

    /// All rows of the pool-entries table, in insertion order.
    pub fn pool_records(&self) -> StorageResult<Vec<SymlinkRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, path, file_size, modified_date, checksum \
                 FROM Symlink_index ORDER BY id",
            )
            .map_err(StorageError::Database)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(SymlinkRecord {
                    id: row.get(0)?,
                    path: PathBuf::from(row.get::<_, String>(1)?),
                    file_size: row.get::<_, i64>(2)? as u64,
                    modified_date: row.get(3)?,
                    checksum: checksum_from_sql(row.get(4)?),
                })
            })
            .map_err(StorageError::Database)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StorageError::Database)
    }

    fn upsert(&mut self, table: Table, path: &Path, checksum: u64) -> StorageResult<()> {
        let metadata = FileMetadata::read(path)?;
        let conn = self.conn()?;
        let key = path_key(path);
        let size = metadata.size as i64;
        let checksum_value = checksum_to_sql(checksum);

        let existing: Option<(i64, Option<i64>, Option<i64>, Option<i64>)> = conn
            .query_row(
                &format!(
                    "SELECT id, file_size, modified_date, checksum FROM {} WHERE path = ?1",
                    table.name()
                ),
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()
            .map_err(StorageError::Database)?;

        match existing {
            Some((_, Some(s), Some(m), Some(c)))
                if s == size && m == metadata.modified && c == checksum_value =>
            {
                log::trace!("{} unchanged in {}", path.display(), table.name());
            }
            Some((id, ..)) => {
                conn.execute(
                    &table.update_sql(),
                    params![size, metadata.modified, checksum_value, id],
                )
                .map_err(|e| classify(path, e))?;
                log::trace!("Updated {} in {}", path.display(), table.name());
            }
            None => {
                conn.execute(
                    &format!(
                        "INSERT INTO {} (path, file_size, modified_date, checksum) \
                         VALUES (?1, ?2, ?3, ?4)",
                        table.name()
                    ),
                    params![key, size, metadata.modified, checksum_value],
                )
                .map_err(|e| classify(path, e))?;
                log::trace!("Inserted {} into {}", path.display(), table.name());
            }
        }
        Ok(())
    }

    fn stored_metadata(&self, table: Table, path: &Path) -> StorageResult<Option<FileMetadata>> {
        let conn = self.conn()?;
        let row: Option<(Option<i64>, Option<i64>)> = conn
            .query_row(
                &format!(
                    "SELECT file_size, modified_date FROM {} WHERE path = ?1",
                    table.name()
                ),
                params![path_key(path)],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(StorageError::Database)?;

        Ok(match row {
            Some((Some(size), Some(modified))) => Some(FileMetadata::new(size as u64, modified)),
            _ => None,
        })
    }
}

impl MetadataStorage for SqliteMetadataStorage {
    fn upsert_file(&mut self, path: &Path, checksum: u64) -> StorageResult<()> {
        self.upsert(Table::Files, path, checksum)
    }

    fn upsert_symlink(&mut self, path: &Path, checksum: u64) -> StorageResult<()> {
        self.upsert(Table::Pool, path, checksum)
    }

    fn link_file_to_symlink(&mut self, path: &Path, pool_path: &Path) -> StorageResult<()> {
        let conn = self.conn()?;
        let pool_id: i64 = conn
            .query_row(
                "SELECT id FROM Symlink_index WHERE path = ?1",
                params![path_key(pool_path)],
                |row| row.get(0),
            )
            .optional()
            .map_err(StorageError::Database)?
            .ok_or_else(|| StorageError::NotFound(pool_path.to_path_buf()))?;

        let updated = conn
            .execute(
                "UPDATE File_index SET file_size = NULL, modified_date = NULL, \
                 checksum = NULL, symlink = ?1 WHERE path = ?2",
                params![pool_id, path_key(path)],
            )
            .map_err(|e| classify(path, e))?;
        if updated == 0 {
            return Err(StorageError::NotFound(path.to_path_buf()));
        }
        Ok(())
    }

    fn get_unlinked_files(&self, checksum: u64) -> StorageResult<Vec<PathBuf>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT path FROM File_index \
                 WHERE checksum = ?1 AND file_size != 0 AND symlink IS NULL ORDER BY id",
            )
            .map_err(StorageError::Database)?;
        let paths = stmt
            .query_map(params![checksum_to_sql(checksum)], |row| {
                row.get::<_, String>(0)
            })
            .map_err(StorageError::Database)?
            .map(|r| r.map(PathBuf::from))
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StorageError::Database)?;
        Ok(paths)
    }

    fn get_symlink_file(&self, checksum: u64) -> StorageResult<Option<PathBuf>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT path FROM Symlink_index WHERE checksum = ?1 AND file_size != 0 \
             ORDER BY id LIMIT 1",
            params![checksum_to_sql(checksum)],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map(|path| path.map(PathBuf::from))
        .map_err(StorageError::Database)
    }

    fn get_stored_file_metadata(&self, path: &Path) -> StorageResult<Option<FileMetadata>> {
        self.stored_metadata(Table::Files, path)
    }

    fn get_stored_symlink_file_metadata(
        &self,
        path: &Path,
    ) -> StorageResult<Option<FileMetadata>> {
        self.stored_metadata(Table::Pool, path)
    }

    fn close(&mut self) -> StorageResult<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| StorageError::Database(e))?;
            log::debug!("Closed metadata database {}", self.database_path.display());
        }
        Ok(())
    }
}

/// Text key used for a path in both tables.
fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Checksums are stored bit-for-bit in a signed INTEGER column.
fn checksum_to_sql(checksum: u64) -> i64 {
    checksum as i64
}

fn checksum_from_sql(value: i64) -> u64 {
    value as u64
}

/// Map unique-constraint failures to [`StorageError::ConstraintViolation`].
fn classify(path: &Path, err: rusqlite::Error) -> StorageError {
    match err {
        rusqlite::Error::SqliteFailure(code, message)
            if code.code == ErrorCode::ConstraintViolation =>
        {
            StorageError::ConstraintViolation {
                path: path.to_path_buf(),
                message: message.unwrap_or_else(|| code.to_string()),
            }
        }
        other => StorageError::Database(other),
    }
}
