//! Chunked stream copying.
//!
//! # Overview
//!
//! [`copy_stream`] moves bytes from a reader to a writer in fixed size
//! chunks, optionally stopping after a byte limit, and reports every chunk to
//! a [`TransferProgress`]. It is used both to copy a file into the pool and,
//! through [`ChecksumWriter`], to feed a file into a checksum.
//!
//! [`copy_bytes`] is a byte-range file copier built on top of it.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::checksum::Checksum;
use crate::progress::TransferProgress;

/// Default chunk size for stream copies.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Error type for copy operations.
#[derive(Debug, Error)]
pub enum CopyError {
    /// Source file was not found.
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid chunk size or byte range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Reading or writing one of the streams failed.
    #[error("stream copy failed: {0}")]
    Stream(#[source] io::Error),

    /// File level I/O error.
    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Copy up to `max_bytes` (everything when `None`) from `reader` to `writer`.
///
/// Returns the number of bytes copied, which is less than `max_bytes` only
/// if the reader ran out of data first.
///
/// # Errors
///
/// Returns [`CopyError::InvalidParameter`] if `chunk_size` is zero, or
/// [`CopyError::Stream`] if a read or write fails.
pub fn copy_stream<R: Read + ?Sized, W: Write + ?Sized>(
    reader: &mut R,
    writer: &mut W,
    max_bytes: Option<u64>,
    chunk_size: usize,
    progress: &dyn TransferProgress,
) -> Result<u64, CopyError> {
    if chunk_size == 0 {
        return Err(CopyError::InvalidParameter(
            "chunk size must be > 0".to_string(),
        ));
    }

    let mut buf = vec![0u8; chunk_size];
    let mut total: u64 = 0;
    loop {
        let want = match max_bytes {
            Some(limit) => {
                let remaining = limit - total;
                if remaining == 0 {
                    break;
                }
                remaining.min(chunk_size as u64) as usize
            }
            None => chunk_size,
        };

        let read = match reader.read(&mut buf[..want]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CopyError::Stream(e)),
        };
        writer.write_all(&buf[..read]).map_err(CopyError::Stream)?;
        total += read as u64;
        progress.on_progress(read as u64);
    }
    writer.flush().map_err(CopyError::Stream)?;
    Ok(total)
}

/// Copy a byte range of `source` into a new file at `target`.
///
/// The range starts at `offset` (default 0) and spans `max_bytes` bytes
/// (default: the rest of the file). The parent directory of `target` is
/// created if needed. Returns the number of bytes copied.
///
/// # Errors
///
/// - [`CopyError::NotFound`] if `source` is not a file
/// - [`CopyError::InvalidParameter`] if the range does not fit in `source`
///   or `chunk_size` is zero
/// - [`CopyError::Io`] for other filesystem failures
pub fn copy_bytes(
    source: &Path,
    target: &Path,
    max_bytes: Option<u64>,
    offset: Option<u64>,
    chunk_size: usize,
    progress: &dyn TransferProgress,
) -> Result<u64, CopyError> {
    if !source.is_file() {
        return Err(CopyError::NotFound(source.to_path_buf()));
    }
    if chunk_size == 0 {
        return Err(CopyError::InvalidParameter(
            "chunk size must be > 0".to_string(),
        ));
    }

    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: io::Error| CopyError::Io { path, source }
    };

    let offset = offset.unwrap_or(0);
    let file_size = fs::metadata(source).map_err(io_err(source))?.len();
    if offset > file_size {
        return Err(CopyError::InvalidParameter(format!(
            "offset {offset} lies beyond the end of {} ({file_size} bytes)",
            source.display()
        )));
    }
    let available = file_size - offset;
    let to_copy = match max_bytes {
        Some(wanted) if wanted > available => {
            return Err(CopyError::InvalidParameter(format!(
                "cannot copy {wanted} bytes from {} (offset: {offset}, file size: {file_size})",
                source.display()
            )));
        }
        Some(wanted) => wanted,
        None => available,
    };

    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }

    let mut input = File::open(source).map_err(io_err(source))?;
    if offset > 0 {
        input
            .seek(SeekFrom::Start(offset))
            .map_err(io_err(source))?;
    }
    let mut output = File::create(target).map_err(io_err(target))?;

    progress.on_start(source, to_copy);
    let copied = copy_stream(&mut input, &mut output, Some(to_copy), chunk_size, progress);
    progress.on_finish();
    copied
}

/// A write sink forwarding every written chunk to a checksum.
#[derive(Debug)]
pub struct ChecksumWriter<C> {
    checksum: C,
}

impl<C: Checksum> ChecksumWriter<C> {
    #[must_use]
    pub fn new(checksum: C) -> Self {
        Self { checksum }
    }

    /// Current digest of everything written so far.
    #[must_use]
    pub fn digest(&self) -> u64 {
        self.checksum.digest()
    }

    #[must_use]
    pub fn into_inner(self) -> C {
        self.checksum
    }
}

impl<C: Checksum> Write for ChecksumWriter<C> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.checksum.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
