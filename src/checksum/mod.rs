//! Streaming checksum algorithms used as content fingerprints.
//!
//! # Overview
//!
//! Every algorithm is a small stateful accumulator implementing [`Checksum`]:
//! bytes are fed through [`Checksum::update`] in arbitrarily sized chunks and
//! [`Checksum::digest`] returns the fingerprint for everything seen so far.
//! Feeding the same bytes with a different chunking always yields the same
//! digest.
//!
//! The set of algorithms is closed:
//!
//! - [`Fletcher`] for 8, 16, 32 and 64 bit widths
//! - [`Adler32`] (RFC 1950)
//! - [`Crc32`] (IEEE polynomial, backed by `crc32fast`)
//!
//! [`AnyChecksum`] is the tagged variant over all of them, and [`Algorithm`]
//! is the registry key that creates a fresh accumulator per use.
//!
//! # Example
//!
//! ```
//! use linkdupe::checksum::{get_algorithm, Checksum};
//!
//! let mut checksum = get_algorithm("crc32").unwrap().create();
//! checksum.update(b"1234");
//! checksum.update(b"56789");
//! assert_eq!(checksum.digest(), 0xcbf4_3926);
//! assert_eq!(checksum.hexdigest(), "0xcbf43926");
//! ```

pub mod crc;
pub mod fletcher;

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub use crc::Crc32;
pub use fletcher::{Adler32, Fletcher};

use crate::copy::{copy_stream, ChecksumWriter, CopyError};
use crate::progress::TransferProgress;

/// Errors raised while selecting or constructing a checksum algorithm.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ChecksumError {
    /// A constructor argument was out of range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No algorithm is registered under the given key.
    #[error("unknown checksum algorithm '{0}' (available: {})", available_algorithms().join(", "))]
    UnknownAlgorithm(String),
}

/// A streaming checksum accumulator.
pub trait Checksum {
    /// Feed a chunk of bytes into the accumulator.
    fn update(&mut self, buf: &[u8]);

    /// The digest of all bytes fed so far.
    fn digest(&self) -> u64;

    /// Hexadecimal rendering of [`digest`](Self::digest), `0x` prefixed.
    fn hexdigest(&self) -> String {
        format!("{:#x}", self.digest())
    }
}

/// A fresh accumulator for any registered algorithm.
#[derive(Debug, Clone)]
pub enum AnyChecksum {
    Fletcher(Fletcher),
    Adler32(Adler32),
    Crc32(Crc32),
}

impl Checksum for AnyChecksum {
    fn update(&mut self, buf: &[u8]) {
        match self {
            Self::Fletcher(c) => c.update(buf),
            Self::Adler32(c) => c.update(buf),
            Self::Crc32(c) => c.update(buf),
        }
    }

    fn digest(&self) -> u64 {
        match self {
            Self::Fletcher(c) => c.digest(),
            Self::Adler32(c) => c.digest(),
            Self::Crc32(c) => c.digest(),
        }
    }
}

/// Registry key of a checksum algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Algorithm {
    Fletcher16,
    Fletcher32,
    Fletcher64,
    Adler32,
    /// Fast and adequate for equality pre-filtering; the default.
    #[default]
    Crc32,
}

/// Registry of algorithms, in the order they are listed to users.
const REGISTRY: [(&str, Algorithm); 5] = [
    ("fletcher16", Algorithm::Fletcher16),
    ("fletcher32", Algorithm::Fletcher32),
    ("fletcher64", Algorithm::Fletcher64),
    ("adler32", Algorithm::Adler32),
    ("crc32", Algorithm::Crc32),
];

impl Algorithm {
    /// The registry key of this algorithm.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Fletcher16 => "fletcher16",
            Self::Fletcher32 => "fletcher32",
            Self::Fletcher64 => "fletcher64",
            Self::Adler32 => "adler32",
            Self::Crc32 => "crc32",
        }
    }

    /// Create a fresh accumulator.
    #[must_use]
    pub fn create(self) -> AnyChecksum {
        match self {
            Self::Fletcher16 => AnyChecksum::Fletcher(Fletcher::fletcher16()),
            Self::Fletcher32 => AnyChecksum::Fletcher(Fletcher::fletcher32()),
            Self::Fletcher64 => AnyChecksum::Fletcher(Fletcher::fletcher64()),
            Self::Adler32 => AnyChecksum::Adler32(Adler32::new()),
            Self::Crc32 => AnyChecksum::Crc32(Crc32::new()),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = ChecksumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        get_algorithm(s)
    }
}

/// Look up an algorithm by its registry key.
///
/// # Errors
///
/// Returns [`ChecksumError::UnknownAlgorithm`] if the key is not registered.
pub fn get_algorithm(key: &str) -> Result<Algorithm, ChecksumError> {
    REGISTRY
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, algorithm)| *algorithm)
        .ok_or_else(|| ChecksumError::UnknownAlgorithm(key.to_string()))
}

/// All registry keys, in a stable order.
#[must_use]
pub fn available_algorithms() -> Vec<&'static str> {
    REGISTRY.iter().map(|(name, _)| *name).collect()
}

/// Errors raised while fingerprinting a file.
#[derive(thiserror::Error, Debug)]
pub enum FingerprintError {
    /// The file to fingerprint does not exist.
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    /// Streaming the file failed.
    #[error(transparent)]
    Copy(#[from] CopyError),

    /// The file could not be opened.
    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Stream a whole file through a fresh accumulator and return its digest.
///
/// # Errors
///
/// Returns [`FingerprintError::NotFound`] before reading anything if the
/// file is missing, or an I/O error if reading fails.
pub fn checksum_file(
    path: &Path,
    algorithm: Algorithm,
    chunk_size: usize,
    progress: &dyn TransferProgress,
) -> Result<u64, FingerprintError> {
    let file = File::open(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            FingerprintError::NotFound(path.to_path_buf())
        } else {
            FingerprintError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    let size = file
        .metadata()
        .map_err(|source| FingerprintError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .len();

    let mut sink = ChecksumWriter::new(algorithm.create());
    let mut reader = BufReader::with_capacity(chunk_size.max(1), file);
    progress.on_start(path, size);
    let copied = copy_stream(&mut reader, &mut sink, Some(size), chunk_size, progress);
    progress.on_finish();
    copied?;
    Ok(sink.into_inner().digest())
}
