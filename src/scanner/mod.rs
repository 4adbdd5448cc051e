//! Scanner module for snapshot traversal and content hashing.
//!
//! This module provides functionality for:
//! - Deterministic directory walking of a run directory
//! - Streaming SHA-256 content fingerprints
//! - Unicode-normalized relative path keys
//!
//! # Architecture
//!
//! - [`walker`]: Snapshot traversal, yielding `(RelativePath, Fingerprint)` pairs
//! - [`hasher`]: SHA-256 file hashing (streaming)
//! - [`path_utils`]: [`RelativePath`] construction and normalization
//!
//! # Example
//!
//! ```no_run
//! use snapledger::scanner::SnapshotScanner;
//! use std::path::Path;
//!
//! let scanner = SnapshotScanner::new(Path::new("/backups/2024/05/01/1902"));
//! let output = scanner.scan(None).unwrap();
//! for entry in &output.entries {
//!     println!("{}  {}", entry.fingerprint, entry.relative_path);
//! }
//! for err in &output.errors {
//!     eprintln!("Warning: {}", err);
//! }
//! ```

pub mod hasher;
pub mod path_utils;
pub mod walker;

use std::io;
use std::path::{Path, PathBuf};

pub use hasher::{hash_to_hex, hex_to_hash, Fingerprint, Hasher, CHUNK_SIZE};
pub use path_utils::{RelativePath, RelativePathError};
pub use walker::SnapshotScanner;

/// A regular file found in a run directory, with its content fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    /// Stable identity key across runs
    pub relative_path: RelativePath,
    /// Absolute path inside the current run directory
    pub path: PathBuf,
    /// File size in bytes, as seen when the file was hashed
    pub size: u64,
    /// SHA-256 of the file content
    pub fingerprint: Fingerprint,
}

/// Everything one pass over a run directory produced.
#[derive(Debug, Default)]
pub struct ScanOutput {
    /// Hashed files, sorted by relative path.
    pub entries: Vec<ScanEntry>,
    /// Per-file failures. Each failing file is left out of `entries`.
    pub errors: Vec<ScanError>,
    /// Symlinks and special files that were skipped without hashing.
    pub skipped: Vec<PathBuf>,
}

impl ScanOutput {
    /// Total bytes hashed.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    /// Whether any file could not be hashed.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Errors that can occur during directory scanning.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The specified path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The path could not be turned into a ledger key.
    #[error("Unusable path: {0}")]
    InvalidPath(#[from] RelativePathError),

    /// Two on-disk names normalize to the same relative path.
    #[error("Relative path {key} already taken, skipping {path}")]
    DuplicateKey {
        /// The shared key
        key: String,
        /// The file that was left out
        path: PathBuf,
    },

    /// A file could not be hashed.
    #[error(transparent)]
    HashError(#[from] HashError),

    /// Shutdown was requested before the scan finished.
    #[error("Scan interrupted")]
    Interrupted,

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl ScanError {
    /// Map an I/O error for `path` onto the most specific variant.
    #[must_use]
    pub fn from_io(path: &Path, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }
}

/// Errors that can occur during file hashing.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl HashError {
    /// Map an I/O error for `path` onto the most specific variant.
    #[must_use]
    pub fn from_io(path: &Path, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }

    /// Path of the file that failed.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound(p) | Self::PermissionDenied(p) | Self::Io { path: p, .. } => p,
        }
    }
}
