//! Snapshot scanner: walks a run directory and fingerprints every regular file.
//!
//! # Overview
//!
//! [`SnapshotScanner`] enumerates a run directory with [`walkdir`], then
//! hashes files one at a time with [`Hasher`]. Hashing is sequential on
//! purpose: streaming I/O dominates and memory stays flat.
//!
//! # Behavior
//!
//! - Output is sorted by [`RelativePath`], so the same directory snapshot
//!   always yields the same sequence.
//! - The manifest sidecar at the run root is excluded, so re-scanning a run
//!   never hashes its own manifest.
//! - Symbolic links and special files are skipped with a warning. Link
//!   targets are never followed.
//! - A file that fails to hash is reported in [`ScanOutput::errors`] and the
//!   scan moves on.
//! - Graceful shutdown via atomic flag, checked between files.
//!
//! # Example
//!
//! ```no_run
//! use snapledger::scanner::SnapshotScanner;
//! use std::path::Path;
//!
//! let output = SnapshotScanner::new(Path::new("/backups/2024/05/01/1902"))
//!     .scan(None)
//!     .unwrap();
//! println!("{} files hashed", output.entries.len());
//! ```

use std::ffi::OsString;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use walkdir::WalkDir;

use super::hasher::{Fingerprint, Hasher};
use super::path_utils::RelativePath;
use super::{HashError, ScanEntry, ScanError, ScanOutput};
use crate::manifest::MANIFEST_FILE_NAME;
use crate::progress::ProgressCallback;

/// Progress phase name reported while hashing.
pub const HASH_PHASE: &str = "hash";

/// Walks one run directory and produces its fingerprint listing.
#[derive(Debug, Clone)]
pub struct SnapshotScanner {
    /// Run directory root
    root: PathBuf,
    /// Root-level file name that is never scanned
    reserved_name: OsString,
    /// Content hasher
    hasher: Hasher,
    /// Optional shutdown flag for graceful termination
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl SnapshotScanner {
    /// Create a scanner for the given run directory.
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            reserved_name: OsString::from(MANIFEST_FILE_NAME),
            hasher: Hasher::new(),
            shutdown_flag: None,
        }
    }

    /// Override the reserved sidecar name.
    #[must_use]
    pub fn with_reserved_name(mut self, name: impl Into<OsString>) -> Self {
        self.reserved_name = name.into();
        self
    }

    /// Use a specific hasher (e.g. a different chunk size).
    #[must_use]
    pub fn with_hasher(mut self, hasher: Hasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Set the shutdown flag for graceful termination.
    ///
    /// When the flag is set to `true`, [`scan`](Self::scan) stops before the
    /// next file and returns [`ScanError::Interrupted`].
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Run directory being scanned.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Enumerate and hash every regular file under the root.
    ///
    /// # Errors
    ///
    /// Fails only when the root itself is unusable (missing, not a
    /// directory, unreadable) or when shutdown is requested. Per-file
    /// problems land in [`ScanOutput::errors`].
    pub fn scan(&self, progress: Option<&dyn ProgressCallback>) -> Result<ScanOutput, ScanError> {
        let metadata = fs::metadata(&self.root).map_err(|e| ScanError::from_io(&self.root, e))?;
        if !metadata.is_dir() {
            return Err(ScanError::NotADirectory(self.root.clone()));
        }

        let mut output = ScanOutput::default();
        let candidates = self.discover(&mut output)?;
        log::debug!(
            "Discovered {} files under {}",
            candidates.len(),
            self.root.display()
        );

        if let Some(cb) = progress {
            cb.on_phase_start(HASH_PHASE, candidates.len());
        }

        for (index, (relative_path, path)) in candidates.into_iter().enumerate() {
            if self.is_shutdown_requested() {
                log::debug!("Scanner: Shutdown requested, stopping before {}", path.display());
                return Err(ScanError::Interrupted);
            }
            if let Some(cb) = progress {
                cb.on_progress(index + 1, relative_path.as_str());
            }

            match self.hash_file(&path) {
                Ok((size, fingerprint)) => {
                    log::trace!("{}  {}", fingerprint, relative_path);
                    if let Some(cb) = progress {
                        cb.on_item_completed(size);
                    }
                    output.entries.push(ScanEntry {
                        relative_path,
                        path,
                        size,
                        fingerprint,
                    });
                }
                Err(e) => {
                    log::warn!("Skipping unreadable file {}: {}", path.display(), e);
                    output.errors.push(ScanError::HashError(e));
                }
            }
        }

        if let Some(cb) = progress {
            cb.on_phase_end(HASH_PHASE);
        }

        Ok(output)
    }

    fn hash_file(&self, path: &Path) -> Result<(u64, Fingerprint), HashError> {
        let file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
        let size = file
            .metadata()
            .map_err(|e| HashError::from_io(path, e))?
            .len();
        let fingerprint = self
            .hasher
            .fingerprint_reader(file)
            .map_err(|e| HashError::from_io(path, e))?;
        Ok((size, fingerprint))
    }

    /// Collect `(key, absolute path)` for every regular file, sorted by key.
    fn discover(&self, output: &mut ScanOutput) -> Result<Vec<(RelativePath, PathBuf)>, ScanError> {
        let mut candidates = Vec::new();

        let walk = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name();

        for entry in walk {
            if self.is_shutdown_requested() {
                log::debug!("Scanner: Shutdown requested during discovery");
                return Err(ScanError::Interrupted);
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e
                        .path()
                        .map_or_else(|| self.root.clone(), Path::to_path_buf);
                    log::warn!("Cannot read {}: {}", path.display(), e);
                    let err = match e.into_io_error() {
                        Some(io) => ScanError::from_io(&path, io),
                        None => ScanError::Io {
                            path,
                            source: std::io::Error::other("directory walk failed"),
                        },
                    };
                    output.errors.push(err);
                    continue;
                }
            };

            if entry.depth() == 0 {
                continue;
            }

            let file_type = entry.file_type();
            if file_type.is_dir() {
                continue;
            }

            let path = entry.path();
            if file_type.is_symlink() {
                log::warn!("Skipping symbolic link: {}", path.display());
                output.skipped.push(path.to_path_buf());
                continue;
            }
            if !file_type.is_file() {
                log::warn!("Skipping special file: {}", path.display());
                output.skipped.push(path.to_path_buf());
                continue;
            }

            if entry.depth() == 1 && entry.file_name() == self.reserved_name.as_os_str() {
                log::trace!("Skipping manifest sidecar: {}", path.display());
                continue;
            }

            match RelativePath::from_root(&self.root, path) {
                Ok(rel) => candidates.push((rel, path.to_path_buf())),
                Err(e) => {
                    log::warn!("Skipping {}: {}", path.display(), e);
                    output.errors.push(ScanError::InvalidPath(e));
                }
            }
        }

        candidates.sort_by(|a, b| a.0.cmp(&b.0));

        // NFC normalization can fold two distinct on-disk names into one key.
        let mut unique: Vec<(RelativePath, PathBuf)> = Vec::with_capacity(candidates.len());
        for (rel, path) in candidates {
            if unique.last().is_some_and(|(last, _)| *last == rel) {
                log::warn!(
                    "Skipping {}: relative path {} already taken by another file",
                    path.display(),
                    rel
                );
                output.errors.push(ScanError::DuplicateKey {
                    key: rel.to_string(),
                    path,
                });
                continue;
            }
            unique.push((rel, path));
        }

        Ok(unique)
    }
}
