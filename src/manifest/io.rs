//! Reading and writing manifest files.
//!
//! Each line is `<64 hex chars>  <relative path>\n`, sorted by relative
//! path, UTF-8.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::data::{Manifest, ManifestEntry};
use super::MANIFEST_FILE_NAME;
use crate::fsutil::{write_atomic, PersistError};
use crate::scanner::{Fingerprint, RelativePath, ScanOutput};

/// Separator between fingerprint and path on each line.
const FIELD_SEPARATOR: &str = "  ";

/// Errors reading an existing manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// The manifest could not be read.
    #[error("failed to read manifest {path}: {source}")]
    Io {
        /// Manifest path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// A line does not follow the `<hex>  <path>` layout.
    #[error("{path}:{line}: {reason}")]
    Malformed {
        /// Manifest path
        path: PathBuf,
        /// 1-based line number
        line: usize,
        /// What was wrong with it
        reason: String,
    },
}

impl Manifest {
    /// Render the manifest text.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.len() * 96);
        for entry in self.entries() {
            let _ = writeln!(
                out,
                "{}{FIELD_SEPARATOR}{}",
                entry.fingerprint, entry.relative_path
            );
        }
        out
    }

    /// Persist the manifest at the run root, replacing any previous one
    /// atomically.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError`] if the temp write or rename fails; the
    /// previous manifest (if any) is left as it was.
    pub fn write(&self) -> Result<PathBuf, PersistError> {
        let path = self.file_path();
        write_atomic(&path, self.render().as_bytes())?;
        log::debug!("Wrote manifest with {} entries to {}", self.len(), path.display());
        Ok(path)
    }

    /// Parse manifest text for a run rooted at `run_root`.
    ///
    /// `source` is only used in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Malformed`] on the first bad line.
    pub fn parse(run_root: &Path, source: &Path, text: &str) -> Result<Self, ManifestError> {
        let malformed = |line: usize, reason: String| ManifestError::Malformed {
            path: source.to_path_buf(),
            line,
            reason,
        };

        let mut entries = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line_no = index + 1;
            if line.is_empty() {
                continue;
            }
            let (hex, rel) = line
                .split_once(FIELD_SEPARATOR)
                .ok_or_else(|| malformed(line_no, "missing two-space separator".to_string()))?;
            let fingerprint: Fingerprint = hex.parse().map_err(|e| malformed(line_no, e))?;
            let relative_path =
                RelativePath::parse(rel).map_err(|e| malformed(line_no, e.to_string()))?;
            entries.push(ManifestEntry {
                relative_path,
                fingerprint,
                size: None,
            });
        }

        Ok(Self::new(run_root, entries))
    }

    /// Load the manifest stored in a run directory.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] if the file is missing, unreadable or
    /// malformed.
    pub fn read(run_root: &Path) -> Result<Self, ManifestError> {
        let path = run_root.join(MANIFEST_FILE_NAME);
        let text = fs::read_to_string(&path).map_err(|source| ManifestError::Io {
            path: path.clone(),
            source,
        })?;
        Self::parse(run_root, &path, &text)
    }
}

/// Build the manifest for a finished scan, persist it, and hand back the
/// in-memory copy for classification.
///
/// # Errors
///
/// Returns [`PersistError`] if the manifest could not be made visible.
pub fn persist_manifest(run_root: &Path, scan: &ScanOutput) -> Result<Manifest, PersistError> {
    let manifest = Manifest::from_scan(run_root, scan);
    manifest.write()?;
    Ok(manifest)
}
