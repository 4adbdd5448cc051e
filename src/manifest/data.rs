//! Data structures for run manifests.

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::MANIFEST_FILE_NAME;
use crate::scanner::{Fingerprint, RelativePath, ScanOutput};

/// One file recorded in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    /// Path relative to the run root.
    pub relative_path: RelativePath,
    /// SHA-256 of the content.
    pub fingerprint: Fingerprint,
    /// Size in bytes. Known when built from a scan, not stored on disk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// The fingerprint listing of a single run directory.
///
/// Entries are kept sorted by relative path with one entry per path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Manifest {
    /// Root of the run directory the manifest describes.
    pub run_root: PathBuf,
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Build a manifest from arbitrary entries.
    ///
    /// Entries are sorted; if a relative path repeats, the last one wins.
    #[must_use]
    pub fn new(run_root: impl Into<PathBuf>, mut entries: Vec<ManifestEntry>) -> Self {
        entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        let mut deduped: Vec<ManifestEntry> = Vec::with_capacity(entries.len());
        for entry in entries {
            match deduped.last_mut() {
                Some(last) if last.relative_path == entry.relative_path => *last = entry,
                _ => deduped.push(entry),
            }
        }
        Self {
            run_root: run_root.into(),
            entries: deduped,
        }
    }

    /// Build the manifest for a completed scan of `run_root`.
    #[must_use]
    pub fn from_scan(run_root: &Path, scan: &ScanOutput) -> Self {
        let entries = scan
            .entries
            .iter()
            .map(|e| ManifestEntry {
                relative_path: e.relative_path.clone(),
                fingerprint: e.fingerprint,
                size: Some(e.size),
            })
            .collect();
        Self::new(run_root, entries)
    }

    /// Sorted entries.
    #[must_use]
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Number of files listed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest lists no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fingerprint recorded for a relative path.
    #[must_use]
    pub fn get(&self, relative_path: &RelativePath) -> Option<&Fingerprint> {
        self.entries
            .binary_search_by(|e| e.relative_path.cmp(relative_path))
            .ok()
            .map(|i| &self.entries[i].fingerprint)
    }

    /// Where the manifest file lives for this run.
    #[must_use]
    pub fn file_path(&self) -> PathBuf {
        self.run_root.join(MANIFEST_FILE_NAME)
    }

    /// Sum of known entry sizes.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.entries.iter().filter_map(|e| e.size).sum()
    }
}
