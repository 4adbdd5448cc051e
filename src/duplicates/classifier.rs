//! Change classification against the cross-run ledger.
//!
//! # Overview
//!
//! Every file in the current run's manifest is compared against the
//! fingerprint the ledger last recorded for the same relative path:
//!
//! - same fingerprint: **unchanged**, a duplicate of content already captured
//!   by an earlier run and a candidate for reclaim;
//! - different fingerprint, or no prior entry: **changed**.
//!
//! Classification is a pure function of `(Manifest, Ledger)`. The updated
//! ledger is returned rather than written, so the caller decides when to
//! persist it.
//!
//! # Example
//!
//! ```
//! use snapledger::duplicates::classify;
//! use snapledger::ledger::Ledger;
//! use snapledger::manifest::{Manifest, ManifestEntry};
//! use snapledger::scanner::{Fingerprint, RelativePath};
//!
//! let a = RelativePath::parse("a.txt").unwrap();
//! let manifest = Manifest::new("/backups/2024/05/02/0900", vec![ManifestEntry {
//!     relative_path: a.clone(),
//!     fingerprint: Fingerprint::of_bytes(b"hello"),
//!     size: Some(5),
//! }]);
//! let ledger: Ledger = [(a, Fingerprint::of_bytes(b"hello"))].into_iter().collect();
//!
//! let result = classify(&manifest, &ledger);
//! assert_eq!(result.unchanged_count(), 1);
//! assert_eq!(result.candidates().len(), 1);
//! ```

use std::path::PathBuf;

use serde::Serialize;

use crate::ledger::Ledger;
use crate::manifest::Manifest;
use crate::scanner::{Fingerprint, RelativePath};

/// Outcome for one file of the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Not in the ledger before this run.
    New,
    /// In the ledger with a different fingerprint.
    Modified,
    /// In the ledger with the same fingerprint.
    Unchanged,
}

impl FileStatus {
    /// New and modified files both count as changed.
    #[must_use]
    pub fn is_changed(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// A file of the current run with its classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedFile {
    /// Key shared across runs.
    pub relative_path: RelativePath,
    /// Absolute location inside the current run directory.
    pub path: PathBuf,
    /// Fingerprint in this run.
    pub fingerprint: Fingerprint,
    /// Size in bytes, when the manifest came from a scan.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Fingerprint the ledger held before this run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<Fingerprint>,
    /// Classification.
    pub status: FileStatus,
}

/// Result of classifying one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Root of the classified run.
    pub run_root: PathBuf,
    /// Every manifest entry, in relative-path order.
    pub files: Vec<ClassifiedFile>,
    /// The ledger to save: current fingerprints for every manifest path,
    /// prior entries for paths this run did not contain.
    pub ledger: Ledger,
    /// Ledger entries kept only because the run did not contain the path.
    pub carried_forward: usize,
}

impl Classification {
    /// Files that changed (new or modified).
    pub fn changed(&self) -> impl Iterator<Item = &ClassifiedFile> {
        self.files.iter().filter(|f| f.status.is_changed())
    }

    /// Files whose content matches the previous run.
    pub fn unchanged(&self) -> impl Iterator<Item = &ClassifiedFile> {
        self.files
            .iter()
            .filter(|f| f.status == FileStatus::Unchanged)
    }

    /// The reclaim candidate set: unchanged files of the current run.
    #[must_use]
    pub fn candidates(&self) -> Vec<&ClassifiedFile> {
        self.unchanged().collect()
    }

    /// Number of changed files.
    #[must_use]
    pub fn changed_count(&self) -> usize {
        self.changed().count()
    }

    /// Number of unchanged files.
    #[must_use]
    pub fn unchanged_count(&self) -> usize {
        self.unchanged().count()
    }

    /// Number of files never seen before.
    #[must_use]
    pub fn new_count(&self) -> usize {
        self.files
            .iter()
            .filter(|f| f.status == FileStatus::New)
            .count()
    }

    /// Bytes held by unchanged files, where sizes are known.
    #[must_use]
    pub fn reclaimable_bytes(&self) -> u64 {
        self.unchanged().filter_map(|f| f.size).sum()
    }
}

/// Classify every file of `manifest` against `ledger`.
///
/// Does not mutate either input; calling it twice with the same arguments
/// yields equal results. With an empty ledger every file is
/// [`FileStatus::New`] and there are no candidates.
#[must_use]
pub fn classify(manifest: &Manifest, ledger: &Ledger) -> Classification {
    let mut updated = ledger.clone();
    let mut files = Vec::with_capacity(manifest.len());

    for entry in manifest.entries() {
        let previous = ledger.get(&entry.relative_path).copied();
        let status = match previous {
            None => FileStatus::New,
            Some(prev) if prev == entry.fingerprint => FileStatus::Unchanged,
            Some(_) => FileStatus::Modified,
        };
        log::trace!("{}: {:?}", entry.relative_path, status);

        updated.insert(entry.relative_path.clone(), entry.fingerprint);
        files.push(ClassifiedFile {
            relative_path: entry.relative_path.clone(),
            path: entry.relative_path.resolve(&manifest.run_root),
            fingerprint: entry.fingerprint,
            size: entry.size,
            previous,
            status,
        });
    }

    let carried_forward = updated.len() - manifest.len();
    let result = Classification {
        run_root: manifest.run_root.clone(),
        files,
        ledger: updated,
        carried_forward,
    };

    log::info!(
        "Classified {} files: {} changed ({} new), {} unchanged",
        result.files.len(),
        result.changed_count(),
        result.new_count(),
        result.unchanged_count()
    );
    if carried_forward > 0 {
        log::debug!("{} ledger entries carried forward", carried_forward);
    }

    result
}
