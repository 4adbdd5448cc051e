//! Reclaim planning and confirmation-gated execution.
//!
//! # Overview
//!
//! Reclaiming space happens in two steps:
//!
//! 1. [`plan`] turns the unchanged files of a classified run into a
//!    [`ReclaimPlan`]. Nothing on disk is touched. An empty candidate set
//!    yields [`PlanDecision::NothingToReclaim`] instead of an empty plan.
//! 2. [`execute`] removes the planned files, but only when handed the exact
//!    confirmation text [`CONFIRMATION_TOKEN`]. Each file is re-checked right
//!    before removal and every path gets its own report; one failure never
//!    stops the batch.
//!
//! The first copy of any content lives in an earlier run directory, which a
//! plan never names: every entry must resolve inside the plan's own run
//! directory or it is refused.
//!
//! # Example
//!
//! ```no_run
//! use snapledger::actions::reclaim::{execute, plan, PlanDecision, ReclaimConfig, ReclaimOutcome};
//! # fn demo(classification: &snapledger::duplicates::Classification) {
//! if let PlanDecision::Plan(p) = plan(classification, chrono::Local::now()) {
//!     match execute::<()>(&p, "DELETE", &ReclaimConfig::default(), None) {
//!         ReclaimOutcome::Executed(result) => println!("{}", result.summary()),
//!         ReclaimOutcome::Aborted => println!("aborted"),
//!     }
//! }
//! # }
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bytesize::ByteSize;
use chrono::{DateTime, Local};
use serde::Serialize;
use thiserror::Error;

use crate::duplicates::Classification;
use crate::scanner::{Fingerprint, Hasher, RelativePath};

/// Text that must be typed, verbatim, to allow deletion.
pub const CONFIRMATION_TOKEN: &str = "DELETE";

/// Why a single planned file was not removed.
#[derive(Debug, Error)]
pub enum ReclaimError {
    /// The file resolves outside the plan's run directory.
    #[error("refusing to remove {0}: outside the run directory")]
    OutsideRunDir(PathBuf),

    /// The file no longer matches what was planned.
    #[error("file modified since planning: {path} ({reason})")]
    Modified {
        /// Planned path
        path: PathBuf,
        /// What differs
        reason: String,
    },

    /// Permission denied.
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Moving to the system trash failed.
    #[error("trash operation failed for {path}: {message}")]
    TrashFailed {
        /// Planned path
        path: PathBuf,
        /// Message from the trash backend
        message: String,
    },

    /// Any other I/O failure.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Planned path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl ReclaimError {
    fn from_io(path: &Path, e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: e,
            },
        }
    }
}

/// A file scheduled for removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    /// Key in the ledger.
    pub relative_path: RelativePath,
    /// Absolute path inside the run directory.
    pub path: PathBuf,
    /// Fingerprint shared with the earlier copy.
    pub fingerprint: Fingerprint,
    /// Size at planning time, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// A reviewable list of unchanged files to remove from one run directory.
#[derive(Debug, Clone, Serialize)]
pub struct ReclaimPlan {
    /// Run directory every entry must live in.
    pub run_dir: PathBuf,
    /// Files to remove, in relative-path order. Never empty.
    pub entries: Vec<PlanEntry>,
    /// When the plan was made.
    pub created_at: DateTime<Local>,
}

impl ReclaimPlan {
    /// Number of files in the plan.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false for plans produced by [`plan`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes that removing every entry would free, where sizes are known.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().filter_map(|e| e.size).sum()
    }
}

/// Whether there is anything to reclaim.
#[derive(Debug, Clone)]
pub enum PlanDecision {
    /// No unchanged files; no plan artifact should be produced.
    NothingToReclaim,
    /// A non-empty plan.
    Plan(ReclaimPlan),
}

/// Build the reclaim plan for a classified run.
///
/// Pure: reads nothing from disk and writes nothing.
#[must_use]
pub fn plan(classification: &Classification, created_at: DateTime<Local>) -> PlanDecision {
    let entries: Vec<PlanEntry> = classification
        .unchanged()
        .map(|f| PlanEntry {
            relative_path: f.relative_path.clone(),
            path: f.path.clone(),
            fingerprint: f.fingerprint,
            size: f.size,
        })
        .collect();

    if entries.is_empty() {
        log::info!("Nothing to reclaim in {}", classification.run_root.display());
        return PlanDecision::NothingToReclaim;
    }

    let plan = ReclaimPlan {
        run_dir: classification.run_root.clone(),
        entries,
        created_at,
    };
    log::info!(
        "Planned {} unchanged file(s) for reclaim ({})",
        plan.len(),
        ByteSize::b(plan.total_bytes())
    );
    PlanDecision::Plan(plan)
}

/// Options for [`execute`].
#[derive(Debug, Clone, Default)]
pub struct ReclaimConfig {
    /// Move files to the system trash instead of removing them.
    pub use_trash: bool,
    /// Re-hash each file and require the planned fingerprint.
    pub verify_content: bool,
}

impl ReclaimConfig {
    /// Config that moves files to the system trash.
    #[must_use]
    pub fn trash() -> Self {
        Self {
            use_trash: true,
            ..Self::default()
        }
    }

    /// Enable/disable re-hashing before removal.
    #[must_use]
    pub fn with_verify_content(mut self, verify: bool) -> Self {
        self.verify_content = verify;
        self
    }
}

/// A removed file.
#[derive(Debug, Clone)]
pub struct ReclaimResult {
    /// Removed path.
    pub path: PathBuf,
    /// Size freed.
    pub size: u64,
    /// Whether it went to the trash.
    pub trashed: bool,
}

/// Per-path results of executing a plan.
#[derive(Debug, Clone, Default)]
pub struct BatchReclaimResult {
    /// Files removed.
    pub successes: Vec<ReclaimResult>,
    /// Files already gone at execution time.
    pub missing: Vec<PathBuf>,
    /// Files that could not be removed, with the reason.
    pub failures: Vec<(PathBuf, String)>,
    /// Total bytes freed.
    pub bytes_freed: u64,
}

impl BatchReclaimResult {
    /// Number of removed files.
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.successes.len()
    }

    /// Number of failures.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// Whether no file failed. Missing files are not failures.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    /// Human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut s = format!(
            "Removed {} file(s), freed {}",
            self.success_count(),
            ByteSize::b(self.bytes_freed)
        );
        if !self.missing.is_empty() {
            s.push_str(&format!(", {} already gone", self.missing.len()));
        }
        if !self.failures.is_empty() {
            s.push_str(&format!(", {} failed", self.failure_count()));
        }
        s
    }
}

/// Outcome of [`execute`].
#[derive(Debug, Clone)]
pub enum ReclaimOutcome {
    /// The confirmation text did not match; nothing was touched.
    Aborted,
    /// The plan ran; see per-path results.
    Executed(BatchReclaimResult),
}

/// Per-path progress reporting during execution.
pub trait ReclaimProgressCallback {
    /// Called before each file is checked.
    fn on_before_reclaim(&self, path: &Path, index: usize, total: usize);

    /// Called after a file was removed.
    fn on_reclaim_success(&self, path: &Path, size: u64);

    /// Called when a file had already disappeared.
    fn on_reclaim_missing(&self, path: &Path);

    /// Called when a file could not be removed.
    fn on_reclaim_failure(&self, path: &Path, error: &str);
}

impl ReclaimProgressCallback for () {
    fn on_before_reclaim(&self, _: &Path, _: usize, _: usize) {}
    fn on_reclaim_success(&self, _: &Path, _: u64) {}
    fn on_reclaim_missing(&self, _: &Path) {}
    fn on_reclaim_failure(&self, _: &Path, _: &str) {}
}

/// Run a plan after checking the confirmation text.
///
/// Any `confirmation` other than exactly [`CONFIRMATION_TOKEN`] returns
/// [`ReclaimOutcome::Aborted`] without touching the filesystem.
pub fn execute<C: ReclaimProgressCallback>(
    plan: &ReclaimPlan,
    confirmation: &str,
    config: &ReclaimConfig,
    callback: Option<&C>,
) -> ReclaimOutcome {
    if confirmation != CONFIRMATION_TOKEN {
        log::info!("Reclaim aborted: confirmation text did not match");
        return ReclaimOutcome::Aborted;
    }

    let canonical_root = fs::canonicalize(&plan.run_dir).ok();
    let total = plan.entries.len();
    let mut result = BatchReclaimResult::default();

    for (index, entry) in plan.entries.iter().enumerate() {
        if let Some(cb) = callback {
            cb.on_before_reclaim(&entry.path, index, total);
        }

        match reclaim_one(plan, canonical_root.as_deref(), entry, config) {
            Ok(Some(done)) => {
                result.bytes_freed += done.size;
                if let Some(cb) = callback {
                    cb.on_reclaim_success(&done.path, done.size);
                }
                result.successes.push(done);
            }
            Ok(None) => {
                log::info!("Already gone: {}", entry.path.display());
                if let Some(cb) = callback {
                    cb.on_reclaim_missing(&entry.path);
                }
                result.missing.push(entry.path.clone());
            }
            Err(e) => {
                let message = e.to_string();
                log::warn!("Failed to reclaim {}: {}", entry.path.display(), message);
                if let Some(cb) = callback {
                    cb.on_reclaim_failure(&entry.path, &message);
                }
                result.failures.push((entry.path.clone(), message));
            }
        }
    }

    log::info!("{}", result.summary());
    ReclaimOutcome::Executed(result)
}

/// Check and remove one entry. `Ok(None)` means it was already gone.
fn reclaim_one(
    plan: &ReclaimPlan,
    canonical_root: Option<&Path>,
    entry: &PlanEntry,
    config: &ReclaimConfig,
) -> Result<Option<ReclaimResult>, ReclaimError> {
    let path = &entry.path;

    if *path != entry.relative_path.resolve(&plan.run_dir) {
        return Err(ReclaimError::OutsideRunDir(path.clone()));
    }

    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ReclaimError::from_io(path, e)),
    };

    if !metadata.is_file() {
        return Err(ReclaimError::Modified {
            path: path.clone(),
            reason: "no longer a regular file".to_string(),
        });
    }

    // Parent directories may have been swapped for links since planning.
    let parent = path.parent().unwrap_or(path);
    let inside = match (canonical_root, fs::canonicalize(parent)) {
        (Some(root), Ok(parent)) => parent.starts_with(root),
        _ => false,
    };
    if !inside {
        return Err(ReclaimError::OutsideRunDir(path.clone()));
    }

    if let Some(expected) = entry.size {
        if metadata.len() != expected {
            return Err(ReclaimError::Modified {
                path: path.clone(),
                reason: format!("size changed from {} to {}", expected, metadata.len()),
            });
        }
    }

    if config.verify_content {
        let actual = Hasher::new()
            .fingerprint(path)
            .map_err(|e| ReclaimError::Modified {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        if actual != entry.fingerprint {
            return Err(ReclaimError::Modified {
                path: path.clone(),
                reason: "content changed".to_string(),
            });
        }
    }

    let size = metadata.len();
    if config.use_trash {
        trash::delete(path).map_err(|e| ReclaimError::TrashFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        log::debug!("Moved to trash: {} ({} bytes)", path.display(), size);
    } else {
        fs::remove_file(path).map_err(|e| ReclaimError::from_io(path, e))?;
        log::debug!("Removed: {} ({} bytes)", path.display(), size);
    }

    Ok(Some(ReclaimResult {
        path: path.clone(),
        size,
        trashed: config.use_trash,
    }))
}
