//! JSON output formatter for tracked runs.
//!
//! Provides machine-readable output for scripting and automation.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "status": "tracked",
//!   "run_dir": "/backups/2024/05/02/0930",
//!   "manifest": "/backups/2024/05/02/0930/manifest.sha256",
//!   "ledger_status": "loaded",
//!   "files": [
//!     {
//!       "relative_path": "media/Camera/a.jpg",
//!       "path": "/backups/2024/05/02/0930/media/Camera/a.jpg",
//!       "fingerprint": "2cf24dba...",
//!       "size": 5,
//!       "previous": "2cf24dba...",
//!       "status": "unchanged"
//!     }
//!   ],
//!   "skipped": [{ "path": "/backups/.../locked.db", "reason": "Permission denied: ..." }],
//!   "plan": { "script": "/backups/reclaim_plans/reclaim_20240502_093015.sh", "files": 1, "bytes": 5 },
//!   "summary": {
//!     "total_files": 1,
//!     "changed": 0,
//!     "new": 0,
//!     "unchanged": 1,
//!     "carried_forward": 0,
//!     "skipped": 1,
//!     "bytes_hashed": 5,
//!     "reclaimable_space": 5,
//!     "duration_ms": 12,
//!     "exit_code": 0,
//!     "exit_code_name": "SL000"
//!   }
//! }
//! ```

use std::io::Write;

use serde::Serialize;

use crate::actions::{ReclaimOutcome, ReclaimPlan};
use crate::duplicates::ClassifiedFile;
use crate::error::ExitCode;
use crate::ledger::LedgerStatus;
use crate::pipeline::{TrackOutcome, TrackReport};

/// A file that was left out of the manifest.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSkipped {
    /// Absolute path
    pub path: String,
    /// Why it was skipped
    pub reason: String,
}

/// The reclaim plan, if one was made.
#[derive(Debug, Clone, Serialize)]
pub struct JsonPlan {
    /// Exported plan script, if written
    pub script: Option<String>,
    /// Number of files in the plan
    pub files: usize,
    /// Bytes the plan would free
    pub bytes: u64,
}

/// Result of an in-process reclaim.
#[derive(Debug, Clone, Serialize)]
pub struct JsonReclaim {
    /// `aborted` or `executed`
    pub status: &'static str,
    /// Files removed (or trashed)
    pub removed: Vec<String>,
    /// Files already gone at execution time
    pub missing: Vec<String>,
    /// Files that could not be removed
    pub failed: Vec<JsonSkipped>,
    /// Bytes freed
    pub bytes_freed: u64,
}

impl From<&ReclaimOutcome> for JsonReclaim {
    fn from(outcome: &ReclaimOutcome) -> Self {
        match outcome {
            ReclaimOutcome::Aborted => Self {
                status: "aborted",
                removed: Vec::new(),
                missing: Vec::new(),
                failed: Vec::new(),
                bytes_freed: 0,
            },
            ReclaimOutcome::Executed(batch) => Self {
                status: "executed",
                removed: batch.successes.iter().map(|r| normalize_path(&r.path)).collect(),
                missing: batch.missing.iter().map(|p| normalize_path(p)).collect(),
                failed: batch
                    .failures
                    .iter()
                    .map(|(path, reason)| JsonSkipped {
                        path: normalize_path(path),
                        reason: reason.clone(),
                    })
                    .collect(),
                bytes_freed: batch.bytes_freed,
            },
        }
    }
}

/// Summary statistics in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSummary {
    /// Files in the manifest
    pub total_files: usize,
    /// New or modified files
    pub changed: usize,
    /// Files never seen before
    pub new: usize,
    /// Files identical to the previous run
    pub unchanged: usize,
    /// Ledger entries kept for paths absent from this run
    pub carried_forward: usize,
    /// Files that could not be hashed
    pub skipped: usize,
    /// Bytes hashed
    pub bytes_hashed: u64,
    /// Space held by unchanged files (bytes)
    pub reclaimable_space: u64,
    /// Duration of the run in milliseconds
    pub duration_ms: u64,
    /// The exit code number
    pub exit_code: i32,
    /// The machine-readable exit code name (e.g., "SL000")
    pub exit_code_name: String,
}

/// Complete JSON output structure.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput<'a> {
    /// `tracked` or `nothing_to_classify`
    pub status: &'static str,
    /// Run directory
    pub run_dir: String,
    /// Manifest file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<String>,
    /// `missing`, `loaded` or `corrupt`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_status: Option<&'static str>,
    /// The run had been tracked before; nothing was written or planned
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retracked: bool,
    /// Per-file classification
    pub files: &'a [ClassifiedFile],
    /// Files left out of the manifest
    pub skipped: Vec<JsonSkipped>,
    /// The reclaim plan
    pub plan: Option<JsonPlan>,
    /// In-process reclaim, when `--execute` was given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reclaim: Option<JsonReclaim>,
    /// Device cleanup script written by `backup --device-cleanup-script`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_cleanup_script: Option<String>,
    /// Summary statistics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<JsonSummary>,
}

fn ledger_status_name(status: &LedgerStatus) -> &'static str {
    match status {
        LedgerStatus::Missing => "missing",
        LedgerStatus::Loaded => "loaded",
        LedgerStatus::Corrupt { .. } => "corrupt",
    }
}

impl<'a> JsonOutput<'a> {
    /// Create JSON output for a tracked run.
    #[must_use]
    pub fn from_report(report: &'a TrackReport, exit_code: ExitCode) -> Self {
        let c = &report.classification;
        Self {
            status: "tracked",
            run_dir: normalize_path(&report.run_dir),
            manifest: Some(normalize_path(&report.manifest_path)),
            ledger_status: Some(ledger_status_name(&report.ledger_status)),
            retracked: report.retracked,
            files: &c.files,
            skipped: report
                .skipped_files
                .iter()
                .map(|(path, reason)| JsonSkipped {
                    path: normalize_path(path),
                    reason: reason.clone(),
                })
                .collect(),
            plan: report.plan.as_ref().map(|plan| JsonPlan {
                script: report.plan_script.as_deref().map(normalize_path),
                files: plan.len(),
                bytes: plan.total_bytes(),
            }),
            reclaim: None,
            device_cleanup_script: None,
            summary: Some(JsonSummary {
                total_files: c.files.len(),
                changed: c.changed_count(),
                new: c.new_count(),
                unchanged: c.unchanged_count(),
                carried_forward: c.carried_forward,
                skipped: report.skipped_files.len(),
                bytes_hashed: report.bytes_hashed,
                reclaimable_space: report.plan.as_ref().map_or(0, ReclaimPlan::total_bytes),
                duration_ms: u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
                exit_code: exit_code.as_i32(),
                exit_code_name: exit_code.code_prefix().to_string(),
            }),
        }
    }

    /// Create JSON output for any tracking outcome.
    #[must_use]
    pub fn from_outcome(outcome: &'a TrackOutcome, exit_code: ExitCode) -> Self {
        match outcome {
            TrackOutcome::Tracked(report) => Self::from_report(report, exit_code),
            TrackOutcome::NothingToClassify { run_dir } => Self {
                status: "nothing_to_classify",
                run_dir: normalize_path(run_dir),
                manifest: None,
                ledger_status: None,
                retracked: false,
                files: &[],
                skipped: Vec::new(),
                plan: None,
                reclaim: None,
                device_cleanup_script: None,
                summary: None,
            },
        }
    }

    /// Attach the result of an in-process reclaim.
    #[must_use]
    pub fn with_reclaim(mut self, outcome: &ReclaimOutcome) -> Self {
        self.reclaim = Some(JsonReclaim::from(outcome));
        self
    }

    /// Attach the device cleanup script written by the backup.
    #[must_use]
    pub fn with_device_cleanup_script(mut self, script: &std::path::Path) -> Self {
        self.device_cleanup_script = Some(normalize_path(script));
        self
    }

    /// Serialize to a compact JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to a pretty-printed JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write pretty JSON followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        serde_json::to_writer_pretty(&mut *writer, self)?;
        writeln!(writer)
    }
}

/// Render a path for JSON, using forward slashes on every platform.
fn normalize_path(path: &std::path::Path) -> String {
    let s = path.to_string_lossy();
    if cfg!(windows) {
        s.replace('\\', "/")
    } else {
        s.into_owned()
    }
}
