//! End-to-end orchestration of a run.
//!
//! Tracking a run directory goes through these steps, strictly in this
//! order:
//!
//! 1. scan and hash every file,
//! 2. persist the manifest,
//! 3. load the ledger,
//! 4. classify,
//! 5. save the updated ledger,
//! 6. plan (and optionally export) the reclaim.
//!
//! A failure in step 2 leaves the ledger untouched, and an interrupt during
//! step 1 aborts before anything is written.
//!
//! A run that already carries a manifest has been tracked before, and the
//! ledger may hold fingerprints that this very run recorded. Tracking it
//! again only reports: the manifest and ledger are left as they are and no
//! reclaim is planned, since a match could be the run's own first copy.
//!
//! Backups add a bulk copy from the device in front of step 1, and can list
//! the backed-up media still on the device for a cleanup script; restores
//! push a run's media back.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use thiserror::Error;

use crate::actions::reclaim::{self, PlanDecision, ReclaimPlan};
use crate::device::{DeviceError, DevicePuller, PathMapping, PullOutcome};
use crate::duplicates::{classify, Classification};
use crate::fsutil::PersistError;
use crate::ledger::{LedgerError, LedgerStatus, LedgerStore};
use crate::manifest::{persist_manifest, Manifest};
use crate::output::script::{write_plan_script, ScriptError, ScriptType};
use crate::progress::ProgressCallback;
use crate::run_dir::RunDirectory;
use crate::scanner::{RelativePath, ScanError, SnapshotScanner};

/// Subdirectory of a run that holds pulled media directories.
pub const MEDIA_SUBDIR: &str = "media";
/// Subdirectory of a run that holds the CapCut app data.
pub const CAPCUT_SUBDIR: &str = "capcut_app";
/// Subdirectory of a run that holds the PortoDB databases.
pub const PORTODB_SUBDIR: &str = "portodb";

/// Errors that stop a pipeline step.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The run directory could not be scanned.
    #[error(transparent)]
    Scan(ScanError),

    /// The manifest could not be written; the ledger was not touched.
    #[error("failed to persist manifest: {0}")]
    Manifest(#[source] PersistError),

    /// Loading or saving the ledger failed; the previous ledger is intact.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The plan script could not be written. The ledger is already saved.
    #[error(transparent)]
    Script(#[from] ScriptError),

    /// The device tool could not be run.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// Creating a directory failed.
    #[error("failed to create {path}: {source}")]
    CreateDir {
        /// Directory path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Cancelled by the user; nothing was persisted.
    #[error("interrupted before anything was persisted")]
    Interrupted,
}

impl From<ScanError> for PipelineError {
    fn from(e: ScanError) -> Self {
        match e {
            ScanError::Interrupted => Self::Interrupted,
            other => Self::Scan(other),
        }
    }
}

impl PipelineError {
    /// Whether this error represents a user interrupt.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

/// Options for [`track_run`].
#[derive(Debug, Clone)]
pub struct TrackOptions {
    /// Ledger file.
    pub ledger_path: PathBuf,
    /// Where plan scripts go; `None` skips exporting.
    pub plan_dir: Option<PathBuf>,
    /// Plan script flavor.
    pub script_type: ScriptType,
    /// Path translation for PowerShell plan scripts.
    pub path_mapping: PathMapping,
    /// Cancels the scan between files.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
}

impl TrackOptions {
    /// Options using the default ledger under `backup_root` and no export.
    #[must_use]
    pub fn for_backup_root(backup_root: &Path) -> Self {
        Self {
            ledger_path: LedgerStore::at_backup_root(backup_root).path().to_path_buf(),
            plan_dir: None,
            script_type: ScriptType::detect(),
            path_mapping: PathMapping::Identity,
            shutdown_flag: None,
        }
    }

    /// Export plan scripts into `plan_dir`.
    #[must_use]
    pub fn with_plan_dir(mut self, plan_dir: impl Into<PathBuf>) -> Self {
        self.plan_dir = Some(plan_dir.into());
        self
    }

    /// Cancel the scan once `flag` is set.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }
}

/// Everything learned while tracking one run.
#[derive(Debug, Clone)]
pub struct TrackReport {
    /// The run directory.
    pub run_dir: PathBuf,
    /// Where the manifest was written.
    pub manifest_path: PathBuf,
    /// Files that could not be hashed or keyed, with the reason.
    pub skipped_files: Vec<(PathBuf, String)>,
    /// Symlinks and special files left out of the manifest.
    pub ignored_entries: Vec<PathBuf>,
    /// Bytes hashed.
    pub bytes_hashed: u64,
    /// State of the ledger before this run.
    pub ledger_status: LedgerStatus,
    /// The run already had a manifest. Nothing was written and no plan was
    /// made.
    pub retracked: bool,
    /// Per-file classification and the saved ledger.
    pub classification: Classification,
    /// The reclaim plan, if anything is reclaimable.
    pub plan: Option<ReclaimPlan>,
    /// The exported plan script, if one was written.
    pub plan_script: Option<PathBuf>,
    /// Wall time.
    pub duration: Duration,
}

impl TrackReport {
    /// Whether some files were left out because they failed to hash.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.skipped_files.is_empty()
    }
}

/// Result of [`track_run`].
#[derive(Debug, Clone)]
pub enum TrackOutcome {
    /// The run directory is missing or holds no files yet. Nothing was
    /// written.
    NothingToClassify {
        /// The run directory.
        run_dir: PathBuf,
    },
    /// The run was tracked.
    Tracked(Box<TrackReport>),
}

/// Track a populated run directory: manifest, classify, save the ledger,
/// plan the reclaim.
///
/// # Errors
///
/// See [`PipelineError`]. Per-file hash failures are not errors; they are
/// listed in [`TrackReport::skipped_files`].
pub fn track_run(
    run_dir: &Path,
    options: &TrackOptions,
    progress: Option<&dyn ProgressCallback>,
) -> Result<TrackOutcome, PipelineError> {
    let started = Instant::now();

    if !run_dir.is_dir() {
        log::info!("Nothing to classify: {} does not exist", run_dir.display());
        return Ok(TrackOutcome::NothingToClassify {
            run_dir: run_dir.to_path_buf(),
        });
    }

    log::info!("Hashing files under {}", run_dir.display());
    let mut scanner = SnapshotScanner::new(run_dir);
    if let Some(flag) = &options.shutdown_flag {
        scanner = scanner.with_shutdown_flag(Arc::clone(flag));
    }
    let scan = scanner.scan(progress)?;

    if scan.entries.is_empty() && scan.errors.is_empty() {
        log::info!("Nothing to classify: {} has no files", run_dir.display());
        return Ok(TrackOutcome::NothingToClassify {
            run_dir: run_dir.to_path_buf(),
        });
    }
    if is_cancelled(options) {
        return Err(PipelineError::Interrupted);
    }

    let skipped_files: Vec<(PathBuf, String)> = scan
        .errors
        .iter()
        .map(|e| (error_path(e, run_dir), e.to_string()))
        .collect();
    for (path, reason) in &skipped_files {
        log::warn!("Skipped {}: {}", path.display(), reason);
    }

    let retracked = RunDirectory::open(run_dir).has_manifest();
    let manifest = if retracked {
        log::warn!(
            "{} was tracked before; reporting only, the manifest and ledger are kept and nothing is planned",
            run_dir.display()
        );
        Manifest::from_scan(run_dir, &scan)
    } else {
        let manifest = persist_manifest(run_dir, &scan).map_err(PipelineError::Manifest)?;
        log::info!(
            "Manifest written: {} files ({} skipped)",
            manifest.len(),
            skipped_files.len()
        );
        manifest
    };

    let store = LedgerStore::new(&options.ledger_path);
    let loaded = store.load()?;
    if matches!(loaded.status, LedgerStatus::Corrupt { .. }) && !retracked {
        if let Err(e) = store.quarantine() {
            log::warn!("{}", e);
        }
    }

    let classification = classify(&manifest, &loaded.ledger);
    let plan = if retracked {
        None
    } else {
        store.save(&classification.ledger)?;
        log::info!("Ledger updated: {} paths tracked", classification.ledger.len());
        match reclaim::plan(&classification, Local::now()) {
            PlanDecision::NothingToReclaim => None,
            PlanDecision::Plan(plan) => Some(plan),
        }
    };
    let plan_script = match (&plan, &options.plan_dir) {
        (Some(plan), Some(dir)) => Some(write_plan_script(
            plan,
            dir,
            options.script_type,
            options.path_mapping,
        )?),
        _ => None,
    };

    Ok(TrackOutcome::Tracked(Box::new(TrackReport {
        run_dir: run_dir.to_path_buf(),
        manifest_path: manifest.file_path(),
        skipped_files,
        ignored_entries: scan.skipped.clone(),
        bytes_hashed: scan.total_size(),
        ledger_status: loaded.status,
        retracked,
        classification,
        plan,
        plan_script,
        duration: started.elapsed(),
    })))
}

fn is_cancelled(options: &TrackOptions) -> bool {
    options
        .shutdown_flag
        .as_ref()
        .is_some_and(|f| f.load(Ordering::SeqCst))
}

fn error_path(error: &ScanError, fallback: &Path) -> PathBuf {
    match error {
        ScanError::PermissionDenied(p) | ScanError::NotFound(p) | ScanError::NotADirectory(p) => {
            p.clone()
        }
        ScanError::DuplicateKey { path, .. } | ScanError::Io { path, .. } => path.clone(),
        ScanError::HashError(e) => e.path().to_path_buf(),
        ScanError::InvalidPath(_) | ScanError::Interrupted => fallback.to_path_buf(),
    }
}

/// Device directories to copy into a run.
#[derive(Debug, Clone, Default)]
pub struct BackupSources {
    /// Media directories, each pulled into `<run>/media/<basename>`.
    pub media_dirs: Vec<String>,
    /// CapCut app data, pulled into `<run>/capcut_app/`.
    pub capcut_dir: Option<String>,
    /// PortoDB databases, pulled into `<run>/portodb/`.
    pub portodb_dir: Option<String>,
    /// Leave PortoDB out of this run.
    pub skip_portodb: bool,
}

/// How one transfer went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    /// Copied.
    Done,
    /// The tool reported a failure, or the local path could not be
    /// handed to it.
    Failed {
        /// What the tool printed.
        diagnostics: String,
    },
    /// Not attempted.
    Skipped {
        /// Why.
        reason: String,
    },
}

impl From<PullOutcome> for TransferStatus {
    fn from(outcome: PullOutcome) -> Self {
        match outcome {
            PullOutcome::Success => Self::Done,
            PullOutcome::PartialFailure { diagnostics } => Self::Failed { diagnostics },
        }
    }
}

/// One device transfer.
#[derive(Debug, Clone)]
pub struct TransferReport {
    /// Device path.
    pub remote: String,
    /// Local path.
    pub local: PathBuf,
    /// Result.
    pub status: TransferStatus,
}

/// Last path segment of a device directory, ignoring trailing slashes.
fn remote_basename(remote: &str) -> Option<&str> {
    remote
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
}

/// Parent of a device directory (`/sdcard/DCIM/Camera` -> `/sdcard/DCIM`).
fn remote_parent(remote: &str) -> Option<&str> {
    let trimmed = remote.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some(("", _)) => Some("/"),
        Some((parent, _)) => Some(parent),
        None => None,
    }
}

fn ensure_dir(path: &Path) -> Result<(), PipelineError> {
    std::fs::create_dir_all(path).map_err(|source| PipelineError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

/// Turn a transfer result into a status. A path that cannot be handed to
/// the tool fails just this transfer; a tool that cannot run stops them all.
fn transfer_status(
    remote: &str,
    result: Result<PullOutcome, DeviceError>,
) -> Result<TransferStatus, PipelineError> {
    match result {
        Ok(outcome) => Ok(TransferStatus::from(outcome)),
        Err(DeviceError::PathMap(e)) => {
            log::warn!("Path conversion failed for {}: {}", remote, e);
            Ok(TransferStatus::Failed {
                diagnostics: format!("path conversion failed: {e}"),
            })
        }
        Err(e) => Err(e.into()),
    }
}

fn pull_into(
    puller: &dyn DevicePuller,
    remote: &str,
    local_parent: PathBuf,
) -> Result<TransferReport, PipelineError> {
    let remote = remote.trim_end_matches('/');
    ensure_dir(&local_parent)?;
    log::info!("Pulling {} ...", remote);
    let status = transfer_status(remote, puller.pull(remote, &local_parent))?;
    match &status {
        TransferStatus::Failed { diagnostics } => {
            log::warn!("Pull of {} may have failed: {}", remote, diagnostics);
        }
        _ => log::info!("Pulled {} into {}", remote, local_parent.display()),
    }
    Ok(TransferReport {
        remote: remote.to_string(),
        local: local_parent,
        status,
    })
}

/// Copy every configured source from the device into `run`.
///
/// A failed transfer is reported and the remaining sources are still
/// attempted.
///
/// # Errors
///
/// Returns [`PipelineError::Device`] if the device tool cannot be run at
/// all, or [`PipelineError::CreateDir`] if a destination cannot be created.
/// A destination the tool cannot address is reported as a failed transfer.
pub fn pull_sources(
    puller: &dyn DevicePuller,
    run: &RunDirectory,
    sources: &BackupSources,
) -> Result<Vec<TransferReport>, PipelineError> {
    let mut reports = Vec::new();

    match (&sources.portodb_dir, sources.skip_portodb) {
        (Some(_), true) => log::info!("PortoDB backup skipped by request"),
        (Some(dir), false) => reports.push(pull_into(puller, dir, run.subdir(PORTODB_SUBDIR))?),
        (None, _) => log::info!("No PortoDB directory configured; skipping"),
    }

    if let Some(dir) = &sources.capcut_dir {
        reports.push(pull_into(puller, dir, run.subdir(CAPCUT_SUBDIR))?);
    }

    if sources.media_dirs.is_empty() {
        log::info!("No media directories configured; skipping media backup");
    }
    for dir in &sources.media_dirs {
        if remote_basename(dir).is_none() {
            log::warn!("Skipping invalid media directory {:?}", dir);
            reports.push(TransferReport {
                remote: dir.clone(),
                local: run.subdir(MEDIA_SUBDIR),
                status: TransferStatus::Skipped {
                    reason: "no directory name".to_string(),
                },
            });
            continue;
        }
        reports.push(pull_into(puller, dir, run.subdir(MEDIA_SUBDIR))?);
    }

    Ok(reports)
}

/// Device media files that now have a copy in `run`, for the device cleanup
/// script.
///
/// Only media directories whose pull succeeded are listed. A listed file
/// without a regular-file counterpart under `<run>/media/<basename>/` was
/// not captured by this backup (for example, it appeared on the device
/// after the pull) and is left off with a warning.
///
/// # Errors
///
/// Returns [`PipelineError::Device`] if the device tool cannot be run.
pub fn list_backed_up_media(
    puller: &dyn DevicePuller,
    run: &RunDirectory,
    media_dirs: &[String],
    transfers: &[TransferReport],
) -> Result<Vec<String>, PipelineError> {
    let mut files = Vec::new();

    for dir in media_dirs {
        let remote = dir.trim_end_matches('/');
        let Some(name) = remote_basename(remote) else {
            continue;
        };
        let pulled = transfers
            .iter()
            .any(|t| t.remote == remote && t.status == TransferStatus::Done);
        if !pulled {
            log::warn!("{} was not backed up in this run; not listing it for cleanup", remote);
            continue;
        }

        log::info!("Listing files for cleanup under {} ...", remote);
        let local_root = run.subdir(MEDIA_SUBDIR).join(name);
        let prefix = format!("{remote}/");
        let mut not_captured = 0usize;
        for device_path in puller.list_files(remote)? {
            let captured = device_path
                .strip_prefix(&prefix)
                .and_then(|rel| RelativePath::parse(rel).ok())
                .is_some_and(|rel| rel.resolve(&local_root).is_file());
            if captured {
                files.push(device_path);
            } else {
                log::debug!("No local copy of {}; leaving it on the device", device_path);
                not_captured += 1;
            }
        }
        if not_captured > 0 {
            log::warn!(
                "{} file(s) under {} have no copy in this run and are left off the cleanup list",
                not_captured,
                remote
            );
        }
    }

    log::info!("Collected {} media file(s) for the device cleanup script", files.len());
    Ok(files)
}

/// Push each configured media directory from `run` back to its parent on
/// the device.
///
/// # Errors
///
/// Returns [`PipelineError::Device`] if the device tool cannot be run.
pub fn restore_media(
    puller: &dyn DevicePuller,
    run: &RunDirectory,
    media_dirs: &[String],
) -> Result<Vec<TransferReport>, PipelineError> {
    let media_root = run.subdir(MEDIA_SUBDIR);
    let mut reports = Vec::new();

    if !media_root.is_dir() {
        log::info!("No media folder in {}; nothing to restore", run.path().display());
        return Ok(reports);
    }

    for dir in media_dirs {
        let remote = dir.trim_end_matches('/');
        let (Some(name), Some(parent)) = (remote_basename(remote), remote_parent(remote)) else {
            log::warn!("Skipping invalid media directory {:?}", dir);
            reports.push(TransferReport {
                remote: dir.clone(),
                local: media_root.clone(),
                status: TransferStatus::Skipped {
                    reason: "no directory name".to_string(),
                },
            });
            continue;
        };

        let local = media_root.join(name);
        if !local.is_dir() {
            log::info!("Local media dir not found for {}: {}", remote, local.display());
            reports.push(TransferReport {
                remote: remote.to_string(),
                local,
                status: TransferStatus::Skipped {
                    reason: "not present in this run".to_string(),
                },
            });
            continue;
        }

        log::info!("Restoring {} to {} ...", name, parent);
        let status = transfer_status(remote, puller.push(&local, parent))?;
        if let TransferStatus::Failed { diagnostics } = &status {
            log::warn!("Restore of {} may have failed: {}", remote, diagnostics);
        }
        reports.push(TransferReport {
            remote: remote.to_string(),
            local,
            status,
        });
    }

    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceInfo;
    use crate::duplicates::FileStatus;
    use crate::manifest::MANIFEST_FILE_NAME;
    use std::cell::RefCell;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_remote_names() {
        assert_eq!(remote_basename("/sdcard/DCIM/Camera/"), Some("Camera"));
        assert_eq!(remote_basename("/"), None);
        assert_eq!(remote_parent("/sdcard/DCIM/Camera"), Some("/sdcard/DCIM"));
        assert_eq!(remote_parent("/sdcard"), Some("/"));
        assert_eq!(remote_parent("Camera"), None);
    }

    #[test]
    fn test_missing_run_dir_is_nothing_to_classify() {
        let root = TempDir::new().unwrap();
        let options = TrackOptions::for_backup_root(root.path());
        let outcome = track_run(&root.path().join("2024/01/01/0000"), &options, None).unwrap();
        assert!(matches!(outcome, TrackOutcome::NothingToClassify { .. }));
        assert!(!options.ledger_path.exists());
    }

    #[test]
    fn test_empty_run_dir_is_nothing_to_classify() {
        let root = TempDir::new().unwrap();
        let run = root.path().join("run");
        fs::create_dir(&run).unwrap();
        let options = TrackOptions::for_backup_root(root.path());

        let outcome = track_run(&run, &options, None).unwrap();
        assert!(matches!(outcome, TrackOutcome::NothingToClassify { .. }));
        assert!(!run.join(MANIFEST_FILE_NAME).exists());
    }

    #[test]
    fn test_interrupt_persists_nothing() {
        let root = TempDir::new().unwrap();
        let run = root.path().join("run");
        fs::create_dir(&run).unwrap();
        fs::write(run.join("a.txt"), "hello").unwrap();

        let flag = Arc::new(AtomicBool::new(true));
        let options = TrackOptions::for_backup_root(root.path()).with_shutdown_flag(flag);
        let err = track_run(&run, &options, None).unwrap_err();

        assert!(err.is_interrupted());
        assert!(!run.join(MANIFEST_FILE_NAME).exists());
        assert!(!options.ledger_path.exists());
    }

    #[test]
    fn test_track_writes_manifest_ledger_and_plan() {
        let root = TempDir::new().unwrap();
        let options =
            TrackOptions::for_backup_root(root.path()).with_plan_dir(root.path().join("plans"));

        let run1 = root.path().join("r1");
        fs::create_dir(&run1).unwrap();
        fs::write(run1.join("a.txt"), "hello").unwrap();
        let TrackOutcome::Tracked(first) = track_run(&run1, &options, None).unwrap() else {
            panic!("expected a tracked run");
        };
        assert_eq!(first.ledger_status, LedgerStatus::Missing);
        assert!(first.plan.is_none());
        assert!(first.plan_script.is_none());
        assert!(run1.join(MANIFEST_FILE_NAME).exists());

        let run2 = root.path().join("r2");
        fs::create_dir(&run2).unwrap();
        fs::write(run2.join("a.txt"), "hello").unwrap();
        let TrackOutcome::Tracked(second) = track_run(&run2, &options, None).unwrap() else {
            panic!("expected a tracked run");
        };
        assert_eq!(second.ledger_status, LedgerStatus::Loaded);
        assert_eq!(second.classification.files[0].status, FileStatus::Unchanged);
        let plan = second.plan.as_ref().unwrap();
        assert_eq!(plan.entries[0].path, run2.join("a.txt"));
        assert!(second.plan_script.as_ref().unwrap().starts_with(root.path().join("plans")));
        // The plan only proposes; the file is still there.
        assert!(run2.join("a.txt").exists());
    }

    #[test]
    fn test_retracking_plans_nothing_and_writes_nothing() {
        let root = TempDir::new().unwrap();
        let options =
            TrackOptions::for_backup_root(root.path()).with_plan_dir(root.path().join("plans"));
        let run = root.path().join("r1");
        fs::create_dir(&run).unwrap();
        fs::write(run.join("only_copy.jpg"), "pixels").unwrap();

        track_run(&run, &options, None).unwrap();
        let manifest_before = fs::read(run.join(MANIFEST_FILE_NAME)).unwrap();
        let ledger_before = fs::read(&options.ledger_path).unwrap();

        // A file added after the first track is reported but not recorded.
        fs::write(run.join("late.jpg"), "late").unwrap();
        let TrackOutcome::Tracked(again) = track_run(&run, &options, None).unwrap() else {
            panic!("expected a tracked run");
        };

        assert!(again.retracked);
        assert!(again.plan.is_none());
        assert!(again.plan_script.is_none());
        assert_eq!(again.classification.files.len(), 2);
        assert_eq!(fs::read(run.join(MANIFEST_FILE_NAME)).unwrap(), manifest_before);
        assert_eq!(fs::read(&options.ledger_path).unwrap(), ledger_before);
        assert!(!root.path().join("plans").exists());
    }

    #[test]
    fn test_corrupt_ledger_is_quarantined() {
        let root = TempDir::new().unwrap();
        let options = TrackOptions::for_backup_root(root.path());
        fs::write(&options.ledger_path, "not json").unwrap();

        let run = root.path().join("r1");
        fs::create_dir(&run).unwrap();
        fs::write(run.join("a.txt"), "hello").unwrap();

        let TrackOutcome::Tracked(report) = track_run(&run, &options, None).unwrap() else {
            panic!("expected a tracked run");
        };
        assert!(matches!(report.ledger_status, LedgerStatus::Corrupt { .. }));
        assert_eq!(report.classification.new_count(), 1);

        let mut aside = options.ledger_path.clone().into_os_string();
        aside.push(".corrupt");
        assert_eq!(fs::read_to_string(PathBuf::from(aside)).unwrap(), "not json");
        assert!(fs::read_to_string(&options.ledger_path)
            .unwrap()
            .contains("a.txt"));
    }

    /// Records calls and creates `<dest>/<basename>` for pulls.
    struct FakePuller {
        calls: RefCell<Vec<String>>,
        fail: Option<&'static str>,
        unmappable: Option<&'static str>,
        listing: Vec<String>,
    }

    impl FakePuller {
        fn new() -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                fail: None,
                unmappable: None,
                listing: Vec::new(),
            }
        }
    }

    impl DevicePuller for FakePuller {
        fn pull(&self, remote: &str, local_dest: &Path) -> Result<PullOutcome, DeviceError> {
            self.calls.borrow_mut().push(format!("pull {remote}"));
            if self.unmappable == Some(remote) {
                return Err(DeviceError::PathMap(crate::device::PathMapError::NotUnderMnt(
                    local_dest.to_path_buf(),
                )));
            }
            if self.fail == Some(remote) {
                return Ok(PullOutcome::PartialFailure {
                    diagnostics: "remote object does not exist".to_string(),
                });
            }
            let name = remote_basename(remote).unwrap_or("x");
            fs::create_dir_all(local_dest.join(name)).unwrap();
            fs::write(local_dest.join(name).join("f.bin"), remote).unwrap();
            Ok(PullOutcome::Success)
        }

        fn push(&self, local: &Path, remote_parent: &str) -> Result<PullOutcome, DeviceError> {
            let name = local.file_name().unwrap().to_string_lossy();
            self.calls
                .borrow_mut()
                .push(format!("push {name} -> {remote_parent}"));
            Ok(PullOutcome::Success)
        }

        fn list_files(&self, remote_dir: &str) -> Result<Vec<String>, DeviceError> {
            self.calls.borrow_mut().push(format!("list {remote_dir}"));
            Ok(self
                .listing
                .iter()
                .filter(|f| f.starts_with(remote_dir))
                .cloned()
                .collect())
        }

        fn list_devices(&self) -> Result<Vec<DeviceInfo>, DeviceError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_unmappable_destination_fails_only_that_transfer() {
        let root = TempDir::new().unwrap();
        let run = RunDirectory::open(root.path().join("run"));
        let sources = BackupSources {
            media_dirs: vec!["/sdcard/DCIM/Camera".to_string()],
            capcut_dir: Some("/sdcard/capcut".to_string()),
            ..BackupSources::default()
        };
        let mut puller = FakePuller::new();
        puller.unmappable = Some("/sdcard/capcut");

        let reports = pull_sources(&puller, &run, &sources).unwrap();
        assert_eq!(reports.len(), 2);
        match &reports[0].status {
            TransferStatus::Failed { diagnostics } => {
                assert!(diagnostics.contains("path conversion failed"), "{diagnostics}");
            }
            other => panic!("expected a failed transfer, got {other:?}"),
        }
        assert_eq!(reports[1].status, TransferStatus::Done);
        assert!(run.path().join("media/Camera/f.bin").exists());
    }

    #[test]
    fn test_list_backed_up_media_keeps_only_captured_files() {
        let root = TempDir::new().unwrap();
        let run = RunDirectory::open(root.path().join("run"));
        let sources = BackupSources {
            media_dirs: vec!["/sdcard/DCIM/Camera/".to_string(), "/sdcard/Pictures".to_string()],
            ..BackupSources::default()
        };
        let mut puller = FakePuller::new();
        puller.fail = Some("/sdcard/Pictures");
        puller.listing = vec![
            "/sdcard/DCIM/Camera/f.bin".to_string(),
            "/sdcard/DCIM/Camera/taken_after_pull.jpg".to_string(),
            "/sdcard/DCIM/Camera/../escape.jpg".to_string(),
            "/sdcard/Pictures/p.jpg".to_string(),
        ];

        let transfers = pull_sources(&puller, &run, &sources).unwrap();
        let files = list_backed_up_media(&puller, &run, &sources.media_dirs, &transfers).unwrap();

        assert_eq!(files, vec!["/sdcard/DCIM/Camera/f.bin"]);
        // The failed pull is never listed.
        assert!(!puller.calls.into_inner().contains(&"list /sdcard/Pictures".to_string()));
    }

    #[test]
    fn test_pull_sources_layout() {
        let root = TempDir::new().unwrap();
        let run = RunDirectory::open(root.path().join("run"));
        let sources = BackupSources {
            media_dirs: vec!["/sdcard/DCIM/Camera/".to_string(), "/".to_string()],
            capcut_dir: Some("/sdcard/Android/data/com.lemon.lvoverseas".to_string()),
            portodb_dir: Some("/sdcard/PortoDB".to_string()),
            skip_portodb: false,
        };
        let mut puller = FakePuller::new();
        puller.fail = Some("/sdcard/PortoDB");

        let reports = pull_sources(&puller, &run, &sources).unwrap();
        assert_eq!(reports.len(), 4);
        assert!(matches!(reports[0].status, TransferStatus::Failed { .. }));
        assert_eq!(reports[1].status, TransferStatus::Done);
        assert_eq!(reports[2].status, TransferStatus::Done);
        assert!(matches!(reports[3].status, TransferStatus::Skipped { .. }));
        assert!(run.path().join("media/Camera/f.bin").exists());
        assert!(run.path().join("capcut_app/com.lemon.lvoverseas").is_dir());
        assert_eq!(
            puller.calls.into_inner(),
            vec![
                "pull /sdcard/PortoDB",
                "pull /sdcard/Android/data/com.lemon.lvoverseas",
                "pull /sdcard/DCIM/Camera",
            ]
        );
    }

    #[test]
    fn test_skip_portodb() {
        let root = TempDir::new().unwrap();
        let run = RunDirectory::open(root.path().join("run"));
        let sources = BackupSources {
            portodb_dir: Some("/sdcard/PortoDB".to_string()),
            skip_portodb: true,
            ..BackupSources::default()
        };
        let puller = FakePuller::new();
        assert!(pull_sources(&puller, &run, &sources).unwrap().is_empty());
        assert!(puller.calls.into_inner().is_empty());
    }

    #[test]
    fn test_restore_media() {
        let root = TempDir::new().unwrap();
        let run = RunDirectory::open(root.path());
        fs::create_dir_all(root.path().join("media/Camera")).unwrap();

        let puller = FakePuller::new();
        let dirs = vec![
            "/sdcard/DCIM/Camera".to_string(),
            "/sdcard/Pictures".to_string(),
        ];
        let reports = restore_media(&puller, &run, &dirs).unwrap();

        assert_eq!(reports[0].status, TransferStatus::Done);
        assert!(matches!(reports[1].status, TransferStatus::Skipped { .. }));
        assert_eq!(puller.calls.into_inner(), vec!["push Camera -> /sdcard/DCIM"]);
    }

    #[test]
    fn test_restore_without_media_folder() {
        let root = TempDir::new().unwrap();
        let puller = FakePuller::new();
        let reports = restore_media(
            &puller,
            &RunDirectory::open(root.path()),
            &["/sdcard/DCIM/Camera".to_string()],
        )
        .unwrap();
        assert!(reports.is_empty());
    }
}
