//! Timestamped run directories under a backup root.
//!
//! Each backup lands in `<backup_root>/<YYYY>/<MM>/<DD>/<HHMM>`, with a
//! `_N` suffix when that minute is already taken. A run directory is
//! considered complete once it carries a manifest.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};
use walkdir::WalkDir;

use crate::manifest::MANIFEST_FILE_NAME;

/// Depth of run directories below the backup root (year/month/day/time).
pub const RUN_DIR_DEPTH: usize = 4;

/// A run directory on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDirectory {
    path: PathBuf,
}

impl RunDirectory {
    /// Path for a run started at `started`.
    #[must_use]
    pub fn path_for<Tz: TimeZone>(backup_root: &Path, started: &DateTime<Tz>) -> PathBuf {
        backup_root
            .join(format!("{:04}", started.year()))
            .join(format!("{:02}", started.month()))
            .join(format!("{:02}", started.day()))
            .join(format!("{:02}{:02}", started.hour(), started.minute()))
    }

    /// Create a fresh run directory for `started`.
    ///
    /// An existing directory is never reused: a second run within the same
    /// minute gets `HHMM_2`, then `HHMM_3`, and so on.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from creating the directories.
    pub fn create(backup_root: &Path, started: &DateTime<Local>) -> io::Result<Self> {
        let base = Self::path_for(backup_root, started);
        if let Some(day) = base.parent() {
            fs::create_dir_all(day)?;
        }
        let stem = format!("{:02}{:02}", started.hour(), started.minute());

        let mut path = base;
        let mut attempt = 1u32;
        loop {
            match fs::create_dir(&path) {
                Ok(()) => break,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    attempt += 1;
                    path = path.with_file_name(format!("{stem}_{attempt}"));
                }
                Err(e) => return Err(e),
            }
        }
        if attempt > 1 {
            log::warn!("Run directory for {stem} already exists; using {}", path.display());
        } else {
            log::info!("Run directory: {}", path.display());
        }
        Ok(Self { path })
    }

    /// Wrap an existing directory.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Subdirectory of this run.
    #[must_use]
    pub fn subdir(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Whether the manifest has been written.
    #[must_use]
    pub fn has_manifest(&self) -> bool {
        self.path.join(MANIFEST_FILE_NAME).is_file()
    }
}

/// Every run directory under `backup_root` that carries a manifest, oldest
/// first.
///
/// A missing backup root is reported and yields no runs.
#[must_use]
pub fn find_runs(backup_root: &Path) -> Vec<RunDirectory> {
    if !backup_root.is_dir() {
        log::warn!("Backup root {} does not exist", backup_root.display());
        return Vec::new();
    }

    WalkDir::new(backup_root)
        .min_depth(RUN_DIR_DEPTH)
        .max_depth(RUN_DIR_DEPTH)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(err) => {
                log::warn!("Skipping unreadable entry while listing runs: {}", err);
                None
            }
        })
        .filter(|e| e.file_type().is_dir())
        .map(|e| RunDirectory::open(e.into_path()))
        .filter(RunDirectory::has_manifest)
        .collect()
}
