//! Ledger persistence.
//!
//! The ledger is a single pretty-printed JSON file at the backup root. It is
//! rewritten in full on every save through [`write_atomic`], so a crash
//! mid-save leaves the previous ledger readable.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use super::data::Ledger;
use crate::fsutil::{write_atomic, PersistError};

/// Default ledger file name, placed at the backup root.
pub const LEDGER_FILE_NAME: &str = "hash_ledger.json";

/// Errors from loading or saving the ledger.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The ledger exists but could not be read.
    #[error("failed to read ledger {path}: {source}")]
    Read {
        /// Ledger path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Serializing the ledger failed.
    #[error("failed to serialize ledger: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The atomic replace failed; the previous ledger is intact.
    #[error(transparent)]
    Persist(#[from] PersistError),

    /// Moving a corrupt ledger aside failed.
    #[error("failed to move corrupt ledger {path} aside: {source}")]
    Quarantine {
        /// Ledger path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

/// How the ledger was found on load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerStatus {
    /// No ledger file yet; this is the first run.
    Missing,
    /// Parsed successfully.
    Loaded,
    /// Present but unparseable; treated as empty.
    Corrupt {
        /// Parser message
        reason: String,
    },
}

/// Result of [`LedgerStore::load`].
#[derive(Debug, Clone)]
pub struct LoadedLedger {
    /// The ledger to classify against (empty unless `status` is `Loaded`).
    pub ledger: Ledger,
    /// What was found on disk.
    pub status: LedgerStatus,
}

impl LoadedLedger {
    /// Whether there was no usable prior state.
    #[must_use]
    pub fn is_first_run(&self) -> bool {
        !matches!(self.status, LedgerStatus::Loaded)
    }
}

/// Loads and saves the ledger file.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    /// Store backed by an explicit file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store for the default ledger file under a backup root.
    #[must_use]
    pub fn at_backup_root(backup_root: &Path) -> Self {
        Self::new(backup_root.join(LEDGER_FILE_NAME))
    }

    /// Path of the ledger file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the ledger.
    ///
    /// A missing file yields an empty ledger. A file that is not a valid
    /// ledger is reported with a warning and also yields an empty ledger, so
    /// the run continues and every file is classified as changed.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Read`] if the file exists but cannot be read
    /// (for example, permission denied). Treating that as empty would let
    /// the next save discard a ledger that is still intact.
    pub fn load(&self) -> Result<LoadedLedger, LedgerError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::info!("No ledger at {}, starting fresh", self.path.display());
                return Ok(LoadedLedger {
                    ledger: Ledger::new(),
                    status: LedgerStatus::Missing,
                });
            }
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                return Ok(self.corrupt(e.to_string()));
            }
            Err(source) => {
                return Err(LedgerError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        match serde_json::from_str::<Ledger>(&text) {
            Ok(ledger) => {
                log::debug!(
                    "Loaded ledger with {} entries from {}",
                    ledger.len(),
                    self.path.display()
                );
                Ok(LoadedLedger {
                    ledger,
                    status: LedgerStatus::Loaded,
                })
            }
            Err(e) => Ok(self.corrupt(e.to_string())),
        }
    }

    fn corrupt(&self, reason: String) -> LoadedLedger {
        log::warn!(
            "Ledger {} is corrupt ({}); treating as empty",
            self.path.display(),
            reason
        );
        LoadedLedger {
            ledger: Ledger::new(),
            status: LedgerStatus::Corrupt { reason },
        }
    }

    /// Replace the stored ledger with `ledger`.
    ///
    /// Callers must not save concurrently against the same file.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if serialization or the atomic replace fails.
    /// The previous ledger remains readable in either case.
    pub fn save(&self, ledger: &Ledger) -> Result<(), LedgerError> {
        let mut json = serde_json::to_string_pretty(ledger)?;
        json.push('\n');
        write_atomic(&self.path, json.as_bytes())?;
        log::debug!(
            "Saved ledger with {} entries to {}",
            ledger.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Move an unreadable ledger aside so the next save does not destroy it.
    /// Returns the new location.
    ///
    /// The first quarantine goes to `<name>.corrupt`. Later ones never
    /// replace an earlier copy: they get a timestamp suffix, and a counter
    /// if that name is taken too.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Quarantine`] if the rename fails.
    pub fn quarantine(&self) -> Result<PathBuf, LedgerError> {
        let aside = self.quarantine_path(&Local::now());
        fs::rename(&self.path, &aside).map_err(|source| LedgerError::Quarantine {
            path: self.path.clone(),
            source,
        })?;
        log::warn!("Moved corrupt ledger to {}", aside.display());
        Ok(aside)
    }

    fn quarantine_path(&self, now: &DateTime<Local>) -> PathBuf {
        let mut base = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        base.push(".corrupt");

        let plain = self.path.with_file_name(&base);
        if !plain.exists() {
            return plain;
        }

        base.push(format!(".{}", now.format("%Y%m%d_%H%M%S")));
        let stamped = self.path.with_file_name(&base);
        if !stamped.exists() {
            return stamped;
        }

        (2u32..)
            .map(|n| {
                let mut name = base.clone();
                name.push(format!("-{n}"));
                self.path.with_file_name(name)
            })
            .find(|candidate| !candidate.exists())
            .unwrap_or(stamped)
    }
}
