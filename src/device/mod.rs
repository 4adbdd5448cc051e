//! Copying files between the device and a run directory.
//!
//! The tracker itself never talks to a device. Backups start with a bulk
//! copy into the run directory, done through a [`DevicePuller`]; the only
//! shipped implementation is [`AdbPuller`]. After a backup the puller can
//! also list what is on the device, for the device cleanup script.

pub mod adb;
pub mod path_map;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use adb::AdbPuller;
pub use path_map::{wsl_to_windows, PathMapError, PathMapping};

/// The device tool could not be run at all.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The configured tool binary does not exist.
    #[error("device tool not found at {0} - check adb_path in your config (SNAPLEDGER_ADB_PATH)")]
    ToolNotFound(PathBuf),

    /// Spawning or waiting for the tool failed.
    #[error("failed to run {tool}: {source}")]
    Spawn {
        /// Tool binary
        tool: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// A local path has no equivalent in the tool's namespace.
    #[error(transparent)]
    PathMap(#[from] PathMapError),
}

/// Result of one transfer. The tool ran, but may not have copied everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// Every file transferred.
    Success,
    /// The tool reported a failure; some files may be missing.
    PartialFailure {
        /// What the tool printed on stderr.
        diagnostics: String,
    },
}

impl PullOutcome {
    /// Whether the transfer completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// A device listed by the tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Serial number.
    pub serial: String,
    /// Connection state (`device`, `unauthorized`, `offline`, ...).
    pub state: String,
}

impl DeviceInfo {
    /// Connected and authorized for debugging.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == "device"
    }
}

/// Bulk copy to and from a device.
pub trait DevicePuller {
    /// Copy the remote directory `remote` into `local_dest`, creating
    /// `local_dest/<basename of remote>`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError`] only if the tool could not be run; copy
    /// failures are reported through [`PullOutcome::PartialFailure`].
    fn pull(&self, remote: &str, local_dest: &Path) -> Result<PullOutcome, DeviceError>;

    /// Copy the local directory `local` into the remote directory
    /// `remote_parent`.
    ///
    /// # Errors
    ///
    /// As for [`DevicePuller::pull`].
    fn push(&self, local: &Path, remote_parent: &str) -> Result<PullOutcome, DeviceError>;

    /// Regular files under the remote directory `remote_dir`, as full device
    /// paths in the order the device lists them.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError`] if the tool could not be run. A listing the
    /// device only partly produced is returned as far as it got.
    fn list_files(&self, remote_dir: &str) -> Result<Vec<String>, DeviceError>;

    /// Devices the tool can see.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError`] if the tool could not be run.
    fn list_devices(&self) -> Result<Vec<DeviceInfo>, DeviceError>;
}
