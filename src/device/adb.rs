//! [`DevicePuller`] backed by the Android Debug Bridge.

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use super::{DeviceError, DeviceInfo, DevicePuller, PathMapping, PullOutcome};
use crate::output::script::quote_posix;

/// Runs the configured `adb` binary.
#[derive(Debug, Clone)]
pub struct AdbPuller {
    adb_path: PathBuf,
    mapping: PathMapping,
}

impl AdbPuller {
    /// Use the `adb` binary at `adb_path`.
    pub fn new(adb_path: impl Into<PathBuf>) -> Self {
        Self {
            adb_path: adb_path.into(),
            mapping: PathMapping::Identity,
        }
    }

    /// Translate local paths before passing them to `adb`.
    #[must_use]
    pub fn with_path_mapping(mut self, mapping: PathMapping) -> Self {
        self.mapping = mapping;
        self
    }

    /// The binary this puller runs.
    #[must_use]
    pub fn adb_path(&self) -> &Path {
        &self.adb_path
    }

    fn run(&self, args: &[&OsStr]) -> Result<Output, DeviceError> {
        log::debug!("Running {} {:?}", self.adb_path.display(), args);
        Command::new(&self.adb_path)
            .args(args)
            .output()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => DeviceError::ToolNotFound(self.adb_path.clone()),
                _ => DeviceError::Spawn {
                    tool: self.adb_path.clone(),
                    source: e,
                },
            })
    }

    fn transfer(&self, verb: &str, from: &OsStr, to: &OsStr) -> Result<PullOutcome, DeviceError> {
        let output = self.run(&[OsStr::new(verb), from, to])?;
        Ok(outcome(&output))
    }
}

fn outcome(output: &Output) -> PullOutcome {
    if output.status.success() {
        PullOutcome::Success
    } else {
        let mut diagnostics = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if diagnostics.is_empty() {
            diagnostics = format!("adb exited with {}", output.status);
        }
        PullOutcome::PartialFailure { diagnostics }
    }
}

/// Parse `adb devices` output.
fn parse_devices(stdout: &str) -> Vec<DeviceInfo> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("List of devices") && !l.starts_with('*'))
        .filter_map(|l| {
            let mut fields = l.split_whitespace();
            let serial = fields.next()?;
            let state = fields.next()?;
            Some(DeviceInfo {
                serial: serial.to_string(),
                state: state.to_string(),
            })
        })
        .collect()
}

/// Parse `find` output: one device path per line.
fn parse_listing(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect()
}

impl DevicePuller for AdbPuller {
    fn pull(&self, remote: &str, local_dest: &Path) -> Result<PullOutcome, DeviceError> {
        let dest = self.mapping.translate(local_dest)?;
        self.transfer("pull", OsStr::new(remote), dest.as_os_str())
    }

    fn push(&self, local: &Path, remote_parent: &str) -> Result<PullOutcome, DeviceError> {
        let src = self.mapping.translate(local)?;
        self.transfer("push", src.as_os_str(), OsStr::new(remote_parent))
    }

    fn list_files(&self, remote_dir: &str) -> Result<Vec<String>, DeviceError> {
        let remote_dir = remote_dir.trim_end_matches('/');
        let command = format!("find {} -type f 2>/dev/null", quote_posix(remote_dir));
        let output = self.run(&[OsStr::new("shell"), OsStr::new(&command)])?;
        if let PullOutcome::PartialFailure { diagnostics } = outcome(&output) {
            log::warn!("Listing {} may be incomplete: {}", remote_dir, diagnostics);
        }
        let files = parse_listing(&String::from_utf8_lossy(&output.stdout));
        log::debug!("{} file(s) under {} on the device", files.len(), remote_dir);
        Ok(files)
    }

    fn list_devices(&self) -> Result<Vec<DeviceInfo>, DeviceError> {
        let output = self.run(&[OsStr::new("devices")])?;
        let devices = parse_devices(&String::from_utf8_lossy(&output.stdout));
        if !devices.iter().any(DeviceInfo::is_ready) {
            log::warn!(
                "No connected/authorized device detected. Make sure USB debugging is on and allowed."
            );
        }
        Ok(devices)
    }
}
