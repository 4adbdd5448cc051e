//! Translation between the local path namespace and the one the device tool
//! or plan script runs in.
//!
//! When this tool runs inside WSL but `adb.exe` (or PowerShell) runs on the
//! Windows side, local paths like `/mnt/c/Users/me/Backups` must be handed
//! over as `C:\Users\me\Backups`.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A path could not be translated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathMapError {
    /// Only paths under `/mnt/<drive>` have a Windows equivalent.
    #[error("cannot convert non-/mnt path to a Windows path: {0}")]
    NotUnderMnt(PathBuf),

    /// `/mnt` itself, or a drive component that is not a single letter.
    #[error("no drive letter in WSL path: {0}")]
    NoDrive(PathBuf),
}

/// How local paths are presented to external tools.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathMapping {
    /// Pass paths through as they are.
    #[default]
    Identity,
    /// Convert WSL `/mnt/<drive>/...` paths to `<DRIVE>:\...`.
    WslToWindows,
}

impl PathMapping {
    /// Translate `path` into the target namespace.
    ///
    /// # Errors
    ///
    /// See [`PathMapError`]; [`PathMapping::Identity`] never fails.
    pub fn translate(self, path: &Path) -> Result<PathBuf, PathMapError> {
        match self {
            Self::Identity => Ok(path.to_path_buf()),
            Self::WslToWindows => wsl_to_windows(path).map(PathBuf::from),
        }
    }
}

/// Convert `/mnt/c/Users/x` to `C:\Users\x`.
///
/// `.` and `..` are resolved lexically first.
///
/// # Errors
///
/// See [`PathMapError`].
pub fn wsl_to_windows(path: &Path) -> Result<String, PathMapError> {
    let mut parts: Vec<String> = Vec::new();
    let mut absolute = false;
    for component in path.components() {
        match component {
            Component::RootDir => absolute = true,
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop();
            }
            Component::Normal(p) => parts.push(p.to_string_lossy().into_owned()),
            Component::Prefix(_) => return Err(PathMapError::NotUnderMnt(path.to_path_buf())),
        }
    }

    if !absolute || parts.first().map(String::as_str) != Some("mnt") {
        return Err(PathMapError::NotUnderMnt(path.to_path_buf()));
    }

    let drive = match parts.get(1) {
        Some(d) if d.len() == 1 && d.chars().all(|c| c.is_ascii_alphabetic()) => {
            d.to_ascii_uppercase()
        }
        _ => return Err(PathMapError::NoDrive(path.to_path_buf())),
    };

    Ok(format!("{}:\\{}", drive, parts[2..].join("\\")))
}
