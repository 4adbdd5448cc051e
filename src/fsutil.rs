//! Atomic file replacement.
//!
//! Durable state (manifests, the ledger) is written to a temporary sibling,
//! flushed to disk, then renamed over the target. A reader sees either the
//! previous file or the new one in full, never a partial write.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// A write-temp-then-rename step failed. The target is left untouched.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// The target has no parent directory to stage the temp file in.
    #[error("cannot persist {0}: no parent directory")]
    NoParent(PathBuf),

    /// Creating, writing or syncing the temporary file failed.
    #[error("failed to write temporary file {path}: {source}")]
    TempWrite {
        /// Temporary file path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Renaming the temporary file over the target failed.
    #[error("failed to move {temp} into place at {target}: {source}")]
    Rename {
        /// Temporary file path
        temp: PathBuf,
        /// Destination path
        target: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

/// Temporary sibling used while replacing `target`.
///
/// Lives in the same directory so the final rename never crosses a
/// filesystem boundary.
#[must_use]
pub fn temp_path_for(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}.tmp.{}", std::process::id()))
}

/// Replace `target` with `contents` atomically.
///
/// # Errors
///
/// Returns [`PersistError`] if the temp file cannot be written or the rename
/// fails. A leftover temp file is removed on failure.
pub fn write_atomic(target: &Path, contents: &[u8]) -> Result<(), PersistError> {
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        Some(_) => Path::new("."),
        None => return Err(PersistError::NoParent(target.to_path_buf())),
    };
    let temp = temp_path_for(target);

    let staged = File::create(&temp).and_then(|mut file| {
        file.write_all(contents)?;
        file.sync_all()
    });
    if let Err(source) = staged {
        let _ = fs::remove_file(&temp);
        return Err(PersistError::TempWrite { path: temp, source });
    }

    if let Err(source) = fs::rename(&temp, target) {
        let _ = fs::remove_file(&temp);
        return Err(PersistError::Rename {
            temp,
            target: target.to_path_buf(),
            source,
        });
    }

    sync_dir(parent);
    log::trace!("Atomically wrote {} ({} bytes)", target.display(), contents.len());
    Ok(())
}

/// Flush the directory entry so the rename itself survives a power loss.
#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        log::debug!("Could not sync directory {}: {}", dir.display(), e);
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}
