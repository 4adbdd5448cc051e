//! Relative path keys for snapshot entries.
//!
//! Every run lands in a fresh timestamped directory, so absolute paths change
//! from run to run. The stable identity of a file is its path relative to the
//! run root, which is what [`RelativePath`] captures.
//!
//! # Normalization
//!
//! - Components are joined with `/` regardless of host platform.
//! - The string is normalized to Unicode NFC, since macOS reports NFD names
//!   and the same file must map to the same key on every host.
//! - Only plain components are accepted: `..`, root and prefix components
//!   are rejected, `.` is dropped.
//!
//! # Example
//!
//! ```
//! use snapledger::scanner::path_utils::RelativePath;
//! use std::path::Path;
//!
//! let rel = RelativePath::from_root(
//!     Path::new("/backups/2024/05/01/1902"),
//!     Path::new("/backups/2024/05/01/1902/media/Camera/cafe\u{0301}.jpg"),
//! )
//! .unwrap();
//! assert_eq!(rel.as_str(), "media/Camera/café.jpg");
//! ```

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// Normalize a path string to NFC (Composed) form.
#[must_use]
pub fn normalize_path_str(s: &str) -> String {
    s.nfc().collect()
}

/// Reasons a path cannot become a [`RelativePath`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelativePathError {
    /// The path is not located under the snapshot root.
    #[error("{path} is not under {root}")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    /// The path contains bytes that are not valid UTF-8.
    #[error("path is not valid UTF-8: {0}")]
    NotUtf8(PathBuf),

    /// The path has `..`, a root or a drive prefix in it.
    #[error("path is not a plain relative path: {0}")]
    NotPlain(String),

    /// The path contains a line break, which the manifest format cannot carry.
    #[error("path contains a line break: {0:?}")]
    LineBreak(String),

    /// Nothing left after stripping the root.
    #[error("empty relative path")]
    Empty,
}

/// A path relative to a snapshot root, normalized for use as a ledger key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelativePath(String);

impl RelativePath {
    /// Build the key for `path`, which must live under `root`.
    ///
    /// # Errors
    ///
    /// See [`RelativePathError`].
    pub fn from_root(root: &Path, path: &Path) -> Result<Self, RelativePathError> {
        let stripped = path
            .strip_prefix(root)
            .map_err(|_| RelativePathError::OutsideRoot {
                path: path.to_path_buf(),
                root: root.to_path_buf(),
            })?;
        Self::from_relative(stripped)
    }

    /// Build the key from an already relative path.
    ///
    /// # Errors
    ///
    /// See [`RelativePathError`].
    pub fn from_relative(path: &Path) -> Result<Self, RelativePathError> {
        let mut parts = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(part) => {
                    let part = part
                        .to_str()
                        .ok_or_else(|| RelativePathError::NotUtf8(path.to_path_buf()))?;
                    parts.push(part);
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(RelativePathError::NotPlain(
                        path.to_string_lossy().into_owned(),
                    ));
                }
            }
        }
        if parts.is_empty() {
            return Err(RelativePathError::Empty);
        }
        Self::checked(normalize_path_str(&parts.join("/")))
    }

    /// Parse a `/`-separated key, as stored in manifests and the ledger.
    ///
    /// # Errors
    ///
    /// Rejects empty keys, empty segments, `.`/`..` segments and line
    /// breaks.
    pub fn parse(s: &str) -> Result<Self, RelativePathError> {
        if s.is_empty() {
            return Err(RelativePathError::Empty);
        }
        let plain = s
            .split('/')
            .all(|seg| !seg.is_empty() && seg != "." && seg != "..");
        if !plain {
            return Err(RelativePathError::NotPlain(s.to_string()));
        }
        Self::checked(normalize_path_str(s))
    }

    fn checked(key: String) -> Result<Self, RelativePathError> {
        if key.contains(['\n', '\r']) {
            return Err(RelativePathError::LineBreak(key));
        }
        Ok(Self(key))
    }

    /// The normalized key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Absolute location of this entry under a given run root.
    #[must_use]
    pub fn resolve(&self, root: &Path) -> PathBuf {
        self.0
            .split('/')
            .fold(root.to_path_buf(), |acc, seg| acc.join(seg))
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RelativePath {
    type Error = RelativePathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RelativePath> for String {
    fn from(value: RelativePath) -> Self {
        value.0
    }
}
