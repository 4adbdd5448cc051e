//! Per-run manifest sidecar.
//!
//! After a copy step fills a run directory, its files are fingerprinted and
//! listed in a manifest stored at the run root. The manifest is a plain text
//! listing in the same layout `sha256sum` produces, so it can be diffed
//! between runs and checked with standard tools.
//!
//! # Features
//!
//! * **Deterministic**: One line per file, sorted by relative path.
//! * **Atomic**: Written to a temp file and renamed into place.
//! * **Self-excluding**: The sidecar name is reserved and never scanned.
//!
//! # Architecture
//!
//! * [`data`]: The in-memory [`Manifest`] and its entries.
//! * [`io`]: Rendering, parsing and persisting manifest files.

pub mod data;
pub mod io;

pub use data::{Manifest, ManifestEntry};
pub use io::{persist_manifest, ManifestError};

/// Reserved name of the manifest file at the root of every run directory.
pub const MANIFEST_FILE_NAME: &str = "manifest.sha256";
