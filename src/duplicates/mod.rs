//! Duplicate detection across runs.
//!
//! A file is a duplicate when the current run holds the same content at the
//! same relative path as the last run that saw that path. See
//! [`classifier`] for the rules.

pub mod classifier;

pub use classifier::{classify, Classification, ClassifiedFile, FileStatus};
