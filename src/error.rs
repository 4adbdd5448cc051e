//! Structured error handling and exit codes.

use serde::Serialize;

use crate::pipeline::PipelineError;

/// Exit codes for the snapledger binary.
///
/// - 0: Success (run tracked, or command completed)
/// - 1: General error (unexpected or persistence failure)
/// - 2: Nothing to reclaim (run tracked, no unchanged files), or nothing to classify
/// - 3: Partial success (some files could not be hashed or removed)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: The command completed normally.
    Success = 0,
    /// General error: An unexpected error occurred.
    GeneralError = 1,
    /// Nothing to reclaim: The run had no unchanged files.
    NothingToReclaim = 2,
    /// Partial success: Completed, but some files were skipped or failed.
    PartialSuccess = 3,
    /// Interrupted: Cancelled by user (Ctrl+C) before anything was persisted.
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "SL000",
            Self::GeneralError => "SL001",
            Self::NothingToReclaim => "SL002",
            Self::PartialSuccess => "SL003",
            Self::Interrupted => "SL130",
        }
    }

    /// Exit code for a top-level error.
    #[must_use]
    pub fn for_error(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<PipelineError>() {
            Some(e) if e.is_interrupted() => Self::Interrupted,
            _ => Self::GeneralError,
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "SL001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message, including its causes
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
