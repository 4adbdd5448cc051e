//! Output formatters for tracked runs.
//!
//! This module provides:
//! - Text summaries for the terminal
//! - JSON run reports for automation and scripting
//! - Standalone reclaim plan scripts (POSIX shell, PowerShell)
//!
//! # Example
//!
//! ```no_run
//! use snapledger::error::ExitCode;
//! use snapledger::output::JsonOutput;
//! use snapledger::pipeline::{track_run, TrackOptions};
//! use std::path::Path;
//!
//! let options = TrackOptions::for_backup_root(Path::new("/backups"));
//! let outcome = track_run(Path::new("/backups/2024/05/02/0930"), &options, None).unwrap();
//! let output = JsonOutput::from_outcome(&outcome, ExitCode::Success);
//! println!("{}", output.to_json_pretty().unwrap());
//! ```

pub mod json;
pub mod script;
pub mod text;

// Re-export main types
pub use json::JsonOutput;
pub use script::{write_plan_script, PlanScript, ScriptSetting, ScriptType};
pub use text::TextReclaimReporter;
