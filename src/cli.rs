//! Command-line interface definitions (clap derive).
//!
//! ```bash
//! # Pull from the phone into a fresh run directory, then track it
//! snapledger backup
//!
//! # Track a run that already exists, JSON report on stdout
//! snapledger track /backups/2024/05/02/0930 --output json
//!
//! # Reclaim in-process without a prompt
//! snapledger track /backups/2024/05/02/0930 --execute --confirm DELETE
//!
//! # Back up, then write a script that clears the backed-up media off the phone
//! snapledger backup --device-cleanup-script
//!
//! # List tracked runs
//! snapledger runs
//! ```

use std::fmt;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::output::script::ScriptSetting;

/// Incremental phone snapshot tracker.
///
/// Pulls media from an Android device into timestamped run directories,
/// fingerprints every file, and keeps a cross-run ledger so unchanged files
/// can be reclaimed from the newest run.
#[derive(Debug, Parser)]
#[command(name = "snapledger")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Report errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Backup root, overriding the configured one
    #[arg(long, global = true, value_name = "DIR")]
    pub backup_root: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Pull from the device into a new run directory and track it
    Backup(BackupArgs),
    /// Track an existing run directory
    Track(TrackArgs),
    /// List run directories that have a manifest
    Runs,
    /// Push a run's media back to the device
    Restore(RestoreArgs),
    /// Print the effective configuration
    Config,
}

/// Options shared by every command that tracks a run.
#[derive(Debug, Clone, Args)]
pub struct ReclaimArgs {
    /// Output format for the run report
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Plan script flavour, overriding the configured one
    #[arg(long, value_enum, value_name = "TYPE")]
    pub script_type: Option<ScriptSetting>,

    /// Reclaim unchanged files in-process after planning
    #[arg(long)]
    pub execute: bool,

    /// Confirmation text for --execute instead of prompting (must be DELETE)
    #[arg(long, value_name = "TEXT", requires = "execute")]
    pub confirm: Option<String>,

    /// Move files to the system trash instead of removing them
    #[arg(long, requires = "execute")]
    pub trash: bool,

    /// Re-hash each file before removing it
    #[arg(long, requires = "execute")]
    pub verify: bool,
}

/// Arguments for `backup`.
#[derive(Debug, Args)]
pub struct BackupArgs {
    /// Do not pull the PortoDB directory
    #[arg(long)]
    pub skip_portodb: bool,

    /// Write a script that removes the backed-up media files from the
    /// phone (asks for DELETE when run)
    #[arg(long)]
    pub device_cleanup_script: bool,

    /// `adb` binary, overriding the configured one
    #[arg(long, value_name = "PATH")]
    pub adb_path: Option<PathBuf>,

    #[command(flatten)]
    pub reclaim: ReclaimArgs,
}

/// Arguments for `track`.
#[derive(Debug, Args)]
pub struct TrackArgs {
    /// Run directory to fingerprint and classify
    #[arg(value_name = "RUN_DIR")]
    pub run_dir: PathBuf,

    #[command(flatten)]
    pub reclaim: ReclaimArgs,
}

/// Arguments for `restore`.
#[derive(Debug, Args)]
pub struct RestoreArgs {
    /// Run directory whose media is pushed back
    #[arg(value_name = "RUN_DIR")]
    pub run_dir: PathBuf,

    /// `adb` binary, overriding the configured one
    #[arg(long, value_name = "PATH")]
    pub adb_path: Option<PathBuf>,
}

/// Report format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    #[default]
    Text,
    /// JSON on stdout
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}
