//! snapledger - incremental phone snapshot tracker.
//!
//! Each backup lands in a timestamped run directory. Every file in a run is
//! fingerprinted (SHA-256) into a manifest sidecar, compared against a
//! cross-run ledger keyed by relative path, and files whose content has not
//! changed since an earlier run are offered for reclaim behind an explicit
//! `DELETE` confirmation.
//!
//! The library is organized around [`pipeline::track_run`]; the binary adds
//! configuration, device transfers and reporting via [`run_app`].

pub mod actions;
pub mod cli;
pub mod config;
pub mod device;
pub mod duplicates;
pub mod error;
pub mod fsutil;
pub mod ledger;
pub mod logging;
pub mod manifest;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod run_dir;
pub mod scanner;
pub mod signal;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;

use crate::actions::{ReclaimConfig, ReclaimOutcome, CONFIRMATION_TOKEN};
use crate::cli::{BackupArgs, Cli, Commands, OutputFormat, ReclaimArgs};
use crate::config::Config;
use crate::device::{AdbPuller, DevicePuller};
use crate::error::ExitCode;
use crate::ledger::LedgerStore;
use crate::logging::{init_logging, LogOptions};
use crate::output::script::DeviceCleanupScript;
use crate::output::{text, JsonOutput, TextReclaimReporter};
use crate::pipeline::{
    list_backed_up_media, pull_sources, restore_media, track_run, TrackOptions, TrackOutcome,
    TransferReport, TransferStatus,
};
use crate::progress::Progress;
use crate::run_dir::{find_runs, RunDirectory};

/// Run the command described by `cli`.
///
/// # Errors
///
/// Configuration problems, device tool failures and pipeline errors. The
/// binary maps them to an exit code with [`ExitCode::for_error`].
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    let Cli {
        verbose,
        quiet,
        no_color,
        config: config_path,
        backup_root,
        command,
        ..
    } = cli;

    init_logging(&LogOptions {
        verbose,
        quiet,
        no_color,
    });

    let mut config =
        Config::load_from_path(config_path.as_deref()).context("failed to load configuration")?;
    if let Some(root) = backup_root {
        config.backup_root = Some(root);
    }

    match command {
        Commands::Backup(args) => {
            if let Some(adb) = &args.adb_path {
                config.adb_path = Some(adb.clone());
            }
            run_backup(&config, &args, quiet)
        }
        Commands::Track(args) => run_track(
            &config,
            &args.run_dir,
            &args.reclaim,
            quiet,
            &BackupContext::default(),
        ),
        Commands::Runs => list_runs(&config),
        Commands::Restore(args) => {
            if let Some(adb) = args.adb_path {
                config.adb_path = Some(adb);
            }
            run_restore(&config, &args.run_dir)
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(ExitCode::Success)
        }
    }
}

fn adb_puller(config: &Config) -> Result<AdbPuller> {
    Ok(AdbPuller::new(config.require_adb_path()?).with_path_mapping(config.path_mapping))
}

fn any_failed(transfers: &[TransferReport]) -> bool {
    transfers
        .iter()
        .any(|t| matches!(t.status, TransferStatus::Failed { .. }))
}

/// What a backup adds to the report of the run it tracks.
#[derive(Debug, Default)]
struct BackupContext {
    transfers_failed: bool,
    device_cleanup_script: Option<PathBuf>,
}

fn run_backup(config: &Config, args: &BackupArgs, quiet: bool) -> Result<ExitCode> {
    let backup_root = config.require_backup_root()?;
    let puller = adb_puller(config)?;
    puller.list_devices()?;

    let run = RunDirectory::create(backup_root, &Local::now())
        .with_context(|| format!("failed to create run directory under {}", backup_root.display()))?;
    let transfers = pull_sources(&puller, &run, &config.sources(args.skip_portodb))?;
    let text_output = args.reclaim.output == OutputFormat::Text && !quiet;
    if text_output {
        text::write_transfers(&mut io::stderr().lock(), &transfers)?;
    }

    let device_cleanup_script = if args.device_cleanup_script {
        write_device_cleanup(config, &puller, &run, &transfers)?
    } else {
        None
    };
    if let Some(path) = device_cleanup_script.as_deref().filter(|_| text_output) {
        text::write_device_cleanup_notice(&mut io::stderr().lock(), path)?;
    }

    let context = BackupContext {
        transfers_failed: any_failed(&transfers),
        device_cleanup_script,
    };
    run_track(config, run.path(), &args.reclaim, quiet, &context)
}

fn write_device_cleanup(
    config: &Config,
    puller: &AdbPuller,
    run: &RunDirectory,
    transfers: &[TransferReport],
) -> Result<Option<PathBuf>> {
    if config.media_dirs.is_empty() {
        log::info!("No media directories configured; skipping the device cleanup script");
        return Ok(None);
    }
    let files = list_backed_up_media(puller, run, &config.media_dirs, transfers)?;
    if files.is_empty() {
        log::info!("No backed-up media files on the device; device cleanup script not written");
        return Ok(None);
    }
    let path = DeviceCleanupScript::new(&files, puller.adb_path(), Local::now())
        .write_into(&config.plan_dir()?)?;
    Ok(Some(path))
}

fn run_track(
    config: &Config,
    run_dir: &Path,
    args: &ReclaimArgs,
    quiet: bool,
    backup: &BackupContext,
) -> Result<ExitCode> {
    let backup_root = config.require_backup_root()?;
    let handler = signal::install_handler()?;

    let options = TrackOptions {
        ledger_path: LedgerStore::at_backup_root(backup_root).path().to_path_buf(),
        plan_dir: Some(config.plan_dir()?),
        script_type: args
            .script_type
            .unwrap_or(config.script_type)
            .resolve(config.path_mapping),
        path_mapping: config.path_mapping,
        shutdown_flag: Some(handler.get_flag()),
    };

    let progress = Progress::new(quiet);
    let outcome = track_run(run_dir, &options, Some(&progress))?;

    let reclaim = match (&outcome, args.execute) {
        (TrackOutcome::Tracked(report), true) => match &report.plan {
            Some(plan) => {
                let confirmation = match &args.confirm {
                    Some(text) => text.clone(),
                    None => {
                        text::write_plan_preview(&mut io::stderr().lock(), plan)?;
                        prompt_confirmation()?
                    }
                };
                let reclaim_config = ReclaimConfig {
                    use_trash: args.trash,
                    verify_content: args.verify,
                };
                let reporter = TextReclaimReporter::new(quiet || args.output == OutputFormat::Json);
                Some(actions::execute(plan, &confirmation, &reclaim_config, Some(&reporter)))
            }
            None => None,
        },
        _ => None,
    };

    let exit_code = exit_code_for(&outcome, reclaim.as_ref(), backup.transfers_failed);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match args.output {
        OutputFormat::Json => {
            let mut json = JsonOutput::from_outcome(&outcome, exit_code);
            if let Some(r) = &reclaim {
                json = json.with_reclaim(r);
            }
            if let Some(path) = &backup.device_cleanup_script {
                json = json.with_device_cleanup_script(path);
            }
            json.write_to(&mut out)?;
        }
        OutputFormat::Text => {
            if !quiet {
                text::write_track_summary(&mut out, &outcome)?;
            }
            if let Some(r) = &reclaim {
                text::write_reclaim_outcome(&mut out, r)?;
            }
        }
    }

    Ok(exit_code)
}

fn prompt_confirmation() -> Result<String> {
    let mut stderr = io::stderr();
    write!(stderr, "Type {CONFIRMATION_TOKEN} to remove these files: ")?;
    stderr.flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read confirmation")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Exit code for a finished tracking run.
///
/// Skipped files, failed transfers and failed removals make the run partial;
/// otherwise a run with no plan has nothing to reclaim.
#[must_use]
pub fn exit_code_for(
    outcome: &TrackOutcome,
    reclaim: Option<&ReclaimOutcome>,
    transfers_failed: bool,
) -> ExitCode {
    let report = match outcome {
        TrackOutcome::NothingToClassify { .. } if transfers_failed => return ExitCode::PartialSuccess,
        TrackOutcome::NothingToClassify { .. } => return ExitCode::NothingToReclaim,
        TrackOutcome::Tracked(report) => report,
    };
    let reclaim_failed = matches!(
        reclaim,
        Some(ReclaimOutcome::Executed(batch)) if !batch.all_succeeded()
    );
    if report.is_partial() || reclaim_failed || transfers_failed {
        ExitCode::PartialSuccess
    } else if report.plan.is_none() {
        ExitCode::NothingToReclaim
    } else {
        ExitCode::Success
    }
}

fn list_runs(config: &Config) -> Result<ExitCode> {
    let backup_root = config.require_backup_root()?;
    let runs = find_runs(backup_root);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if runs.is_empty() {
        writeln!(out, "No tracked runs under {}", backup_root.display())?;
    }
    for run in &runs {
        writeln!(out, "{}", run.path().display())?;
    }
    Ok(ExitCode::Success)
}

fn run_restore(config: &Config, run_dir: &Path) -> Result<ExitCode> {
    if !run_dir.is_dir() {
        anyhow::bail!("run directory {} does not exist", run_dir.display());
    }
    let puller = adb_puller(config)?;
    puller.list_devices()?;

    let transfers = restore_media(&puller, &RunDirectory::open(run_dir), &config.media_dirs)?;
    text::write_transfers(&mut io::stdout().lock(), &transfers)?;

    Ok(if any_failed(&transfers) {
        ExitCode::PartialSuccess
    } else {
        ExitCode::Success
    })
}
