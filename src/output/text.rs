//! Human-readable run reports.

use std::io::{self, Write};
use std::path::Path;

use bytesize::ByteSize;

use crate::actions::{ReclaimOutcome, ReclaimPlan, ReclaimProgressCallback};
use crate::pipeline::{TrackOutcome, TransferReport, TransferStatus};

/// Write the summary of a tracked run.
///
/// # Errors
///
/// Returns any error from `writer`.
pub fn write_track_summary<W: Write>(writer: &mut W, outcome: &TrackOutcome) -> io::Result<()> {
    let report = match outcome {
        TrackOutcome::NothingToClassify { run_dir } => {
            return writeln!(writer, "Nothing to classify in {}", run_dir.display());
        }
        TrackOutcome::Tracked(report) => report,
    };
    let c = &report.classification;

    writeln!(writer, "Run:       {}", report.run_dir.display())?;
    writeln!(writer, "Manifest:  {}", report.manifest_path.display())?;
    writeln!(
        writer,
        "Files:     {} hashed ({}), {} new, {} modified, {} unchanged",
        c.files.len(),
        ByteSize::b(report.bytes_hashed),
        c.new_count(),
        c.changed_count() - c.new_count(),
        c.unchanged_count()
    )?;
    if c.carried_forward > 0 {
        writeln!(
            writer,
            "Ledger:    {} entries carried forward from earlier runs",
            c.carried_forward
        )?;
    }
    if report.is_partial() {
        writeln!(writer, "Skipped:   {} file(s) could not be hashed", report.skipped_files.len())?;
        for (path, reason) in &report.skipped_files {
            writeln!(writer, "  {}: {}", path.display(), reason)?;
        }
    }

    if report.retracked {
        writeln!(
            writer,
            "Re-tracked: this run already had a manifest; the ledger was not updated and nothing is planned."
        )?;
    }

    match &report.plan {
        None => writeln!(writer, "Nothing to reclaim.")?,
        Some(plan) => {
            writeln!(
                writer,
                "Reclaimable: {} unchanged file(s), {}",
                plan.len(),
                ByteSize::b(plan.total_bytes())
            )?;
            if let Some(script) = &report.plan_script {
                writeln!(writer, "Plan script: {}", script.display())?;
            }
        }
    }
    Ok(())
}

/// Write the listing shown before the confirmation prompt.
///
/// # Errors
///
/// Returns any error from `writer`.
pub fn write_plan_preview<W: Write>(writer: &mut W, plan: &ReclaimPlan) -> io::Result<()> {
    writeln!(
        writer,
        "The following {} file(s) in {} are unchanged since an earlier run:",
        plan.len(),
        plan.run_dir.display()
    )?;
    for entry in &plan.entries {
        match entry.size {
            Some(size) => writeln!(writer, "  {} ({})", entry.relative_path, ByteSize::b(size))?,
            None => writeln!(writer, "  {}", entry.relative_path)?,
        }
    }
    Ok(())
}

/// Write the outcome of an in-process reclaim.
///
/// # Errors
///
/// Returns any error from `writer`.
pub fn write_reclaim_outcome<W: Write>(writer: &mut W, outcome: &ReclaimOutcome) -> io::Result<()> {
    match outcome {
        ReclaimOutcome::Aborted => writeln!(writer, "Aborted. No files were removed."),
        ReclaimOutcome::Executed(batch) => {
            writeln!(writer, "{}", batch.summary())?;
            for (path, reason) in &batch.failures {
                writeln!(writer, "  failed: {}: {}", path.display(), reason)?;
            }
            Ok(())
        }
    }
}

/// Write one line per device transfer.
///
/// # Errors
///
/// Returns any error from `writer`.
pub fn write_transfers<W: Write>(writer: &mut W, transfers: &[TransferReport]) -> io::Result<()> {
    for t in transfers {
        match &t.status {
            TransferStatus::Done => {
                writeln!(writer, "ok       {} -> {}", t.remote, t.local.display())?;
            }
            TransferStatus::Failed { diagnostics } => {
                writeln!(writer, "FAILED   {} -> {}: {}", t.remote, t.local.display(), diagnostics)?;
            }
            TransferStatus::Skipped { reason } => {
                writeln!(writer, "skipped  {}: {}", t.remote, reason)?;
            }
        }
    }
    Ok(())
}

/// Write where the device cleanup script went.
///
/// # Errors
///
/// Returns any error from `writer`.
pub fn write_device_cleanup_notice<W: Write>(writer: &mut W, script: &Path) -> io::Result<()> {
    writeln!(writer, "Device cleanup script: {}", script.display())?;
    writeln!(writer, "  Run it only after verifying this backup.")
}

/// Prints each reclaimed path to stderr as it happens.
#[derive(Debug, Default)]
pub struct TextReclaimReporter {
    quiet: bool,
}

impl TextReclaimReporter {
    /// Reporter; `quiet` silences everything but failures.
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl ReclaimProgressCallback for TextReclaimReporter {
    fn on_before_reclaim(&self, path: &Path, index: usize, total: usize) {
        log::debug!("[{}/{}] checking {}", index + 1, total, path.display());
    }

    fn on_reclaim_success(&self, path: &Path, size: u64) {
        if !self.quiet {
            eprintln!("removed  {} ({})", path.display(), ByteSize::b(size));
        }
    }

    fn on_reclaim_missing(&self, path: &Path) {
        if !self.quiet {
            eprintln!("missing  {}", path.display());
        }
    }

    fn on_reclaim_failure(&self, path: &Path, error: &str) {
        eprintln!("FAILED   {}: {}", path.display(), error);
    }
}
