//! Standalone reclaim plan scripts.
//!
//! A [`ReclaimPlan`] can be exported as a shell script to be reviewed and
//! run later, independently of this tool.
//!
//! # Behavior of the generated script
//!
//! * Asks for the literal confirmation text `DELETE`; anything else exits 0
//!   without output or changes.
//! * Re-checks each file just before removing it: a file that is already
//!   gone is reported as missing, a file whose size changed is reported as
//!   failed and left alone.
//! * Reports every path, never stops on a single failure, and exits
//!   non-zero if any removal failed.
//!
//! Supports POSIX shell (`sh`) and Windows PowerShell.
//!
//! # Device cleanup script
//!
//! After a backup, [`DeviceCleanupScript`] lists the media files that now
//! have a local copy and removes them from the phone with
//! `adb shell rm -f`, behind the same typed `DELETE` confirmation. It is
//! always a POSIX script, since it drives the same `adb` binary this tool
//! runs.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::actions::reclaim::{ReclaimPlan, CONFIRMATION_TOKEN};
use crate::device::{PathMapError, PathMapping};
use crate::fsutil::{write_atomic, PersistError};

/// Type of script to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptType {
    /// POSIX-compliant shell script (sh/bash/zsh)
    Posix,
    /// Windows PowerShell script
    PowerShell,
}

impl ScriptType {
    /// Detect the appropriate script type for the current platform.
    #[must_use]
    pub fn detect() -> Self {
        if cfg!(windows) {
            Self::PowerShell
        } else {
            Self::Posix
        }
    }

    /// File extension for this script type.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Posix => "sh",
            Self::PowerShell => "ps1",
        }
    }
}

/// Configured script type; `auto` picks one from the platform and path
/// mapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ScriptSetting {
    /// PowerShell on Windows or when paths map to Windows, `sh` otherwise.
    #[default]
    Auto,
    /// POSIX shell script.
    Posix,
    /// PowerShell script.
    #[value(name = "powershell")]
    PowerShell,
}

impl ScriptSetting {
    /// Concrete script type.
    #[must_use]
    pub fn resolve(self, mapping: PathMapping) -> ScriptType {
        match self {
            Self::Posix => ScriptType::Posix,
            Self::PowerShell => ScriptType::PowerShell,
            Self::Auto if mapping == PathMapping::WslToWindows => ScriptType::PowerShell,
            Self::Auto => ScriptType::detect(),
        }
    }
}

/// Errors writing a plan script.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// Rendering to the writer failed.
    #[error("failed to render plan script: {0}")]
    Io(#[from] io::Error),

    /// A planned path has no equivalent in the script's path namespace.
    #[error(transparent)]
    PathMap(#[from] PathMapError),

    /// The plan directory could not be created.
    #[error("failed to create plan directory {path}: {source}")]
    CreateDir {
        /// Plan directory
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Writing the script file failed.
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Formatter for a reclaim plan script.
pub struct PlanScript<'a> {
    /// The plan to export.
    pub plan: &'a ReclaimPlan,
    /// The type of script to generate.
    pub script_type: ScriptType,
    /// Translation applied to paths in PowerShell scripts.
    pub path_mapping: PathMapping,
}

impl<'a> PlanScript<'a> {
    /// Create a new script formatter.
    #[must_use]
    pub fn new(plan: &'a ReclaimPlan, script_type: ScriptType) -> Self {
        Self {
            plan,
            script_type,
            path_mapping: PathMapping::Identity,
        }
    }

    /// Translate paths for a PowerShell script running on the other side
    /// of WSL. POSIX scripts always use local paths.
    #[must_use]
    pub fn with_path_mapping(mut self, mapping: PathMapping) -> Self {
        self.path_mapping = mapping;
        self
    }

    /// Write the generated script to a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails or a path cannot be translated.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), ScriptError> {
        match self.script_type {
            ScriptType::Posix => self.write_posix(writer),
            ScriptType::PowerShell => self.write_powershell(writer),
        }
    }

    /// Render into a string.
    ///
    /// # Errors
    ///
    /// As for [`PlanScript::write_to`].
    pub fn render(&self) -> Result<String, ScriptError> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    fn write_header<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer, "# snapledger reclaim plan")?;
        writeln!(
            writer,
            "# Generated on: {}",
            self.plan.created_at.format("%Y-%m-%d %H:%M:%S")
        )?;
        writeln!(writer, "# Run directory: {}", self.plan.run_dir.display())?;
        writeln!(writer, "#")?;
        writeln!(
            writer,
            "# Every file below is byte-identical to the copy captured by an earlier run."
        )?;
        writeln!(
            writer,
            "# WARNING: confirming will PERMANENTLY DELETE these files from this run."
        )?;
        writeln!(writer, "#")?;
        writeln!(writer, "# Files: {}", self.plan.len())?;
        writeln!(
            writer,
            "# Reclaimable space: {}",
            bytesize::ByteSize::b(self.plan.total_bytes())
        )?;
        writeln!(writer)
    }

    fn write_posix<W: Write>(&self, writer: &mut W) -> Result<(), ScriptError> {
        writeln!(writer, "#!/bin/sh")?;
        self.write_header(writer)?;

        writeln!(
            writer,
            "printf 'Type {} to remove {} file(s): '",
            CONFIRMATION_TOKEN,
            self.plan.len()
        )?;
        writeln!(writer, "read -r ANSWER || exit 0")?;
        writeln!(writer, "[ \"$ANSWER\" = \"{}\" ] || exit 0", CONFIRMATION_TOKEN)?;
        writeln!(writer)?;

        writeln!(writer, "REMOVED=0")?;
        writeln!(writer, "MISSING=0")?;
        writeln!(writer, "FAILED=0")?;
        writeln!(writer)?;

        writeln!(writer, "# reclaim <path> <expected size or ->")?;
        writeln!(writer, "reclaim() {{")?;
        writeln!(writer, "    if [ ! -e \"$1\" ] && [ ! -L \"$1\" ]; then")?;
        writeln!(writer, "        echo \"missing: $1\"")?;
        writeln!(writer, "        MISSING=$((MISSING + 1))")?;
        writeln!(writer, "        return")?;
        writeln!(writer, "    fi")?;
        writeln!(writer, "    if [ ! -f \"$1\" ] || [ -L \"$1\" ]; then")?;
        writeln!(writer, "        echo \"FAILED: $1 (no longer a regular file)\" >&2")?;
        writeln!(writer, "        FAILED=$((FAILED + 1))")?;
        writeln!(writer, "        return")?;
        writeln!(writer, "    fi")?;
        writeln!(writer, "    if [ \"$2\" != \"-\" ]; then")?;
        writeln!(writer, "        ACTUAL=$(wc -c < \"$1\" | tr -d ' ')")?;
        writeln!(writer, "        if [ \"$ACTUAL\" != \"$2\" ]; then")?;
        writeln!(
            writer,
            "            echo \"FAILED: $1 (size changed from $2 to $ACTUAL)\" >&2"
        )?;
        writeln!(writer, "            FAILED=$((FAILED + 1))")?;
        writeln!(writer, "            return")?;
        writeln!(writer, "        fi")?;
        writeln!(writer, "    fi")?;
        writeln!(writer, "    if rm -- \"$1\"; then")?;
        writeln!(writer, "        echo \"removed: $1\"")?;
        writeln!(writer, "        REMOVED=$((REMOVED + 1))")?;
        writeln!(writer, "    else")?;
        writeln!(writer, "        echo \"FAILED: $1\" >&2")?;
        writeln!(writer, "        FAILED=$((FAILED + 1))")?;
        writeln!(writer, "    fi")?;
        writeln!(writer, "}}")?;
        writeln!(writer)?;

        for entry in &self.plan.entries {
            writeln!(writer, "# {}", entry.fingerprint)?;
            writeln!(
                writer,
                "reclaim {} {}",
                escape_posix(&entry.path),
                size_arg(entry.size)
            )?;
        }
        writeln!(writer)?;

        writeln!(
            writer,
            "echo \"Removed $REMOVED file(s), $MISSING already gone, $FAILED failed.\""
        )?;
        writeln!(writer, "[ \"$FAILED\" -eq 0 ] || exit 1")?;

        Ok(())
    }

    fn write_powershell<W: Write>(&self, writer: &mut W) -> Result<(), ScriptError> {
        self.write_header(writer)?;

        writeln!(
            writer,
            "$Answer = Read-Host 'Type {} to remove {} file(s)'",
            CONFIRMATION_TOKEN,
            self.plan.len()
        )?;
        writeln!(writer, "if ($Answer -cne '{}') {{ exit 0 }}", CONFIRMATION_TOKEN)?;
        writeln!(writer)?;

        writeln!(writer, "$Removed = 0")?;
        writeln!(writer, "$Missing = 0")?;
        writeln!(writer, "$Failed = 0")?;
        writeln!(writer)?;

        writeln!(writer, "function Reclaim-File([string]$Path, [long]$Size) {{")?;
        writeln!(writer, "    if (-not (Test-Path -LiteralPath $Path)) {{")?;
        writeln!(writer, "        Write-Host \"missing: $Path\"")?;
        writeln!(writer, "        $script:Missing++")?;
        writeln!(writer, "        return")?;
        writeln!(writer, "    }}")?;
        writeln!(writer, "    $Item = Get-Item -LiteralPath $Path -Force")?;
        writeln!(writer, "    if ($Item.PSIsContainer) {{")?;
        writeln!(
            writer,
            "        Write-Host \"FAILED: $Path (no longer a regular file)\""
        )?;
        writeln!(writer, "        $script:Failed++")?;
        writeln!(writer, "        return")?;
        writeln!(writer, "    }}")?;
        writeln!(writer, "    if ($Size -ge 0 -and $Item.Length -ne $Size) {{")?;
        writeln!(
            writer,
            "        Write-Host \"FAILED: $Path (size changed from $Size to $($Item.Length))\""
        )?;
        writeln!(writer, "        $script:Failed++")?;
        writeln!(writer, "        return")?;
        writeln!(writer, "    }}")?;
        writeln!(writer, "    try {{")?;
        writeln!(
            writer,
            "        Remove-Item -LiteralPath $Path -Force -ErrorAction Stop"
        )?;
        writeln!(writer, "        Write-Host \"removed: $Path\"")?;
        writeln!(writer, "        $script:Removed++")?;
        writeln!(writer, "    }} catch {{")?;
        writeln!(writer, "        Write-Host \"FAILED: $Path ($_)\"")?;
        writeln!(writer, "        $script:Failed++")?;
        writeln!(writer, "    }}")?;
        writeln!(writer, "}}")?;
        writeln!(writer)?;

        for entry in &self.plan.entries {
            let path = self.path_mapping.translate(&entry.path)?;
            let size = entry.size.map_or_else(|| "-1".to_string(), |s| s.to_string());
            writeln!(writer, "# {}", entry.fingerprint)?;
            writeln!(writer, "Reclaim-File {} {}", escape_powershell(&path), size)?;
        }
        writeln!(writer)?;

        writeln!(
            writer,
            "Write-Host \"Removed $Removed file(s), $Missing already gone, $Failed failed.\""
        )?;
        writeln!(writer, "if ($Failed -gt 0) {{ exit 1 }}")?;

        Ok(())
    }
}

fn size_arg(size: Option<u64>) -> String {
    size.map_or_else(|| "-".to_string(), |s| s.to_string())
}

/// File name for a plan script: `reclaim_<YYYYmmdd_HHMMSS>.<ext>`.
#[must_use]
pub fn script_file_name(plan: &ReclaimPlan, script_type: ScriptType) -> String {
    format!(
        "reclaim_{}.{}",
        plan.created_at.format("%Y%m%d_%H%M%S"),
        script_type.extension()
    )
}

/// Write the plan script into `plan_dir` and return its path.
///
/// The directory is created if needed. POSIX scripts are made executable.
///
/// # Errors
///
/// See [`ScriptError`].
pub fn write_plan_script(
    plan: &ReclaimPlan,
    plan_dir: &Path,
    script_type: ScriptType,
    mapping: PathMapping,
) -> Result<PathBuf, ScriptError> {
    let text = PlanScript::new(plan, script_type)
        .with_path_mapping(mapping)
        .render()?;
    let path = persist_script(
        plan_dir,
        &script_file_name(plan, script_type),
        &text,
        script_type == ScriptType::Posix,
    )?;
    log::info!("Wrote reclaim plan to {}", path.display());
    Ok(path)
}

fn persist_script(
    dir: &Path,
    file_name: &str,
    text: &str,
    executable: bool,
) -> Result<PathBuf, ScriptError> {
    std::fs::create_dir_all(dir).map_err(|source| ScriptError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let path = dir.join(file_name);
    write_atomic(&path, text.as_bytes())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if executable {
            let mode = std::fs::Permissions::from_mode(0o755);
            if let Err(e) = std::fs::set_permissions(&path, mode) {
                log::debug!("Could not mark {} executable: {}", path.display(), e);
            }
        }
    }
    #[cfg(not(unix))]
    let _ = executable;

    Ok(path)
}

/// Script that removes already backed-up media files from the device.
pub struct DeviceCleanupScript<'a> {
    /// Full device paths, removed in this order.
    pub files: &'a [String],
    /// `adb` binary the script runs unless `SNAPLEDGER_ADB_PATH` is set.
    pub adb_path: &'a Path,
    /// Generation time, shown in the header and the file name.
    pub created_at: DateTime<Local>,
}

impl<'a> DeviceCleanupScript<'a> {
    /// Create a new script formatter.
    #[must_use]
    pub fn new(files: &'a [String], adb_path: &'a Path, created_at: DateTime<Local>) -> Self {
        Self {
            files,
            adb_path,
            created_at,
        }
    }

    /// Write the generated script to a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer, "#!/bin/sh")?;
        writeln!(writer, "# snapledger device cleanup")?;
        writeln!(
            writer,
            "# Generated on: {}",
            self.created_at.format("%Y-%m-%d %H:%M:%S")
        )?;
        writeln!(writer, "#")?;
        writeln!(
            writer,
            "# Every file below was copied into a backup run before this was written."
        )?;
        writeln!(
            writer,
            "# WARNING: confirming will PERMANENTLY DELETE these files from the phone."
        )?;
        writeln!(writer, "# Run it only after verifying the backup.")?;
        writeln!(writer, "#")?;
        writeln!(writer, "# Files: {}", self.files.len())?;
        writeln!(writer)?;

        writeln!(writer, "ADB=${{SNAPLEDGER_ADB_PATH:-}}")?;
        writeln!(
            writer,
            "[ -n \"$ADB\" ] || ADB={}",
            escape_posix(self.adb_path)
        )?;
        writeln!(writer)?;

        writeln!(
            writer,
            "printf 'Type {} to remove {} media file(s) from the phone: '",
            CONFIRMATION_TOKEN,
            self.files.len()
        )?;
        writeln!(writer, "read -r ANSWER || exit 0")?;
        writeln!(writer, "[ \"$ANSWER\" = \"{}\" ] || exit 0", CONFIRMATION_TOKEN)?;
        writeln!(writer)?;

        writeln!(writer, "REMOVED=0")?;
        writeln!(writer, "FAILED=0")?;
        writeln!(writer)?;

        writeln!(writer, "# remove_on_device <device path> <device command>")?;
        writeln!(writer, "remove_on_device() {{")?;
        writeln!(writer, "    echo \"Deleting $1 ...\"")?;
        writeln!(writer, "    if \"$ADB\" shell \"$2\" </dev/null; then")?;
        writeln!(writer, "        REMOVED=$((REMOVED + 1))")?;
        writeln!(writer, "    else")?;
        writeln!(writer, "        echo \"FAILED: $1\" >&2")?;
        writeln!(writer, "        FAILED=$((FAILED + 1))")?;
        writeln!(writer, "    fi")?;
        writeln!(writer, "}}")?;
        writeln!(writer)?;

        for file in self.files {
            let command = format!("rm -f {}", quote_posix(file));
            writeln!(
                writer,
                "remove_on_device {} {}",
                quote_posix(file),
                quote_posix(&command)
            )?;
        }
        writeln!(writer)?;

        writeln!(
            writer,
            "echo \"Removed $REMOVED file(s) from the phone, $FAILED failed.\""
        )?;
        writeln!(writer, "[ \"$FAILED\" -eq 0 ] || exit 1")?;
        Ok(())
    }

    /// Render into a string.
    ///
    /// # Errors
    ///
    /// As for [`DeviceCleanupScript::write_to`].
    pub fn render(&self) -> io::Result<String> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// File name: `device_cleanup_<YYYYmmdd_HHMMSS>.sh`.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!(
            "device_cleanup_{}.sh",
            self.created_at.format("%Y%m%d_%H%M%S")
        )
    }

    /// Write the script into `dir`, executable, and return its path.
    ///
    /// # Errors
    ///
    /// See [`ScriptError`].
    pub fn write_into(&self, dir: &Path) -> Result<PathBuf, ScriptError> {
        let text = self.render()?;
        let path = persist_script(dir, &self.file_name(), &text, true)?;
        log::info!("Wrote device cleanup script to {}", path.display());
        Ok(path)
    }
}

/// Quote `s` as a single POSIX shell word.
#[must_use]
pub fn quote_posix(s: &str) -> String {
    // Wrap in single quotes, escape single quotes as '\''
    format!("'{}'", s.replace('\'', "'\\''"))
}

fn escape_posix(path: &Path) -> String {
    quote_posix(&path.to_string_lossy())
}

fn escape_powershell(path: &Path) -> String {
    let s = path.to_string_lossy();
    // Wrap in single quotes, escape single quotes as ''
    format!("'{}'", s.replace('\'', "''"))
}
