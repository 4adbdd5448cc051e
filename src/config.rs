//! Layered configuration.
//!
//! Values are merged by `figment` in this order, later layers winning:
//!
//! 1. built-in defaults
//! 2. a TOML file (`--config <PATH>`, or `config.toml` in the platform config
//!    directory, e.g. `~/.config/snapledger/config.toml`)
//! 3. `SNAPLEDGER_*` environment variables (`SNAPLEDGER_BACKUP_ROOT`, ...)
//!
//! CLI flags are applied on top by the binary.
//!
//! ```toml
//! backup_root = "/mnt/d/PhoneBackups"
//! adb_path = "/mnt/c/platform-tools/adb.exe"
//! media_dirs = ["/sdcard/DCIM/Camera", "/sdcard/Pictures"]
//! capcut_dir = "/sdcard/Android/data/com.lemon.lvoverseas"
//! path_mapping = "wsl_to_windows"
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::device::PathMapping;
use crate::output::script::ScriptSetting;
use crate::pipeline::BackupSources;

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "SNAPLEDGER_";

/// Directory under the backup root that receives plan scripts by default.
pub const DEFAULT_PLAN_SUBDIR: &str = "reclaim_plans";

/// Configuration problems.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A key the command needs has no value in any layer.
    #[error("{key} is not configured; set {env} or add `{key}` to the config file")]
    Missing {
        /// Config key
        key: &'static str,
        /// Environment variable that supplies it
        env: String,
    },

    /// A layer holds a value of the wrong shape.
    #[error("invalid configuration: {0}")]
    Invalid(#[from] Box<figment::Error>),

    /// Rendering the effective configuration failed.
    #[error("failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}

impl ConfigError {
    fn missing(key: &'static str) -> Self {
        Self::Missing {
            key,
            env: format!("{ENV_PREFIX}{}", key.to_uppercase()),
        }
    }
}

/// Effective settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root under which run directories and the ledger live.
    pub backup_root: Option<PathBuf>,
    /// The `adb` binary.
    pub adb_path: Option<PathBuf>,
    /// Device directories pulled into `<run>/media/`.
    #[serde(deserialize_with = "string_or_list")]
    pub media_dirs: Vec<String>,
    /// Device directory pulled into `<run>/capcut_app/`.
    pub capcut_dir: Option<String>,
    /// Device directory pulled into `<run>/portodb/`.
    pub portodb_dir: Option<String>,
    /// How local paths are handed to `adb` and PowerShell plan scripts.
    pub path_mapping: PathMapping,
    /// Where plan scripts are written.
    pub plan_dir: Option<PathBuf>,
    /// Plan script flavour.
    pub script_type: ScriptSetting,
}

/// Accept `["a", "b"]` or `"a,b"`; environment variables only carry strings.
fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    let items = match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => s.split(',').map(str::to_string).collect(),
        OneOrMany::Many(v) => v,
    };
    Ok(items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

impl Config {
    /// `config.toml` in the platform config directory.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "snapledger", "snapledger")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// The merged provider stack. A missing TOML file contributes nothing.
    #[must_use]
    pub fn figment(path: Option<&Path>) -> Figment {
        let file = path.map(Path::to_path_buf).or_else(Self::default_path);
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(file) = file {
            log::debug!("Config file: {}", file.display());
            figment = figment.merge(Toml::file(file));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load the layered configuration.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] when a layer does not parse or a value has
    /// the wrong type.
    pub fn load_from_path(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::figment(path).extract().map_err(|e| Box::new(e).into())
    }

    /// The backup root.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Missing`] naming `SNAPLEDGER_BACKUP_ROOT`.
    pub fn require_backup_root(&self) -> Result<&Path, ConfigError> {
        self.backup_root
            .as_deref()
            .ok_or_else(|| ConfigError::missing("backup_root"))
    }

    /// The `adb` binary.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Missing`] naming `SNAPLEDGER_ADB_PATH`.
    pub fn require_adb_path(&self) -> Result<&Path, ConfigError> {
        self.adb_path
            .as_deref()
            .ok_or_else(|| ConfigError::missing("adb_path"))
    }

    /// The plan directory, defaulting to `<backup_root>/reclaim_plans`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Missing`] if neither `plan_dir` nor `backup_root` is set.
    pub fn plan_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.plan_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(self.require_backup_root()?.join(DEFAULT_PLAN_SUBDIR)),
        }
    }

    /// Device sources for a backup.
    #[must_use]
    pub fn sources(&self, skip_portodb: bool) -> BackupSources {
        BackupSources {
            media_dirs: self.media_dirs.clone(),
            capcut_dir: self.capcut_dir.clone(),
            portodb_dir: self.portodb_dir.clone(),
            skip_portodb,
        }
    }

    /// The effective configuration as TOML.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Render`] if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_toml() {
            Ok(s) => f.write_str(&s),
            Err(_) => write!(f, "{self:?}"),
        }
    }
}
