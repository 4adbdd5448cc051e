use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use snapledger::config::{Config, ConfigError};
use snapledger::device::PathMapping;
use snapledger::output::ScriptSetting;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::tempdir;

static ENV_MUTEX: Mutex<()> = Mutex::new(());

fn clear_env() {
    for (key, _) in std::env::vars() {
        if key.starts_with("SNAPLEDGER_") {
            std::env::remove_var(key);
        }
    }
}

#[test]
fn test_config_load_defaults() {
    let figment = Figment::from(Serialized::defaults(Config::default()));
    let config: Config = figment.extract().unwrap();
    assert_eq!(config, Config::default());
    assert!(config.backup_root.is_none());
    assert_eq!(config.path_mapping, PathMapping::Identity);
}

#[test]
fn test_config_load_from_toml() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        r#"
backup_root = "/mnt/d/PhoneBackups"
adb_path = "/mnt/c/platform-tools/adb.exe"
media_dirs = ["/sdcard/DCIM/Camera", "/sdcard/Pictures"]
capcut_dir = "/sdcard/Android/data/com.lemon.lvoverseas"
path_mapping = "wsl_to_windows"
script_type = "posix"
"#,
    )
    .unwrap();

    let config = Config::load_from_path(Some(config_path.as_path())).unwrap();

    assert_eq!(config.backup_root, Some(PathBuf::from("/mnt/d/PhoneBackups")));
    assert_eq!(config.media_dirs.len(), 2);
    assert_eq!(config.path_mapping, PathMapping::WslToWindows);
    assert_eq!(config.script_type, ScriptSetting::Posix);
    assert!(config.portodb_dir.is_none());
    assert_eq!(
        config.plan_dir().unwrap(),
        PathBuf::from("/mnt/d/PhoneBackups/reclaim_plans")
    );
    assert_eq!(config.sources(true).media_dirs, config.media_dirs);
    assert!(config.sources(true).skip_portodb);
}

#[test]
fn test_env_overrides_file() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "backup_root = \"/from/file\"\nmedia_dirs = [\"/sdcard/A\"]\n").unwrap();

    std::env::set_var("SNAPLEDGER_BACKUP_ROOT", "/from/env");
    std::env::set_var("SNAPLEDGER_MEDIA_DIRS", "/sdcard/DCIM/Camera,/sdcard/Movies");
    std::env::set_var("SNAPLEDGER_PATH_MAPPING", "wsl_to_windows");

    let config = Config::load_from_path(Some(config_path.as_path()));
    clear_env();
    let config = config.unwrap();

    assert_eq!(config.backup_root, Some(PathBuf::from("/from/env")));
    assert_eq!(
        config.media_dirs,
        vec!["/sdcard/DCIM/Camera".to_string(), "/sdcard/Movies".to_string()]
    );
    assert_eq!(config.path_mapping, PathMapping::WslToWindows);
}

#[test]
fn test_missing_file_is_defaults() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let temp_dir = tempdir().unwrap();
    let config = Config::load_from_path(Some(temp_dir.path().join("absent.toml").as_path())).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_invalid_value_is_error() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "script_type = \"fish\"\n").unwrap();

    let err = Config::load_from_path(Some(config_path.as_path())).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn test_toml_layer_directly() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "plan_dir = \"/plans\"\n").unwrap();

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&config_path))
        .extract()
        .unwrap();
    assert_eq!(config.plan_dir().unwrap(), PathBuf::from("/plans"));
}

#[test]
fn test_env_layer_directly() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    std::env::set_var("SNAPLEDGER_ADB_PATH", "/opt/adb");
    let config: Result<Config, _> = Figment::from(Serialized::defaults(Config::default()))
        .merge(Env::prefixed("SNAPLEDGER_"))
        .extract();
    clear_env();

    let config = config.unwrap();
    assert_eq!(
        config.require_adb_path().unwrap(),
        std::path::Path::new("/opt/adb")
    );
    assert!(config.require_backup_root().is_err());
}
