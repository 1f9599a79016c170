//! Configuration loading and root folder resolution

use crate::{Error, Result};
use std::path::PathBuf;

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "civiq.db";

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. `CIVIQ_ROOT` environment variable
/// 3. TOML config file (`root_folder` key)
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&str>) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var("CIVIQ_ROOT") {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Ok(config_path) = find_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(root_folder) = config.get("root_folder").and_then(|v| v.as_str()) {
                    return PathBuf::from(root_folder);
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// Ensure the root folder exists and return the database path inside it
pub fn prepare_root_folder(root: &PathBuf) -> Result<PathBuf> {
    std::fs::create_dir_all(root)?;
    Ok(root.join(DATABASE_FILE))
}

/// Locate the platform configuration file, if any
fn find_config_file() -> Result<PathBuf> {
    if cfg!(target_os = "linux") {
        // ~/.config/civiq/config.toml first, then /etc/civiq/config.toml
        if let Some(path) = dirs::config_dir().map(|d| d.join("civiq").join("config.toml")) {
            if path.exists() {
                return Ok(path);
            }
        }
        let system_config = PathBuf::from("/etc/civiq/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
        Err(Error::Config("No config file found".to_string()))
    } else {
        let path = dirs::config_dir()
            .map(|d| d.join("civiq").join("config.toml"))
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;
        if path.exists() {
            Ok(path)
        } else {
            Err(Error::Config(format!("Config file not found: {:?}", path)))
        }
    }
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("civiq"))
        .unwrap_or_else(|| PathBuf::from("./civiq_data"))
}

/// Read a setting value from the settings table, with a default
pub async fn setting_or(db: &sqlx::SqlitePool, key: &str, default: &str) -> String {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(db)
            .await
            .ok()
            .flatten();

    match value {
        Some(Some(v)) => v,
        _ => default.to_string(),
    }
}

/// Read a numeric setting, falling back to the default on missing or
/// unparseable values
pub async fn setting_i64_or(db: &sqlx::SqlitePool, key: &str, default: i64) -> i64 {
    setting_or(db, key, &default.to_string())
        .await
        .parse::<i64>()
        .unwrap_or(default)
}
