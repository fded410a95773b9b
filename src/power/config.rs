//! Configuration file discovery and loading

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::power::models::MonitorConfig;

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "BATTERY_MONITOR_CONFIG_DIR";

const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Get the configuration directory
/// Priority: 1. Explicit path, 2. BATTERY_MONITOR_CONFIG_DIR env var, 3. Platform config dir
pub fn get_config_dir(custom_path: Option<&str>) -> PathBuf {
    if let Some(path) = custom_path {
        return PathBuf::from(path);
    }

    if let Ok(env_path) = env::var(CONFIG_DIR_ENV) {
        return PathBuf::from(env_path);
    }

    if let Some(dir) = dirs::config_dir() {
        return dir.join("battery-monitor");
    }

    PathBuf::from(".battery-monitor")
}

pub fn get_config_path(custom_path: Option<&str>) -> PathBuf {
    get_config_dir(custom_path).join(CONFIG_FILE_NAME)
}

/// Load the configuration, falling back to defaults when no file exists
pub fn load_config(custom_path: Option<&str>) -> Result<MonitorConfig, ConfigError> {
    let path = get_config_path(custom_path);
    if !path.exists() {
        debug!("No config at {:?}, using defaults", path);
        return Ok(MonitorConfig::default());
    }

    parse_config_file(&path)
}

fn parse_config_file(path: &Path) -> Result<MonitorConfig, ConfigError> {
    let text = fs::read_to_string(path)?;
    let config = serde_json::from_str(&text)?;
    info!("Loaded config from {:?}", path);
    Ok(config)
}

/// Write the configuration, creating the directory if needed
pub fn save_config(custom_path: Option<&str>, config: &MonitorConfig) -> Result<PathBuf, ConfigError> {
    let path = get_config_path(custom_path);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, serde_json::to_string_pretty(config)?)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("battery-monitor-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_explicit_dir_wins() {
        assert_eq!(get_config_dir(Some("/tmp/bm")), PathBuf::from("/tmp/bm"));
        assert_eq!(get_config_path(Some("/tmp/bm")), PathBuf::from("/tmp/bm/config.json"));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = scratch_dir("missing");
        let config = load_config(dir.to_str()).unwrap();
        assert_eq!(config, MonitorConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = scratch_dir("partial");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("config.json"), r#"{"pollIntervalSeconds": 30, "ledgerMode": "shell"}"#).unwrap();

        let config = load_config(dir.to_str()).unwrap();
        assert_eq!(config.poll_interval_seconds, 30);
        assert_eq!(config.ledger_mode, "shell");
        assert_eq!(config.active_current_threshold_ma, 200.0);
        assert_eq!(config.ledger_noise_floor, 0.0001);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_save_then_load() {
        let dir = scratch_dir("save");
        let config = MonitorConfig {
            deep_sleep_ratio: 0.75,
            ledger_path: Some("/data/ledger".to_string()),
            ..Default::default()
        };

        save_config(dir.to_str(), &config).unwrap();
        assert_eq!(load_config(dir.to_str()).unwrap(), config);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let dir = scratch_dir("invalid");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("config.json"), "{not json").unwrap();

        assert!(matches!(load_config(dir.to_str()), Err(ConfigError::Json(_))));

        let _ = fs::remove_dir_all(&dir);
    }
}
