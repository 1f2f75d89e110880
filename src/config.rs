//! Data home and `config.json`.
//!
//! The data home is `$CADENCE_HOME` when set, otherwise `<data dir>/cadence`. It holds
//! the SQLite database and the config file.

use std::env;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::CadenceError;

pub const HOME_ENV: &str = "CADENCE_HOME";

/// Resolve the data home directory.
pub fn data_home() -> Result<PathBuf, CadenceError> {
    if let Some(home) = env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    dirs::data_dir()
        .map(|d| d.join("cadence"))
        .ok_or_else(|| CadenceError::validation(format!("Cannot locate a data directory; set {HOME_ENV}")))
}

/// Get the path to the cadence database.
pub fn db_path() -> Result<PathBuf, CadenceError> {
    Ok(data_home()?.join("cadence.db"))
}

/// Get the config file path.
pub fn config_path() -> Result<PathBuf, CadenceError> {
    Ok(data_home()?.join("config.json"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Owner of everything this installation creates.
    #[serde(default = "default_user_id")]
    pub user_id: String,
    /// Trailing window for `habit stats` when `--window` is not given.
    #[serde(default = "default_stats_window_days")]
    pub stats_window_days: u32,
}

fn default_user_id() -> String {
    env::var("USER")
        .ok()
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| "local".to_string())
}

fn default_stats_window_days() -> u32 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            stats_window_days: default_stats_window_days(),
        }
    }
}

impl Config {
    /// Load the config file, falling back to defaults when it does not exist.
    pub fn load() -> Result<Self, CadenceError> {
        let path = config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path).map_err(|e| CadenceError::database(e.to_string()))?;
        serde_json::from_str(&content)
            .map_err(|e| CadenceError::validation(format!("Invalid config at {}: {e}", path.display())))
    }

    pub fn save(&self) -> Result<PathBuf, CadenceError> {
        let path = config_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| CadenceError::database(e.to_string()))?;
        }
        let content =
            serde_json::to_string_pretty(self).map_err(|e| CadenceError::validation(e.to_string()))?;
        fs::write(&path, content).map_err(|e| CadenceError::database(e.to_string()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: Config = serde_json::from_str(r#"{"user_id":"ana"}"#).unwrap();
        assert_eq!(config.user_id, "ana");
        assert_eq!(config.stats_window_days, 30);
    }
}
