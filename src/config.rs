// Configuration management - password defaults, storage location, heuristics
use crate::classifier::NEARBY_LABEL_THRESHOLD_PX;
use crate::generator::{CharClasses, DEFAULT_LENGTH, MAX_LENGTH};
use crate::storage::default_store_path;
use crate::store::SortOrder;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine config directory or home directory")]
    NoConfigDir,
    #[error("Failed to access config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Unknown config key: {0}")]
    UnknownKey(String),
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub password_length: usize,
    pub classes: CharClasses,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,
    pub nearby_label_threshold_px: f64,
    pub sort_order: SortOrder,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            password_length: DEFAULT_LENGTH,
            classes: CharClasses::all(),
            store_path: None,
            nearby_label_threshold_px: NEARBY_LABEL_THRESHOLD_PX,
            sort_order: SortOrder::Default,
        }
    }
}

impl Config {
    pub const KEYS: &'static [&'static str] = &[
        "password_length",
        "upper",
        "lower",
        "digit",
        "symbol",
        "store_path",
        "nearby_label_threshold_px",
        "sort_order",
    ];

    /// Get the config file path
    pub fn config_file_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
            .map(|dir| dir.join("passfill").join("config.json"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load configuration from `path`; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save configuration to `path`, creating its directory.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(io_err)
    }

    pub fn store_path(&self) -> PathBuf {
        self.store_path.clone().unwrap_or_else(default_store_path)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let value = match key {
            "password_length" => self.password_length.to_string(),
            "upper" => self.classes.upper.to_string(),
            "lower" => self.classes.lower.to_string(),
            "digit" => self.classes.digit.to_string(),
            "symbol" => self.classes.symbol.to_string(),
            "store_path" => self.store_path().display().to_string(),
            "nearby_label_threshold_px" => self.nearby_label_threshold_px.to_string(),
            "sort_order" => self.sort_order.to_string(),
            _ => return None,
        };
        Some(value)
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidValue {
            key: key.to_string(),
            reason,
        };
        match key {
            "password_length" => {
                let length: usize = value.parse().map_err(|e| invalid(format!("{}", e)))?;
                if !(1..=MAX_LENGTH).contains(&length) {
                    return Err(invalid(format!("must be between 1 and {}", MAX_LENGTH)));
                }
                self.password_length = length;
            }
            "upper" => self.classes.upper = parse_bool(value).map_err(invalid)?,
            "lower" => self.classes.lower = parse_bool(value).map_err(invalid)?,
            "digit" => self.classes.digit = parse_bool(value).map_err(invalid)?,
            "symbol" => self.classes.symbol = parse_bool(value).map_err(invalid)?,
            "store_path" => {
                self.store_path = (!value.is_empty()).then(|| PathBuf::from(value));
            }
            "nearby_label_threshold_px" => {
                let px: f64 = value.parse().map_err(|e| invalid(format!("{}", e)))?;
                if !px.is_finite() || px < 0.0 {
                    return Err(invalid("must be a non-negative number".to_string()));
                }
                self.nearby_label_threshold_px = px;
            }
            "sort_order" => self.sort_order = value.parse().map_err(invalid)?,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(format!("expected true or false, got {}", value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.password_length, 16);
    }

    #[test]
    fn test_set_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("passfill").join("config.json");

        let mut config = Config::default();
        config.set("password_length", "24").unwrap();
        config.set("symbol", "off").unwrap();
        config.set("sort_order", "date-desc").unwrap();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.password_length, 24);
        assert!(!loaded.classes.symbol);
        assert_eq!(loaded.sort_order, SortOrder::DateDesc);
        assert_eq!(loaded.get("symbol").as_deref(), Some("false"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"password_length": 20}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.password_length, 20);
        assert_eq!(config.classes, CharClasses::all());
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = Config::default();
        assert!(matches!(
            config.set("password_length", "0"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            config.set("upper", "maybe"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            config.set("colour", "blue"),
            Err(ConfigError::UnknownKey(_))
        ));
    }
}
