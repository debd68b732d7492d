//! Application configuration schema and loader
//!
//! Configuration lives in an optional `zenith.toml` inside the data
//! directory. Every field has a default, so a missing file is not an error.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::models::DEFAULT_COLOR_THEME;

/// File name looked up in the data directory
pub const CONFIG_FILE_NAME: &str = "zenith.toml";

/// Settings loaded from TOML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Prefix placed before every rendered amount
    pub currency: String,
    /// Color theme given to plans created without one
    pub default_color_theme: String,
    /// Database file override (relative paths resolve against the data directory)
    pub database: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            currency: "GHS ".to_string(),
            default_color_theme: DEFAULT_COLOR_THEME.to_string(),
            database: None,
        }
    }
}

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Invalid color theme '{0}', expected #rrggbb")]
    InvalidColorTheme(String),
}

impl AppConfig {
    /// Load from `path`, falling back to defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load from the conventional file inside a data directory
    pub fn load_from_dir(data_dir: &Path) -> Result<Self, ConfigError> {
        Self::load(&data_dir.join(CONFIG_FILE_NAME))
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        if !is_hex_color(&config.default_color_theme) {
            return Err(ConfigError::InvalidColorTheme(config.default_color_theme));
        }
        Ok(config)
    }

    /// Database location, resolving the override against `data_dir`
    pub fn database_path(&self, data_dir: &Path) -> PathBuf {
        match &self.database {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => data_dir.join(path),
            None => data_dir.join("zenith.db"),
        }
    }
}

fn is_hex_color(value: &str) -> bool {
    value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit())
}
