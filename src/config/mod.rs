//! Configuration loading
//!
//! The config file is JSON5 so users can comment it. Resolution order for
//! the path: `CAPTIONFORGE_CONFIG`, then `<config dir>/captionforge/config.json5`.
//! A missing file is not an error; defaults apply.

pub mod types;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use types::*;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "CAPTIONFORGE_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Resolve the configuration file path.
pub fn get_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("captionforge")
        .join("config.json5")
}

/// Load and validate the configuration from the default path.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&get_config_path())
}

/// Load and validate the configuration from `path`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config = match std::fs::read_to_string(path) {
        Ok(raw) => parse_config(path, &raw)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Config::default()
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    config.validate().map_err(ConfigError::Invalid)?;
    Ok(config)
}

fn parse_config(path: &Path, raw: &str) -> Result<Config, ConfigError> {
    if raw.trim().is_empty() {
        return Ok(Config::default());
    }
    json5::from_str(raw).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
