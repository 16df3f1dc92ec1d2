//! Multi-format configuration loading shared by every vigil component

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::ParseError(e) => write!(f, "Parse error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for crate::Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::ParseError(msg) => crate::Error::Serialization(msg),
            other => crate::Error::Configuration(other.to_string()),
        }
    }
}

/// Logging configuration consumed by the binary when installing the subscriber
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default level filter (error, warn, info, debug, trace)
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl LogConfig {
    pub fn validate(&self) -> Result<(), String> {
        const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
        if !LEVELS.contains(&self.level.to_ascii_lowercase().as_str()) {
            return Err(format!(
                "Log level must be one of {:?}, got '{}'",
                LEVELS, self.level
            ));
        }
        Ok(())
    }
}

/// Parse configuration content, trying JSON, then TOML, then YAML
pub fn from_str<T: DeserializeOwned>(content: &str) -> Result<T, ConfigError> {
    let json_err = match serde_json::from_str::<T>(content) {
        Ok(config) => return Ok(config),
        Err(e) => e,
    };

    let toml_err = match toml::from_str::<T>(content) {
        Ok(config) => return Ok(config),
        Err(e) => e,
    };

    let yaml_err = match serde_yaml::from_str::<T>(content) {
        Ok(config) => return Ok(config),
        Err(e) => e,
    };

    Err(ConfigError::ParseError(format!(
        "Unknown format (json: {}; toml: {}; yaml: {})",
        json_err,
        toml_err.message(),
        yaml_err
    )))
}

/// Load configuration from a file in any supported format
pub fn from_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ConfigError> {
    let path = path.as_ref();

    // Reject traversal sequences in relative paths
    if path.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
        return Err(ConfigError::IoError(format!(
            "Path traversal detected: '{}'",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;
    from_str(&content)
}
