//! Dashboard configuration: one file for every component

use crate::error::DashError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use vigil_core::LogConfig;
use vigil_eye::CameraConfig;
use vigil_sc::AudioConfig;

/// Display cadence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Emotion bar refresh (≈60 Hz)
    pub emotion_tick_ms: u64,
    /// Camera frame refresh (≈33 Hz)
    pub frame_tick_ms: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            emotion_tick_ms: 16,
            frame_tick_ms: 30,
        }
    }
}

impl DisplayConfig {
    pub fn emotion_tick(&self) -> Duration {
        Duration::from_millis(self.emotion_tick_ms)
    }

    pub fn frame_tick(&self) -> Duration {
        Duration::from_millis(self.frame_tick_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.emotion_tick_ms == 0 || self.emotion_tick_ms > 1000 {
            return Err("Emotion tick must be between 1 and 1000 ms".to_string());
        }
        if self.frame_tick_ms == 0 || self.frame_tick_ms > 1000 {
            return Err("Frame tick must be between 1 and 1000 ms".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub log: LogConfig,
    pub audio: AudioConfig,
    pub cameras: CameraConfig,
    pub display: DisplayConfig,
}

impl DashboardConfig {
    /// Load from a JSON, TOML or YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DashError> {
        vigil_core::config::from_file(path).map_err(|e| DashError::Config(e.to_string()))
    }

    /// Apply `VIGIL_*` environment overrides
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(level) = lookup("VIGIL_LOG_LEVEL") {
            self.log.level = level;
        }
        if let Some(addr) = lookup("VIGIL_RELAY_ADDR") {
            self.cameras.relay_addr = addr;
        }
        if let Some(helper) = lookup("VIGIL_HELPER") {
            let command: Vec<String> = helper.split_whitespace().map(str::to_string).collect();
            self.cameras.helper_command = if command.is_empty() { None } else { Some(command) };
        }
    }

    pub fn validate(&self) -> Result<(), DashError> {
        self.log.validate().map_err(|e| DashError::Config(format!("log: {}", e)))?;
        self.audio
            .validate()
            .map_err(|e| DashError::Config(format!("audio: {}", e)))?;
        self.cameras
            .validate()
            .map_err(|e| DashError::Config(format!("cameras: {}", e)))?;
        self.display
            .validate()
            .map_err(|e| DashError::Config(format!("display: {}", e)))?;
        Ok(())
    }
}
