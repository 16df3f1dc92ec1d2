//! Configuration for audio capture and emotion inference

use crate::emotion::{check_table, default_label_table, EmotionSlot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Audio capture and inference configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Run the audio worker
    pub enabled: bool,

    /// Input device name (None = default device)
    pub device_name: Option<String>,

    /// Sample rate (Hz) expected by the classifier
    pub sample_rate: u32,

    /// Length of each recorded clip in milliseconds
    pub clip_duration_ms: u64,

    /// EMA weight of the newest raw value per display tick
    pub smoothing_alpha: f32,

    /// Classifier label -> display slot
    pub labels: BTreeMap<String, EmotionSlot>,

    /// Emotion model settings
    pub model: ModelConfig,
}

/// Emotion model location and I/O contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path of the ONNX export of the model
    pub path: Option<PathBuf>,

    /// Name of the waveform input tensor
    pub input_name: String,

    /// Labels in model output order (empty = stock five-class order)
    pub class_labels: Vec<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            device_name: None,
            sample_rate: 16000,
            clip_duration_ms: 3000,
            smoothing_alpha: 0.02,
            labels: default_label_table(),
            model: ModelConfig::default(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: None,
            input_name: "input_values".to_string(),
            class_labels: Vec::new(),
        }
    }
}

impl AudioConfig {
    pub fn clip_duration(&self) -> Duration {
        Duration::from_millis(self.clip_duration_ms)
    }

    /// Number of samples in one clip
    pub fn clip_samples(&self) -> usize {
        (self.sample_rate as u64 * self.clip_duration_ms / 1000) as usize
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if let Some(ref name) = self.device_name {
            if name.is_empty() {
                return Err("Device name cannot be empty".to_string());
            }
            if name.len() > 256 {
                return Err("Device name too long (max 256 chars)".to_string());
            }
            if name.contains('\0') {
                return Err("Device name contains null byte".to_string());
            }
        }

        if self.sample_rate == 0 {
            return Err("Sample rate must be greater than 0".to_string());
        }

        if self.sample_rate > 192000 {
            return Err("Sample rate too high (max 192000 Hz)".to_string());
        }

        if self.clip_duration_ms < 10 {
            return Err("Clip duration too short (min 10 ms)".to_string());
        }

        if self.clip_duration_ms > 60_000 {
            return Err("Clip duration too long (max 60000 ms)".to_string());
        }

        if !(self.smoothing_alpha > 0.0 && self.smoothing_alpha <= 1.0) {
            return Err("Smoothing alpha must be in (0, 1]".to_string());
        }

        check_table(&self.labels).map_err(|e| e.to_string())?;

        self.model.validate()?;

        Ok(())
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.input_name.is_empty() {
            return Err("Model input name cannot be empty".to_string());
        }
        if self.class_labels.iter().any(|l| l.trim().is_empty()) {
            return Err("Model class labels cannot be empty".to_string());
        }
        Ok(())
    }
}
