//! Error types for vigil-sc

use thiserror::Error;
use vigil_core::Error as CoreError;

/// Audio capture and inference errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Audio capture error: {0}")]
    Capture(String),

    #[error("Classifier failure: {0}")]
    ClassifierFailure(String),

    #[error("Label mapping error: {0}")]
    LabelMapping(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AudioError {
    /// Whether the failure came from the capture device rather than inference
    pub fn is_device_failure(&self) -> bool {
        matches!(self, AudioError::DeviceUnavailable(_) | AudioError::Capture(_) | AudioError::Io(_))
    }
}

impl From<AudioError> for CoreError {
    fn from(err: AudioError) -> Self {
        match err {
            AudioError::Config(msg) => CoreError::Configuration(msg),
            other => CoreError::Audio(other.to_string()),
        }
    }
}
