//! Error types for vigil-dash

use thiserror::Error;
use vigil_core::Error as CoreError;
use vigil_sc::AudioError;
use vigil_eye::VisionError;

#[derive(Error, Debug)]
pub enum DashError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Vision(#[from] VisionError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

impl From<DashError> for CoreError {
    fn from(err: DashError) -> Self {
        match err {
            DashError::Config(msg) => CoreError::Configuration(msg),
            DashError::Audio(e) => e.into(),
            DashError::Vision(e) => e.into(),
            DashError::Core(e) => e,
            DashError::Logging(msg) => CoreError::Configuration(msg),
        }
    }
}
