//! Error types for vigil-eye

use thiserror::Error;
use vigil_core::Error as CoreError;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Camera unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Camera read error: {0}")]
    Capture(String),

    #[error("Frame decode error: expected {expected} bytes, got {actual}")]
    ProtocolDecode { expected: usize, actual: usize },

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Camera {0} is already open")]
    AlreadyOpen(u32),

    #[error("Camera {0} is not open")]
    NotOpen(u32),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("OpenCV error: {0}")]
    OpenCv(String),
}

impl VisionError {
    /// Failures confined to a single frame; the session keeps streaming
    pub fn is_frame_error(&self) -> bool {
        matches!(self, VisionError::ProtocolDecode { .. } | VisionError::Image(_))
    }

    /// Failures reading from the capture device
    pub fn is_device_error(&self) -> bool {
        matches!(
            self,
            VisionError::DeviceUnavailable(_) | VisionError::Capture(_) | VisionError::OpenCv(_)
        )
    }
}

impl From<VisionError> for CoreError {
    fn from(err: VisionError) -> Self {
        match err {
            VisionError::Config(msg) => CoreError::Configuration(msg),
            VisionError::Io(e) => CoreError::Io(e),
            other => CoreError::Vision(other.to_string()),
        }
    }
}

#[cfg(feature = "opencv")]
impl From<opencv::Error> for VisionError {
    fn from(err: opencv::Error) -> Self {
        VisionError::OpenCv(err.message)
    }
}
