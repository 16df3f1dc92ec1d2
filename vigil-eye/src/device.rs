//! Capture devices

use crate::error::VisionError;
use crate::frame::{FrameBuffer, FrameFormat};
use std::sync::Arc;

/// An opened camera producing RGB frames.
///
/// `read_frame` blocks until a frame is available and returns it in the
/// format the device was opened with.
pub trait CaptureDevice: Send {
    fn read_frame(&mut self) -> Result<FrameBuffer, VisionError>;

    /// Release the underlying device. Further reads fail.
    fn release(&mut self);
}

impl<D: CaptureDevice + ?Sized> CaptureDevice for Box<D> {
    fn read_frame(&mut self) -> Result<FrameBuffer, VisionError> {
        (**self).read_frame()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

/// Opens capture devices by index
pub trait DeviceProvider: Send + Sync {
    fn open(&self, index: u32, format: FrameFormat) -> Result<Box<dyn CaptureDevice>, VisionError>;
}

impl<P: DeviceProvider + ?Sized> DeviceProvider for Arc<P> {
    fn open(&self, index: u32, format: FrameFormat) -> Result<Box<dyn CaptureDevice>, VisionError> {
        (**self).open(index, format)
    }
}

/// Provider used when no capture backend is compiled in
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDevices;

impl DeviceProvider for NoDevices {
    fn open(&self, index: u32, _format: FrameFormat) -> Result<Box<dyn CaptureDevice>, VisionError> {
        Err(VisionError::DeviceUnavailable(format!(
            "camera {}: built without a capture backend",
            index
        )))
    }
}

/// Platform device provider
pub fn default_provider() -> Arc<dyn DeviceProvider> {
    #[cfg(feature = "opencv")]
    {
        Arc::new(opencv_backend::OpenCvProvider)
    }

    #[cfg(not(feature = "opencv"))]
    {
        Arc::new(NoDevices)
    }
}

#[cfg(feature = "opencv")]
pub use opencv_backend::{OpenCvCamera, OpenCvProvider};

#[cfg(feature = "opencv")]
mod opencv_backend {
    use super::{CaptureDevice, DeviceProvider};
    use crate::error::VisionError;
    use crate::frame::{FrameBuffer, FrameFormat};
    use opencv::{
        core::{Mat, Size},
        imgproc,
        prelude::*,
        videoio::{VideoCapture, CAP_ANY, CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH},
    };
    use tracing::{debug, info};

    /// Opens cameras through OpenCV's video I/O
    #[derive(Debug, Default, Clone, Copy)]
    pub struct OpenCvProvider;

    impl DeviceProvider for OpenCvProvider {
        fn open(&self, index: u32, format: FrameFormat) -> Result<Box<dyn CaptureDevice>, VisionError> {
            Ok(Box::new(OpenCvCamera::open(index, format)?))
        }
    }

    /// USB webcam opened through OpenCV
    pub struct OpenCvCamera {
        index: u32,
        format: FrameFormat,
        capture: Option<VideoCapture>,
    }

    impl OpenCvCamera {
        pub fn open(index: u32, format: FrameFormat) -> Result<Self, VisionError> {
            let mut capture = VideoCapture::new(index as i32, CAP_ANY)
                .map_err(|e| VisionError::DeviceUnavailable(format!("Failed to open camera {}: {}", index, e)))?;

            if !capture
                .is_opened()
                .map_err(|e| VisionError::DeviceUnavailable(format!("Camera {} not opened: {}", index, e)))?
            {
                return Err(VisionError::DeviceUnavailable(format!("Camera {} failed to open", index)));
            }

            // Best effort; frames are resized to the requested format anyway
            let _ = capture.set(CAP_PROP_FRAME_WIDTH, format.width as f64);
            let _ = capture.set(CAP_PROP_FRAME_HEIGHT, format.height as f64);

            info!("Camera {} opened ({})", index, format);
            Ok(Self {
                index,
                format,
                capture: Some(capture),
            })
        }
    }

    impl CaptureDevice for OpenCvCamera {
        fn read_frame(&mut self) -> Result<FrameBuffer, VisionError> {
            let capture = self
                .capture
                .as_mut()
                .ok_or_else(|| VisionError::DeviceUnavailable(format!("Camera {} released", self.index)))?;

            let mut frame = Mat::default();
            let grabbed = capture
                .read(&mut frame)
                .map_err(|e| VisionError::Capture(format!("Failed to read frame: {}", e)))?;
            if !grabbed || frame.empty() {
                return Err(VisionError::Capture(format!("Camera {} returned no frame", self.index)));
            }

            let wanted = Size::new(self.format.width as i32, self.format.height as i32);
            let sized = if frame.cols() != wanted.width || frame.rows() != wanted.height {
                debug!(
                    "Resizing {}x{} frame to {}",
                    frame.cols(),
                    frame.rows(),
                    self.format
                );
                let mut resized = Mat::default();
                imgproc::resize(&frame, &mut resized, wanted, 0.0, 0.0, imgproc::INTER_LINEAR)?;
                resized
            } else {
                frame
            };

            let mut rgb = Mat::default();
            imgproc::cvt_color(&sized, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;

            let bytes = rgb.data_bytes()?.to_vec();
            FrameBuffer::new(self.format, bytes)
        }

        fn release(&mut self) {
            if let Some(mut capture) = self.capture.take() {
                let _ = capture.release();
                info!("Camera {} released", self.index);
            }
        }
    }

    impl Drop for OpenCvCamera {
        fn drop(&mut self) {
            self.release();
        }
    }
}
