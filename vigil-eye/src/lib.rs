//! vigil-eye: Camera side of the vigil dashboard
//!
//! Each opened camera gets a session that reads frames from the device,
//! relays them to an external frame processor over a loopback socket,
//! decodes the processed reply and scales it for display.

pub mod error;
pub mod config;
pub mod frame;
pub mod device;
pub mod discovery;
pub mod relay;
pub mod connector;
pub mod session;
pub mod manager;

pub use error::VisionError;
pub use config::{CameraConfig, Framing, RelayMode};
pub use frame::{decode_frame, fit_within, scale_to_fit, FrameBuffer, FrameFormat, RenderSize};
pub use device::{default_provider, CaptureDevice, DeviceProvider, NoDevices};
pub use discovery::{discover_cameras, probe_cameras};
pub use relay::RelayCodec;
pub use connector::{PeerConnector, PeerLink};
pub use session::{CameraSession, LatestFrame, SessionEvent, SessionState, SessionStats, SessionStatsSnapshot};
pub use manager::CameraManager;
#[cfg(feature = "opencv")]
pub use device::{OpenCvCamera, OpenCvProvider};
