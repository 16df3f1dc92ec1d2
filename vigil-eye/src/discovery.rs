//! Camera discovery

use crate::device::DeviceProvider;
use crate::error::VisionError;
use crate::frame::FrameFormat;
use std::sync::Arc;
use tracing::{debug, info};

/// Probe indices `0..max_index` and return those that yield a frame.
///
/// Each probed device is released before the next is opened. Indices in
/// `in_use` are owned by running sessions and reported without probing.
pub fn probe_cameras(
    provider: &dyn DeviceProvider,
    max_index: u32,
    format: FrameFormat,
    in_use: &[u32],
) -> Vec<u32> {
    let mut available = Vec::new();

    for index in 0..max_index {
        if in_use.contains(&index) {
            available.push(index);
            continue;
        }

        let mut device = match provider.open(index, format) {
            Ok(device) => device,
            Err(e) => {
                debug!("Camera {} not available: {}", index, e);
                continue;
            }
        };

        match device.read_frame() {
            Ok(_) => available.push(index),
            Err(e) => debug!("Camera {} opened but produced no frame: {}", index, e),
        }
        device.release();
    }

    info!("Discovered cameras: {:?}", available);
    available
}

/// Run [`probe_cameras`] on the blocking pool
pub async fn discover_cameras(
    provider: Arc<dyn DeviceProvider>,
    max_index: u32,
    format: FrameFormat,
    in_use: Vec<u32>,
) -> Result<Vec<u32>, VisionError> {
    tokio::task::spawn_blocking(move || probe_cameras(provider.as_ref(), max_index, format, &in_use))
        .await
        .map_err(|e| VisionError::DeviceUnavailable(format!("Camera discovery failed: {}", e)))
}
