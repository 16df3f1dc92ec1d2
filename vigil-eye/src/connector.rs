//! Establishing the per-camera connection to the frame processor

use crate::config::{CameraConfig, RelayMode};
use crate::error::VisionError;
use std::net::SocketAddr;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Connection to the processor for one camera, plus the helper process
/// launched for it (killed when this is dropped)
pub struct PeerLink {
    pub stream: TcpStream,
    pub helper: Option<Child>,
}

/// Hands out one dedicated processor connection per opened camera.
///
/// In accept mode the listener is bound once and shared; opens are
/// serialized on it so each accepted connection goes to the camera that
/// asked for it. With a helper configured, connections queued before the
/// helper is launched belong to earlier opens and are dropped.
pub struct PeerConnector {
    config: Arc<CameraConfig>,
    listener: Option<Mutex<TcpListener>>,
    local_addr: Option<SocketAddr>,
}

impl PeerConnector {
    pub async fn new(config: Arc<CameraConfig>) -> Result<Self, VisionError> {
        match config.mode {
            RelayMode::Accept => {
                let listener = TcpListener::bind(config.relay_addr.as_str()).await.map_err(|e| {
                    VisionError::ConnectionLost(format!("Failed to listen on {}: {}", config.relay_addr, e))
                })?;
                let local_addr = listener.local_addr()?;
                info!("Frame relay listening on {}", local_addr);
                Ok(Self {
                    config,
                    listener: Some(Mutex::new(listener)),
                    local_addr: Some(local_addr),
                })
            }
            RelayMode::Connect => Ok(Self {
                config,
                listener: None,
                local_addr: None,
            }),
        }
    }

    /// Bound address in accept mode
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn relay_addr(&self) -> String {
        self.local_addr
            .map(|a| a.to_string())
            .unwrap_or_else(|| self.config.relay_addr.clone())
    }

    /// Launch the helper and obtain the connection for `camera_id`
    pub async fn establish(&self, camera_id: u32) -> Result<PeerLink, VisionError> {
        let open_timeout = self.config.open_timeout();

        let link = match self.listener {
            Some(ref listener) => {
                let listener = listener.lock().await;
                if self.config.helper_command.is_some() {
                    drop_stale_connections(&listener).await;
                }
                let helper = self.spawn_helper(camera_id)?;
                let (stream, peer) = timeout(open_timeout, listener.accept())
                    .await
                    .map_err(|_| {
                        VisionError::Timeout(format!(
                            "No processor connected for camera {} within {:?}",
                            camera_id, open_timeout
                        ))
                    })??;
                debug!("Processor {} connected for camera {}", peer, camera_id);
                PeerLink { stream, helper }
            }
            None => {
                let helper = self.spawn_helper(camera_id)?;
                let stream = timeout(open_timeout, TcpStream::connect(self.config.relay_addr.as_str()))
                    .await
                    .map_err(|_| {
                        VisionError::Timeout(format!(
                            "Could not reach processor at {} within {:?}",
                            self.config.relay_addr, open_timeout
                        ))
                    })?
                    .map_err(|e| {
                        VisionError::ConnectionLost(format!(
                            "Failed to connect to {}: {}",
                            self.config.relay_addr, e
                        ))
                    })?;
                PeerLink { stream, helper }
            }
        };

        link.stream.set_nodelay(true)?;
        Ok(link)
    }

    fn spawn_helper(&self, camera_id: u32) -> Result<Option<Child>, VisionError> {
        let command = match self.config.helper_command {
            Some(ref command) => command,
            None => return Ok(None),
        };
        let (program, args) = match command.split_first() {
            Some(split) => split,
            None => return Ok(None),
        };

        let addr = self.relay_addr();
        let args: Vec<String> = args
            .iter()
            .map(|arg| {
                arg.replace("{camera_id}", &camera_id.to_string())
                    .replace("{addr}", &addr)
            })
            .collect();

        let child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                VisionError::DeviceUnavailable(format!("Failed to launch processor '{}': {}", program, e))
            })?;

        info!("Launched processor '{}' for camera {}", program, camera_id);
        Ok(Some(child))
    }
}

/// Accept and close whatever is already waiting in the backlog
async fn drop_stale_connections(listener: &TcpListener) {
    while let Ok(accepted) = timeout(Duration::ZERO, listener.accept()).await {
        match accepted {
            Ok((stream, peer)) => {
                warn!("Dropping stale processor connection from {}", peer);
                drop(stream);
            }
            Err(e) => {
                debug!("Accept failed while clearing backlog: {}", e);
                return;
            }
        }
    }
}
