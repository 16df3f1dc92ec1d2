//! Registry of open camera sessions

use crate::config::CameraConfig;
use crate::connector::PeerConnector;
use crate::device::DeviceProvider;
use crate::discovery::discover_cameras;
use crate::error::VisionError;
use crate::frame::RenderSize;
use crate::session::{CameraSession, LatestFrame, SessionEvent, SessionState, SessionStatsSnapshot};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 64;

enum Slot {
    /// Reserved while the session is being opened
    Opening,
    Open(CameraSession),
}

/// Frees an `Opening` reservation unless the open ran to completion
struct OpeningGuard<'a> {
    sessions: &'a Mutex<HashMap<u32, Slot>>,
    camera_id: u32,
    armed: bool,
}

impl OpeningGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for OpeningGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut sessions = self.sessions.lock();
        if matches!(sessions.get(&self.camera_id), Some(Slot::Opening)) {
            sessions.remove(&self.camera_id);
            warn!("Open of camera {} was cancelled", self.camera_id);
        }
    }
}

/// Owns every camera session; at most one per camera id
pub struct CameraManager {
    config: Arc<CameraConfig>,
    provider: Arc<dyn DeviceProvider>,
    connector: PeerConnector,
    sessions: Mutex<HashMap<u32, Slot>>,
    events: broadcast::Sender<SessionEvent>,
}

impl CameraManager {
    /// Validate the configuration and, in accept mode, start listening
    pub async fn new(config: CameraConfig, provider: Arc<dyn DeviceProvider>) -> Result<Self, VisionError> {
        config.validate().map_err(VisionError::Config)?;
        let config = Arc::new(config);
        let connector = PeerConnector::new(config.clone()).await?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            config,
            provider,
            connector,
            sessions: Mutex::new(HashMap::new()),
            events,
        })
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    /// Relay listen address in accept mode
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.connector.local_addr()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Drop sessions whose task has finished on its own
    fn prune_closed(sessions: &mut HashMap<u32, Slot>) {
        sessions.retain(|_, slot| match slot {
            Slot::Opening => true,
            Slot::Open(session) => !session.is_closed(),
        });
    }

    /// Open a session for `camera_id`
    pub async fn open_camera(&self, camera_id: u32) -> Result<(), VisionError> {
        {
            let mut sessions = self.sessions.lock();
            Self::prune_closed(&mut sessions);
            if sessions.contains_key(&camera_id) {
                return Err(VisionError::AlreadyOpen(camera_id));
            }
            sessions.insert(camera_id, Slot::Opening);
        }
        let mut guard = OpeningGuard {
            sessions: &self.sessions,
            camera_id,
            armed: true,
        };

        let result = CameraSession::open(
            camera_id,
            self.config.clone(),
            &self.connector,
            self.provider.clone(),
            self.events.clone(),
        )
        .await;

        guard.disarm();
        let mut sessions = self.sessions.lock();
        match result {
            Ok(session) => {
                sessions.insert(camera_id, Slot::Open(session));
                Ok(())
            }
            Err(e) => {
                sessions.remove(&camera_id);
                warn!("Failed to open camera {}: {}", camera_id, e);
                Err(e)
            }
        }
    }

    /// Close the session for `camera_id`
    pub async fn close_camera(&self, camera_id: u32) -> Result<(), VisionError> {
        let session = {
            let mut sessions = self.sessions.lock();
            match sessions.remove(&camera_id) {
                Some(Slot::Open(session)) => session,
                Some(Slot::Opening) => {
                    sessions.insert(camera_id, Slot::Opening);
                    return Err(VisionError::NotOpen(camera_id));
                }
                None => return Err(VisionError::NotOpen(camera_id)),
            }
        };

        session.close().await;
        info!("Camera {} closed on request", camera_id);
        Ok(())
    }

    /// Close every open session
    pub async fn close_all(&self) {
        let sessions: Vec<CameraSession> = {
            let mut sessions = self.sessions.lock();
            let ids: Vec<u32> = sessions
                .iter()
                .filter(|(_, slot)| matches!(slot, Slot::Open(_)))
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| match sessions.remove(&id) {
                    Some(Slot::Open(session)) => Some(session),
                    _ => None,
                })
                .collect()
        };

        for session in sessions {
            session.close().await;
        }
    }

    /// Ids of streaming sessions, ascending
    pub fn open_cameras(&self) -> Vec<u32> {
        let mut sessions = self.sessions.lock();
        Self::prune_closed(&mut sessions);
        let mut ids: Vec<u32> = sessions
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Open(_)))
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    fn with_session<T>(
        &self,
        camera_id: u32,
        f: impl FnOnce(&CameraSession) -> T,
    ) -> Result<T, VisionError> {
        let sessions = self.sessions.lock();
        match sessions.get(&camera_id) {
            Some(Slot::Open(session)) => Ok(f(session)),
            _ => Err(VisionError::NotOpen(camera_id)),
        }
    }

    pub fn latest_frame(&self, camera_id: u32) -> Result<LatestFrame, VisionError> {
        self.with_session(camera_id, |s| s.latest_frame())
    }

    pub fn subscribe_frames(&self, camera_id: u32) -> Result<watch::Receiver<LatestFrame>, VisionError> {
        self.with_session(camera_id, |s| s.subscribe_frames())
    }

    pub fn set_render_size(&self, camera_id: u32, size: RenderSize) -> Result<(), VisionError> {
        self.with_session(camera_id, |s| s.set_render_size(size))?
    }

    pub fn session_state(&self, camera_id: u32) -> SessionState {
        self.with_session(camera_id, |s| s.state())
            .unwrap_or(SessionState::Closed)
    }

    pub fn session_stats(&self, camera_id: u32) -> Result<SessionStatsSnapshot, VisionError> {
        self.with_session(camera_id, |s| s.stats())
    }

    /// Scan for cameras; ids of open sessions are reported without probing
    pub async fn discover(&self) -> Result<Vec<u32>, VisionError> {
        let in_use: Vec<u32> = self.sessions.lock().keys().copied().collect();
        discover_cameras(
            self.provider.clone(),
            self.config.max_index,
            self.config.request_format,
            in_use,
        )
        .await
    }
}
