//! Camera session: capture, relay, decode and scale on a fixed cadence
//!
//! Each session owns one capture device and one processor connection and runs
//! on its own task. Only the most recent scaled frame is kept; presentation
//! reads it through a `watch` channel and never waits on the relay.

use crate::config::CameraConfig;
use crate::connector::{PeerConnector, PeerLink};
use crate::device::{CaptureDevice, DeviceProvider};
use crate::error::VisionError;
use crate::frame::{decode_frame, scale_to_fit, FrameBuffer, RenderSize};
use crate::config::Framing;
use crate::relay::RelayCodec;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::process::Child;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// How long `close` waits for the session task before aborting it
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Most recent scaled frame, `None` until the first round trip completes
pub type LatestFrame = Option<Arc<FrameBuffer>>;

type SharedDevice = Arc<Mutex<Option<Box<dyn CaptureDevice>>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Closed,
    Opening,
    Streaming,
    Closing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Closed => "closed",
            SessionState::Opening => "opening",
            SessionState::Streaming => "streaming",
            SessionState::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Session lifecycle notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Opened { camera_id: u32 },
    /// Closed on request
    Closed { camera_id: u32 },
    /// Closed because the processor connection or the device failed
    Disconnected { camera_id: u32, reason: String },
}

impl SessionEvent {
    pub fn camera_id(&self) -> u32 {
        match self {
            SessionEvent::Opened { camera_id }
            | SessionEvent::Closed { camera_id }
            | SessionEvent::Disconnected { camera_id, .. } => *camera_id,
        }
    }
}

/// Per-session counters
#[derive(Debug, Default)]
pub struct SessionStats {
    frames_relayed: AtomicU64,
    decode_failures: AtomicU64,
    device_failures: AtomicU64,
    last_frame: RwLock<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatsSnapshot {
    pub frames_relayed: u64,
    pub decode_failures: u64,
    pub device_failures: u64,
    pub last_frame: Option<DateTime<Utc>>,
}

impl SessionStats {
    pub fn snapshot(&self) -> SessionStatsSnapshot {
        SessionStatsSnapshot {
            frames_relayed: self.frames_relayed.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            device_failures: self.device_failures.load(Ordering::Relaxed),
            last_frame: *self.last_frame.read(),
        }
    }
}

/// Handle to one running camera session
pub struct CameraSession {
    camera_id: u32,
    state: Arc<RwLock<SessionState>>,
    render_size: Arc<RwLock<RenderSize>>,
    frames: watch::Receiver<LatestFrame>,
    shutdown: watch::Sender<bool>,
    device: SharedDevice,
    stats: Arc<SessionStats>,
    events: broadcast::Sender<SessionEvent>,
    task: Option<JoinHandle<()>>,
}

impl CameraSession {
    /// Connect to the processor, open the device and start streaming.
    ///
    /// Both the connection and the device must come up; otherwise whatever
    /// was acquired is dropped and the error returned.
    pub async fn open(
        camera_id: u32,
        config: Arc<CameraConfig>,
        connector: &PeerConnector,
        provider: Arc<dyn DeviceProvider>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Result<Self, VisionError> {
        config.validate().map_err(VisionError::Config)?;
        let response_len = config
            .response_format
            .byte_len()
            .ok_or_else(|| VisionError::Config("Response format overflows".to_string()))?;

        let state = Arc::new(RwLock::new(SessionState::Opening));
        info!("Opening camera {}", camera_id);

        let link = connector.establish(camera_id).await?;

        let format = config.request_format;
        let device = tokio::task::spawn_blocking(move || provider.open(camera_id, format))
            .await
            .map_err(|e| VisionError::DeviceUnavailable(format!("Camera {} open task failed: {}", camera_id, e)))??;
        let device: SharedDevice = Arc::new(Mutex::new(Some(device)));

        let (frame_tx, frames) = watch::channel(None);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let render_size = Arc::new(RwLock::new(config.render_size));
        let stats = Arc::new(SessionStats::default());

        let codec = RelayCodec {
            framing: config.framing,
            reply_timeout: config.reply_timeout(),
            reply_settle: config.reply_settle(),
            max_message_bytes: config.max_message_bytes,
        };

        let PeerLink { stream, helper } = link;
        let worker = SessionWorker {
            camera_id,
            config,
            codec,
            response_len,
            stream,
            helper,
            device: device.clone(),
            render_size: render_size.clone(),
            frame_tx,
            stats: stats.clone(),
            state: state.clone(),
        };

        *state.write() = SessionState::Streaming;
        let task = tokio::spawn(worker.run(shutdown_rx, events.clone()));
        let _ = events.send(SessionEvent::Opened { camera_id });
        info!("Camera {} streaming", camera_id);

        Ok(Self {
            camera_id,
            state,
            render_size,
            frames,
            shutdown,
            device,
            stats,
            events,
            task: Some(task),
        })
    }

    pub fn camera_id(&self) -> u32 {
        self.camera_id
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    /// Most recent scaled frame
    pub fn latest_frame(&self) -> LatestFrame {
        self.frames.borrow().clone()
    }

    pub fn subscribe_frames(&self) -> watch::Receiver<LatestFrame> {
        self.frames.clone()
    }

    pub fn render_size(&self) -> RenderSize {
        *self.render_size.read()
    }

    /// Takes effect from the next frame
    pub fn set_render_size(&self, size: RenderSize) -> Result<(), VisionError> {
        size.validate().map_err(VisionError::Config)?;
        *self.render_size.write() = size;
        Ok(())
    }

    pub fn stats(&self) -> SessionStatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop streaming, cancel any in-flight round trip, release the device
    /// and close the connection
    pub async fn close(mut self) {
        self.stop().await;
    }

    async fn stop(&mut self) {
        let task = match self.task.take() {
            Some(task) => task,
            None => return,
        };

        {
            let mut state = self.state.write();
            if *state != SessionState::Closed {
                *state = SessionState::Closing;
            }
        }
        let _ = self.shutdown.send(true);

        let mut task = task;
        if timeout(CLOSE_TIMEOUT, &mut task).await.is_err() {
            warn!("Camera {} did not stop within {:?}, aborting", self.camera_id, CLOSE_TIMEOUT);
            task.abort();
            // A read stuck in the driver keeps the device locked; it is released once the read returns
            let _ = spawn_release(&self.device);
            *self.state.write() = SessionState::Closed;
            let _ = self.events.send(SessionEvent::Closed {
                camera_id: self.camera_id,
            });
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        // The task cleans up after itself once signalled
        let _ = self.shutdown.send(true);
    }
}

fn spawn_release(device: &SharedDevice) -> JoinHandle<()> {
    let device = device.clone();
    tokio::task::spawn_blocking(move || {
        if let Some(mut device) = device.lock().take() {
            device.release();
        }
    })
}

async fn release_device(device: &SharedDevice) {
    let _ = spawn_release(device).await;
}

/// State owned by the session task
struct SessionWorker {
    camera_id: u32,
    config: Arc<CameraConfig>,
    codec: RelayCodec,
    response_len: usize,
    stream: TcpStream,
    helper: Option<Child>,
    device: SharedDevice,
    render_size: Arc<RwLock<RenderSize>>,
    frame_tx: watch::Sender<LatestFrame>,
    stats: Arc<SessionStats>,
    state: Arc<RwLock<SessionState>>,
}

impl SessionWorker {
    async fn run(mut self, mut shutdown: watch::Receiver<bool>, events: broadcast::Sender<SessionEvent>) {
        let mut ticker = interval(self.config.frame_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut read_failures = 0u32;

        // None: closed on request; Some(reason): lost
        let disconnect: Option<String> = loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break None,
                _ = ticker.tick() => {}
            }

            let result = tokio::select! {
                biased;
                _ = shutdown.changed() => break None,
                result = self.round_trip() => result,
            };

            match result {
                Ok(frame) => {
                    read_failures = 0;
                    self.stats.frames_relayed.fetch_add(1, Ordering::Relaxed);
                    *self.stats.last_frame.write() = Some(Utc::now());
                    self.frame_tx.send_replace(Some(frame));
                }
                Err(e) if e.is_frame_error() => {
                    self.stats.decode_failures.fetch_add(1, Ordering::Relaxed);
                    warn!("Camera {}: dropping frame: {}", self.camera_id, e);
                }
                Err(e) if e.is_device_error() => {
                    self.stats.device_failures.fetch_add(1, Ordering::Relaxed);
                    read_failures += 1;
                    if read_failures >= self.config.max_read_failures {
                        error!("Camera {} failed {} reads in a row: {}", self.camera_id, read_failures, e);
                        break Some(e.to_string());
                    }
                    warn!("Camera {} read failed: {}", self.camera_id, e);
                }
                Err(e) => {
                    error!("Camera {} lost its processor: {}", self.camera_id, e);
                    break Some(e.to_string());
                }
            }
        };

        self.teardown().await;

        let event = match disconnect {
            Some(reason) => SessionEvent::Disconnected {
                camera_id: self.camera_id,
                reason,
            },
            None => SessionEvent::Closed {
                camera_id: self.camera_id,
            },
        };
        info!("Camera {} closed", self.camera_id);
        let _ = events.send(event);
    }

    /// Capture one frame, relay it and publish the scaled reply
    async fn round_trip(&mut self) -> Result<Arc<FrameBuffer>, VisionError> {
        let device = self.device.clone();
        let raw = tokio::task::spawn_blocking(move || match device.lock().as_mut() {
            Some(device) => device.read_frame(),
            None => Err(VisionError::DeviceUnavailable("Camera released".to_string())),
        })
        .await
        .map_err(|e| VisionError::Capture(format!("Capture task failed: {}", e)))??;

        if raw.format() != self.config.request_format {
            return Err(VisionError::Capture(format!(
                "Camera produced a {} frame, expected {}",
                raw.format(),
                self.config.request_format
            )));
        }

        if self.codec.framing == Framing::Raw {
            let stale = self.codec.discard_pending(&mut self.stream).await?;
            if stale > 0 {
                self.stats.decode_failures.fetch_add(1, Ordering::Relaxed);
                warn!("Camera {}: discarded {} stale reply bytes", self.camera_id, stale);
            }
        }

        self.codec.write_frame(&mut self.stream, raw.data()).await?;
        let reply = self.codec.read_frame(&mut self.stream, self.response_len).await?;
        debug!("Camera {}: {} byte reply", self.camera_id, reply.len());

        let decoded = decode_frame(self.config.response_format, reply)?;
        let target = *self.render_size.read();
        let scaled = tokio::task::spawn_blocking(move || scale_to_fit(&decoded, target))
            .await
            .map_err(|e| VisionError::Image(format!("Scale task failed: {}", e)))??;

        Ok(Arc::new(scaled))
    }

    async fn teardown(&mut self) {
        *self.state.write() = SessionState::Closing;

        let _ = self.stream.shutdown().await;
        release_device(&self.device).await;
        if let Some(mut helper) = self.helper.take() {
            let _ = helper.start_kill();
            let _ = helper.wait().await;
        }

        *self.state.write() = SessionState::Closed;
    }
}
