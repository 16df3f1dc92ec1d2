//! Display pump: fixed-rate ticks feeding the presentation sink

use crate::config::DisplayConfig;
use crate::sink::{EmotionBars, PresentationSink};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use vigil_eye::{CameraManager, FrameBuffer, SessionEvent};
use vigil_sc::{EmotionSmoother, EmotionVector};

/// Drives the emotion smoother and copies camera frames to the sink.
///
/// Neither tick ever waits on audio capture or a relay round trip: both
/// only read the latest published value.
pub struct DisplayPump {
    config: DisplayConfig,
    smoother: EmotionSmoother,
    raw: Option<watch::Receiver<EmotionVector>>,
    cameras: Option<Arc<CameraManager>>,
    sink: Arc<dyn PresentationSink>,
}

/// Running pump; stops when `stop` is called or the handle is dropped
pub struct PumpHandle {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl DisplayPump {
    pub fn new(config: DisplayConfig, smoothing_alpha: f32, sink: Arc<dyn PresentationSink>) -> Self {
        Self {
            config,
            smoother: EmotionSmoother::new(smoothing_alpha),
            raw: None,
            cameras: None,
            sink,
        }
    }

    /// Feed emotion bars from the audio worker's raw vector
    pub fn with_emotions(mut self, raw: watch::Receiver<EmotionVector>) -> Self {
        self.raw = Some(raw);
        self
    }

    /// Feed frames and disconnects from the camera manager
    pub fn with_cameras(mut self, cameras: Arc<CameraManager>) -> Self {
        self.cameras = Some(cameras);
        self
    }

    pub fn spawn(self) -> PumpHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        PumpHandle {
            shutdown,
            task: Some(task),
        }
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut emotion_tick = interval(self.config.emotion_tick());
        emotion_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut frame_tick = interval(self.config.frame_tick());
        frame_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut events = self.cameras.as_ref().map(|c| c.subscribe_events());
        let mut delivered: HashMap<u32, Arc<FrameBuffer>> = HashMap::new();

        info!(
            "Display pump started (emotions every {:?}, frames every {:?})",
            self.config.emotion_tick(),
            self.config.frame_tick()
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = emotion_tick.tick(), if self.raw.is_some() => {
                    self.emotion_tick().await;
                }
                _ = frame_tick.tick(), if self.cameras.is_some() => {
                    self.frame_tick(&mut delivered).await;
                }
                event = recv_event(&mut events) => {
                    match event {
                        Some(SessionEvent::Disconnected { camera_id, reason }) => {
                            delivered.remove(&camera_id);
                            self.sink.disconnected(camera_id, &reason).await;
                        }
                        Some(SessionEvent::Closed { camera_id }) => {
                            delivered.remove(&camera_id);
                        }
                        Some(SessionEvent::Opened { camera_id }) => {
                            debug!("Camera {} added to display", camera_id);
                        }
                        None => events = None,
                    }
                }
            }
        }

        info!("Display pump stopped");
    }

    async fn emotion_tick(&mut self) {
        let raw = match self.raw {
            Some(ref raw) => *raw.borrow(),
            None => return,
        };
        self.smoother.tick(&raw);
        self.sink.emotions(EmotionBars(self.smoother.percentages())).await;
    }

    async fn frame_tick(&self, delivered: &mut HashMap<u32, Arc<FrameBuffer>>) {
        let cameras = match self.cameras {
            Some(ref cameras) => cameras,
            None => return,
        };

        for camera_id in cameras.open_cameras() {
            let frame = match cameras.latest_frame(camera_id) {
                Ok(Some(frame)) => frame,
                _ => continue,
            };
            if delivered
                .get(&camera_id)
                .map_or(false, |last| Arc::ptr_eq(last, &frame))
            {
                continue;
            }
            delivered.insert(camera_id, frame.clone());
            self.sink.frame(camera_id, frame).await;
        }
    }
}

/// Next session event; `None` once the channel is gone. Pends forever without cameras.
async fn recv_event(events: &mut Option<broadcast::Receiver<SessionEvent>>) -> Option<SessionEvent> {
    let receiver = match events {
        Some(receiver) => receiver,
        None => return std::future::pending().await,
    };
    loop {
        match receiver.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Display pump missed {} session events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

impl PumpHandle {
    /// Stop the pump and wait for its task
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PumpHandle {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        bars: Mutex<Vec<EmotionBars>>,
    }

    #[async_trait]
    impl PresentationSink for Recorder {
        async fn emotions(&self, bars: EmotionBars) {
            self.bars.lock().push(bars);
        }

        async fn frame(&self, _camera_id: u32, _frame: Arc<FrameBuffer>) {}

        async fn disconnected(&self, _camera_id: u32, _reason: &str) {}
    }

    #[tokio::test]
    async fn test_emotion_bars_rise_toward_raw() {
        let recorder = Arc::new(Recorder::default());
        let (raw_tx, raw_rx) = watch::channel(EmotionVector::default());
        raw_tx.send_replace(EmotionVector::new([1.0, 0.0, 0.0, 0.0, 0.5]));

        let config = DisplayConfig {
            emotion_tick_ms: 5,
            frame_tick_ms: 30,
        };
        let handle = DisplayPump::new(config, 0.02, recorder.clone())
            .with_emotions(raw_rx)
            .spawn();

        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.stop().await;

        let bars = recorder.bars.lock();
        assert!(bars.len() >= 5);
        let first = bars[0];
        let last = bars[bars.len() - 1];
        assert!((first.0[0] - 2.0).abs() < 1e-3);
        assert!(last.0[0] > first.0[0]);
        assert!(last.0[0] <= 100.0);
        assert_eq!(last.0[1], 0.0);
        assert!(last.0[4] < last.0[0]);
    }

    #[tokio::test]
    async fn test_pump_without_sources_idles_until_stopped() {
        let recorder = Arc::new(Recorder::default());
        let handle = DisplayPump::new(DisplayConfig::default(), 0.02, recorder.clone()).spawn();
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop().await;
        assert!(recorder.bars.lock().is_empty());
    }
}
