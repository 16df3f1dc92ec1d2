//! Presentation boundary

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, trace, warn};
use vigil_eye::FrameBuffer;
use vigil_sc::{EmotionSlot, EMOTION_SLOTS};

/// Emotion bar heights in [0, 100], slot order
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EmotionBars(pub [f32; EMOTION_SLOTS]);

impl EmotionBars {
    pub fn get(&self, slot: EmotionSlot) -> f32 {
        self.0[slot.index()]
    }

    /// `(slot name, value)` pairs in display order
    pub fn labelled(&self) -> impl Iterator<Item = (&'static str, f32)> + '_ {
        EmotionSlot::ALL.iter().map(move |slot| (slot.name(), self.get(*slot)))
    }
}

/// Receives everything the dashboard displays.
///
/// Called from the display pump task; implementations should return quickly.
#[async_trait]
pub trait PresentationSink: Send + Sync {
    /// Smoothed emotion bars, once per emotion tick
    async fn emotions(&self, bars: EmotionBars);

    /// A new scaled frame for `camera_id`
    async fn frame(&self, camera_id: u32, frame: Arc<FrameBuffer>);

    /// `camera_id` was closed because its processor or device failed
    async fn disconnected(&self, camera_id: u32, reason: &str);
}

/// Sink that only logs; used when running headless
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl PresentationSink for LogSink {
    async fn emotions(&self, bars: EmotionBars) {
        trace!(
            sad = bars.get(EmotionSlot::Sad),
            neutral = bars.get(EmotionSlot::Neutral),
            angry = bars.get(EmotionSlot::Angry),
            happy = bars.get(EmotionSlot::Happy),
            other = bars.get(EmotionSlot::Other),
            "emotions"
        );
    }

    async fn frame(&self, camera_id: u32, frame: Arc<FrameBuffer>) {
        debug!("Camera {}: {}x{} frame", camera_id, frame.width(), frame.height());
    }

    async fn disconnected(&self, camera_id: u32, reason: &str) {
        warn!("Camera {} disconnected: {}", camera_id, reason);
    }
}
