//! Starting and stopping the dashboard components

use crate::config::DashboardConfig;
use crate::error::DashError;
use crate::pump::{DisplayPump, PumpHandle};
use crate::sink::PresentationSink;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use vigil_eye::{CameraManager, DeviceProvider};
use vigil_sc::{default_source, AudioCaptureLoop, AudioConfig, AudioError, AudioWorkerHandle, Classifier, EmotionVector};

/// Running audio worker and its raw emotion feed
pub struct AudioRuntime {
    pub handle: AudioWorkerHandle,
    pub raw: watch::Receiver<EmotionVector>,
}

/// Emotion classifier for the configured model
pub fn build_classifier(config: &AudioConfig) -> Result<Box<dyn Classifier>, AudioError> {
    #[cfg(feature = "onnx")]
    {
        use vigil_sc::{OnnxLogitModel, SoftmaxClassifier};

        let model = OnnxLogitModel::load(&config.model)?.with_sample_rate(config.sample_rate);
        let classifier = if config.model.class_labels.is_empty() {
            SoftmaxClassifier::with_default_labels(model)
        } else {
            SoftmaxClassifier::new(model, config.model.class_labels.clone())?
        };
        Ok(Box::new(classifier))
    }

    #[cfg(not(feature = "onnx"))]
    {
        let _ = config;
        Err(AudioError::ClassifierFailure(
            "built without the `onnx` feature".to_string(),
        ))
    }
}

/// Start the audio worker on the platform microphone
pub fn start_audio(config: &AudioConfig) -> Result<AudioRuntime, AudioError> {
    let source = default_source(config)?;
    let classifier = build_classifier(config)?;
    let (worker, raw) = AudioCaptureLoop::new(config.clone(), source, classifier)?;
    let handle = worker.spawn()?;
    Ok(AudioRuntime { handle, raw })
}

/// Every running component of the dashboard
pub struct Dashboard {
    audio: Option<AudioRuntime>,
    cameras: Arc<CameraManager>,
    sink: Arc<dyn PresentationSink>,
    pump: PumpHandle,
}

impl Dashboard {
    /// Start the camera manager and the display pump.
    /// `audio` feeds the emotion bars when present.
    pub async fn start(
        config: &DashboardConfig,
        provider: Arc<dyn DeviceProvider>,
        sink: Arc<dyn PresentationSink>,
        audio: Option<AudioRuntime>,
    ) -> Result<Self, DashError> {
        config.validate()?;

        let cameras = Arc::new(CameraManager::new(config.cameras.clone(), provider).await?);
        if let Some(addr) = cameras.local_addr() {
            info!("Waiting for frame processors on {}", addr);
        }

        let mut pump = DisplayPump::new(config.display.clone(), config.audio.smoothing_alpha, sink.clone())
            .with_cameras(cameras.clone());
        match audio {
            Some(ref audio) => pump = pump.with_emotions(audio.raw.clone()),
            None => info!("Emotion bars disabled"),
        }

        Ok(Self {
            audio,
            cameras,
            sink,
            pump: pump.spawn(),
        })
    }

    pub fn cameras(&self) -> &Arc<CameraManager> {
        &self.cameras
    }

    /// Open each camera; a failure is shown on the sink and does not stop the rest
    pub async fn open_cameras(&self, camera_ids: &[u32]) -> Vec<u32> {
        let mut opened = Vec::new();
        for &camera_id in camera_ids {
            match self.cameras.open_camera(camera_id).await {
                Ok(()) => opened.push(camera_id),
                Err(e) => {
                    warn!("Camera {} could not be opened: {}", camera_id, e);
                    self.sink.disconnected(camera_id, &e.to_string()).await;
                }
            }
        }
        opened
    }

    /// Stop the pump, close every camera and stop the audio worker
    pub async fn shutdown(self) -> Result<(), DashError> {
        self.pump.stop().await;
        self.cameras.close_all().await;

        if let Some(audio) = self.audio {
            tokio::task::spawn_blocking(move || audio.handle.join())
                .await
                .map_err(|e| DashError::Audio(AudioError::Capture(format!("Audio shutdown failed: {}", e))))??;
        }

        info!("Dashboard stopped");
        Ok(())
    }
}
