//! Long-lived audio worker: record → classify → remap → publish

use crate::audio_capture::AudioSource;
use crate::classifier::Classifier;
use crate::config::AudioConfig;
use crate::emotion::{EmotionVector, LabelPermutation};
use crate::error::AudioError;
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::RwLock;
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Audio worker counters
#[derive(Debug, Default)]
pub struct CaptureStats {
    cycles_completed: AtomicU64,
    device_failures: AtomicU64,
    classifier_failures: AtomicU64,
    last_success: RwLock<Option<DateTime<Utc>>>,
}

/// Point-in-time copy of [`CaptureStats`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureStatsSnapshot {
    pub cycles_completed: u64,
    pub device_failures: u64,
    pub classifier_failures: u64,
    pub last_success: Option<DateTime<Utc>>,
}

impl CaptureStats {
    pub fn snapshot(&self) -> CaptureStatsSnapshot {
        CaptureStatsSnapshot {
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            device_failures: self.device_failures.load(Ordering::Relaxed),
            classifier_failures: self.classifier_failures.load(Ordering::Relaxed),
            last_success: *self.last_success.read(),
        }
    }

    fn record_success(&self) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        *self.last_success.write() = Some(Utc::now());
    }
}

/// Background audio capture loop.
///
/// Owns the audio source and the classifier. The raw emotion vector is
/// published as a whole snapshot through a `watch` channel; this loop holds
/// the only sender.
pub struct AudioCaptureLoop<S, C> {
    config: Arc<AudioConfig>,
    source: S,
    classifier: C,
    permutation: LabelPermutation,
    raw_tx: watch::Sender<EmotionVector>,
    stats: Arc<CaptureStats>,
}

impl<S: AudioSource, C: Classifier> AudioCaptureLoop<S, C> {
    /// Validate the configuration and build the label permutation.
    /// Returns the loop and a receiver for the raw vector.
    pub fn new(
        config: AudioConfig,
        source: S,
        classifier: C,
    ) -> Result<(Self, watch::Receiver<EmotionVector>), AudioError> {
        config.validate().map_err(AudioError::Config)?;

        let permutation = LabelPermutation::new(classifier.labels(), &config.labels)?;
        for slot in crate::emotion::EmotionSlot::ALL {
            debug!("Emotion slot '{}' fed by classifier label '{}'", slot, permutation.label_for(slot));
        }

        let (raw_tx, raw_rx) = watch::channel(EmotionVector::default());

        Ok((
            Self {
                config: Arc::new(config),
                source,
                classifier,
                permutation,
                raw_tx,
                stats: Arc::new(CaptureStats::default()),
            },
            raw_rx,
        ))
    }

    pub fn subscribe(&self) -> watch::Receiver<EmotionVector> {
        self.raw_tx.subscribe()
    }

    pub fn stats(&self) -> Arc<CaptureStats> {
        self.stats.clone()
    }

    /// Run one capture cycle. On error the published vector is left untouched.
    pub fn run_cycle(&mut self) -> Result<EmotionVector, AudioError> {
        let sample_rate = self.config.sample_rate;
        let samples = self.source.record(self.config.clip_duration(), sample_rate)?;
        if samples.is_empty() {
            return Err(AudioError::Capture("Recorded clip is empty".to_string()));
        }

        let scores = self.classifier.classify(&samples, sample_rate)?;
        for score in &scores {
            debug!("{}: {}", score.label, score.score);
        }

        let vector = self.permutation.apply(&scores)?;
        self.raw_tx.send_replace(vector);
        Ok(vector)
    }
}

impl<S, C> AudioCaptureLoop<S, C>
where
    S: AudioSource + 'static,
    C: Classifier + 'static,
{
    /// Start the loop on its own thread
    pub fn spawn(self) -> Result<AudioWorkerHandle, AudioError> {
        let (stop_tx, stop_rx) = bounded(1);
        let stats = self.stats.clone();

        let thread = std::thread::Builder::new()
            .name("vigil-audio".to_string())
            .spawn(move || self.run(stop_rx))?;

        Ok(AudioWorkerHandle {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
            stats,
        })
    }

    fn run(mut self, stop_rx: Receiver<()>) {
        info!(
            "Audio capture loop started ({} ms clips at {} Hz)",
            self.config.clip_duration_ms, self.config.sample_rate
        );
        let retry_delay = self.config.clip_duration();

        loop {
            match stop_rx.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            let wait = match catch_unwind(AssertUnwindSafe(|| self.run_cycle())) {
                Ok(Ok(_)) => {
                    self.stats.record_success();
                    false
                }
                Ok(Err(e)) if e.is_device_failure() => {
                    self.stats.device_failures.fetch_add(1, Ordering::Relaxed);
                    warn!("Audio capture failed, retrying in {:?}: {}", retry_delay, e);
                    true
                }
                Ok(Err(e)) => {
                    self.stats.classifier_failures.fetch_add(1, Ordering::Relaxed);
                    warn!("Emotion inference failed, retrying in {:?}: {}", retry_delay, e);
                    true
                }
                Err(_) => {
                    self.stats.classifier_failures.fetch_add(1, Ordering::Relaxed);
                    error!("Audio cycle panicked, retrying in {:?}", retry_delay);
                    true
                }
            };

            if wait {
                match stop_rx.recv_timeout(retry_delay) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                }
            }
        }

        info!("Audio capture loop stopped");
    }
}

/// Handle to the running audio worker
pub struct AudioWorkerHandle {
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
    stats: Arc<CaptureStats>,
}

impl AudioWorkerHandle {
    /// Ask the worker to stop at the next cycle boundary
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.try_send(());
        }
    }

    /// Stop and wait for the worker thread.
    /// Blocks for at most one in-flight cycle.
    pub fn join(mut self) -> Result<(), AudioError> {
        self.stop();
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| AudioError::Capture("Audio worker thread panicked".to_string())),
            None => Ok(()),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    pub fn stats(&self) -> CaptureStatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for AudioWorkerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
