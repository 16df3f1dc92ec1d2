//! vigil-sc: Sound capture and emotion inference
//!
//! Provides the audio half of the dashboard:
//! - Microphone capture of fixed-length mono clips (cpal backend)
//! - Classifier boundary with temperature-scaled softmax
//! - Validated label → emotion slot permutation
//! - Long-lived background capture loop publishing the raw emotion vector
//! - Exponential smoothing of the raw vector for display

pub mod error;
pub mod config;
pub mod emotion;
pub mod classifier;
pub mod audio_capture;
pub mod capture_loop;
pub mod smoother;
#[cfg(feature = "onnx")]
pub mod onnx;

pub use error::AudioError;
pub use config::AudioConfig;
pub use emotion::{default_label_table, EmotionSlot, EmotionVector, LabelPermutation, EMOTION_SLOTS};
pub use classifier::{Classifier, DEFAULT_CLASSIFIER_LABELS, LabelScore, LogitModel, SoftmaxClassifier, SOFTMAX_TEMPERATURE};
pub use audio_capture::{default_source, list_devices, AudioSource};
pub use capture_loop::{AudioCaptureLoop, AudioWorkerHandle, CaptureStats, CaptureStatsSnapshot};
pub use smoother::{smooth, EmotionSmoother};
#[cfg(feature = "onnx")]
pub use onnx::OnnxLogitModel;
