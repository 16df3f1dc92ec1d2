//! vigil-dash: Dashboard assembly
//!
//! Wires the audio worker, the camera manager and the display pump together
//! behind a single configuration file.

pub mod error;
pub mod config;
pub mod sink;
pub mod pump;
pub mod runtime;
pub mod telemetry;

pub use error::DashError;
pub use config::{DashboardConfig, DisplayConfig};
pub use sink::{EmotionBars, LogSink, PresentationSink};
pub use pump::{DisplayPump, PumpHandle};
pub use runtime::{build_classifier, start_audio, AudioRuntime, Dashboard};
