//! vigil-core: shared building blocks for the vigil dashboard crates.
//!
//! Holds the workspace-wide error type and the multi-format configuration
//! loader used by every component config.

pub mod error;
pub mod config;

pub use error::{Error, Result};
pub use config::{ConfigError, LogConfig};
