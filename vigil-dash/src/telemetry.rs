//! tracing-subscriber setup

use crate::error::DashError;
use tracing_subscriber::EnvFilter;
use vigil_core::LogConfig;

/// Filter from `RUST_LOG` when set, otherwise from the configured level
pub fn env_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.to_ascii_lowercase()))
}

/// Install the global subscriber
pub fn init(config: &LogConfig) -> Result<(), DashError> {
    let filter = env_filter(config);

    let result = if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .try_init()
    };

    result.map_err(|e| DashError::Logging(e.to_string()))
}
