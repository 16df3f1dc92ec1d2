//! Configuration for camera sessions and the frame relay

use crate::frame::{FrameFormat, RenderSize};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a session obtains its connection to the frame processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayMode {
    /// Listen on `relay_addr`; the processor connects back once per camera
    Accept,
    /// Dial the processor at `relay_addr`
    Connect,
}

/// Message framing on the relay socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// Bare frame bytes both ways
    Raw,
    /// Each message prefixed with a 4-byte big-endian length
    LengthPrefixed,
}

/// Camera and relay configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Relay address, e.g. "127.0.0.1:8080"
    pub relay_addr: String,
    pub mode: RelayMode,
    pub framing: Framing,
    /// Round trip cadence per camera
    pub frame_interval_ms: u64,
    /// Frame sent to the processor
    pub request_format: FrameFormat,
    /// Frame expected back from the processor
    pub response_format: FrameFormat,
    /// Initial render target for new sessions
    pub render_size: RenderSize,
    /// Wait for the first byte of a reply
    pub reply_timeout_ms: u64,
    /// Wait for the rest of a raw reply once it has started
    pub reply_settle_ms: u64,
    /// Accept/connect deadline when opening a session
    pub open_timeout_ms: u64,
    /// Largest length-prefixed message accepted
    pub max_message_bytes: usize,
    /// Consecutive device read failures before a session is closed
    pub max_read_failures: u32,
    /// Discovery probes indices `0..max_index`
    pub max_index: u32,
    /// Program and arguments launched per opened camera before accepting.
    /// `{camera_id}` and `{addr}` are substituted in arguments.
    pub helper_command: Option<Vec<String>>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            relay_addr: "127.0.0.1:8080".to_string(),
            mode: RelayMode::Accept,
            framing: Framing::Raw,
            frame_interval_ms: 30,
            request_format: FrameFormat::default(),
            response_format: FrameFormat::default(),
            render_size: RenderSize::default(),
            reply_timeout_ms: 5_000,
            reply_settle_ms: 250,
            open_timeout_ms: 10_000,
            max_message_bytes: 64 * 1024 * 1024,
            max_read_failures: 5,
            max_index: 10,
            helper_command: None,
        }
    }
}

impl CameraConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    pub fn reply_settle(&self) -> Duration {
        Duration::from_millis(self.reply_settle_ms)
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.relay_addr.trim().is_empty() {
            return Err("Relay address cannot be empty".to_string());
        }
        match self.relay_addr.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {}
            _ => {
                return Err(format!(
                    "Relay address '{}' must be host:port",
                    self.relay_addr
                ))
            }
        }

        if self.frame_interval_ms == 0 || self.frame_interval_ms > 10_000 {
            return Err("Frame interval must be between 1 and 10000 ms".to_string());
        }

        self.request_format
            .validate()
            .map_err(|e| format!("Request format: {}", e))?;
        self.response_format
            .validate()
            .map_err(|e| format!("Response format: {}", e))?;
        self.render_size.validate()?;

        if self.request_format.channels != 3 {
            return Err("Request frames are RGB (3 channels)".to_string());
        }

        if self.reply_timeout_ms == 0 || self.reply_settle_ms == 0 || self.open_timeout_ms == 0 {
            return Err("Timeouts must be greater than 0".to_string());
        }

        let largest = self
            .request_format
            .byte_len()
            .unwrap_or(usize::MAX)
            .max(self.response_format.byte_len().unwrap_or(usize::MAX));
        if self.framing == Framing::LengthPrefixed {
            if self.max_message_bytes < largest {
                return Err(format!(
                    "max_message_bytes ({}) is smaller than a frame ({})",
                    self.max_message_bytes, largest
                ));
            }
            if largest > u32::MAX as usize {
                return Err("Frames too large for a 4-byte length prefix".to_string());
            }
        }

        if self.max_read_failures == 0 {
            return Err("max_read_failures must be at least 1".to_string());
        }

        if self.max_index == 0 || self.max_index > 100 {
            return Err("Discovery max_index must be between 1 and 100".to_string());
        }

        if let Some(ref command) = self.helper_command {
            match command.first() {
                Some(program) if !program.trim().is_empty() => {}
                _ => return Err("Helper command needs a program".to_string()),
            }
            if command.iter().any(|arg| arg.contains('\0')) {
                return Err("Helper command contains null byte".to_string());
            }
        }

        Ok(())
    }
}
