// Audio device error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Audio error code constants
///
/// Error code range: 3001-3004
pub struct AudioErrorCodes;

impl AudioErrorCodes {
    /// No default input/output device available
    pub const NO_DEVICE: i32 = 3001;

    /// Failed to open audio stream
    pub const STREAM_OPEN_FAILED: i32 = 3002;

    /// Device sample format is not supported
    pub const UNSUPPORTED_FORMAT: i32 = 3003;

    /// Hardware error occurred while running
    pub const HARDWARE_ERROR: i32 = 3004;
}

/// Log an audio error with structured context
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_audio_error(err: &AudioError, context: &str) {
    error!(
        "Audio error in {}: code={}, component=AudioEngine, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Audio-related errors
///
/// These errors cover the live duplex engine: device lookup, stream
/// construction and playback start.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    /// No default device for the requested direction
    NoDevice { direction: &'static str },

    /// Failed to open audio stream
    StreamOpenFailed { reason: String },

    /// Device offers a sample format the engine does not handle
    UnsupportedFormat { format: String },

    /// Hardware error occurred
    HardwareError { details: String },
}

impl ErrorCode for AudioError {
    fn code(&self) -> i32 {
        match self {
            AudioError::NoDevice { .. } => AudioErrorCodes::NO_DEVICE,
            AudioError::StreamOpenFailed { .. } => AudioErrorCodes::STREAM_OPEN_FAILED,
            AudioError::UnsupportedFormat { .. } => AudioErrorCodes::UNSUPPORTED_FORMAT,
            AudioError::HardwareError { .. } => AudioErrorCodes::HARDWARE_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            AudioError::NoDevice { direction } => {
                format!("No default {} device found", direction)
            }
            AudioError::StreamOpenFailed { reason } => {
                format!("Failed to open audio stream: {}", reason)
            }
            AudioError::UnsupportedFormat { format } => {
                format!("Only F32 sample format is supported (device offers {})", format)
            }
            AudioError::HardwareError { details } => {
                format!("Hardware error: {}", details)
            }
        }
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AudioError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for AudioError {}

impl From<std::io::Error> for AudioError {
    fn from(err: std::io::Error) -> Self {
        AudioError::HardwareError {
            details: err.to_string(),
        }
    }
}
