// Configuration error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Configuration error code constants
///
/// Error code range: 2001-2004
pub struct ConfigErrorCodes;

impl ConfigErrorCodes {
    pub const BPM_OUT_OF_RANGE: i32 = 2001;
    pub const TIME_SIGNATURE_OUT_OF_RANGE: i32 = 2002;
    pub const TIMING_WINDOW_OUT_OF_RANGE: i32 = 2003;
    pub const LATENCY_OUT_OF_RANGE: i32 = 2004;
}

/// Log a configuration error with structured context
pub fn log_config_error(err: &ConfigError, context: &str) {
    error!(
        "Config error in {}: code={}, component=PracticeConfig, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Practice configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    BpmOutOfRange { bpm: u32 },
    TimeSignatureOutOfRange { beats: u32 },
    TimingWindowOutOfRange { seconds: f64 },
    LatencyOutOfRange { seconds: f64 },
}

impl ErrorCode for ConfigError {
    fn code(&self) -> i32 {
        match self {
            ConfigError::BpmOutOfRange { .. } => ConfigErrorCodes::BPM_OUT_OF_RANGE,
            ConfigError::TimeSignatureOutOfRange { .. } => {
                ConfigErrorCodes::TIME_SIGNATURE_OUT_OF_RANGE
            }
            ConfigError::TimingWindowOutOfRange { .. } => {
                ConfigErrorCodes::TIMING_WINDOW_OUT_OF_RANGE
            }
            ConfigError::LatencyOutOfRange { .. } => ConfigErrorCodes::LATENCY_OUT_OF_RANGE,
        }
    }

    fn message(&self) -> String {
        match self {
            ConfigError::BpmOutOfRange { bpm } => {
                format!("BPM must be between 40 and 200 (got {})", bpm)
            }
            ConfigError::TimeSignatureOutOfRange { beats } => {
                format!("Time signature must have 1 to 16 beats (got {})", beats)
            }
            ConfigError::TimingWindowOutOfRange { seconds } => {
                format!(
                    "Timing window must be between 0.05s and 0.5s (got {:.3}s)",
                    seconds
                )
            }
            ConfigError::LatencyOutOfRange { seconds } => {
                format!(
                    "Latency compensation must be between 0s and 0.5s (got {:.3}s)",
                    seconds
                )
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConfigError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_codes() {
        assert_eq!(ConfigError::BpmOutOfRange { bpm: 10 }.code(), 2001);
        assert_eq!(ConfigError::TimeSignatureOutOfRange { beats: 0 }.code(), 2002);
        assert_eq!(
            ConfigError::TimingWindowOutOfRange { seconds: 1.0 }.code(),
            2003
        );
        assert_eq!(ConfigError::LatencyOutOfRange { seconds: -0.1 }.code(), 2004);
    }

    #[test]
    fn test_config_error_messages() {
        let err = ConfigError::TimingWindowOutOfRange { seconds: 0.75 };
        assert!(err.message().contains("0.750s"));

        let err = ConfigError::TimeSignatureOutOfRange { beats: 0 };
        assert!(err.message().contains("got 0"));
    }
}
