// Session error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Session error code constants
///
/// Error code range: 1001-1005
pub struct SessionErrorCodes;

impl SessionErrorCodes {
    /// BPM value is outside the practice range (40-200)
    pub const BPM_INVALID: i32 = 1001;

    /// Scheduler is running and the request needs it idle
    pub const ALREADY_RUNNING: i32 = 1002;

    /// Scheduler is idle and the request needs it running
    pub const NOT_RUNNING: i32 = 1003;

    /// Audio clock was closed before or during the session
    pub const CLOCK_CLOSED: i32 = 1004;

    /// Mutex/RwLock was poisoned
    pub const LOCK_POISONED: i32 = 1005;
}

/// Log a session error with structured context
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_session_error(err: &SessionError, context: &str) {
    error!(
        "Session error in {}: code={}, component=BeatScheduler, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Session lifecycle errors
///
/// Returned by the scheduler and practice session instead of panicking. A
/// failed `start` leaves everything idle with nothing scheduled.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// BPM value is outside the practice range
    BpmInvalid { bpm: u32 },

    /// Scheduler is already running
    AlreadyRunning,

    /// Scheduler is not running
    NotRunning,

    /// Audio clock is closed
    ClockClosed,

    /// Mutex/RwLock was poisoned
    LockPoisoned { component: String },
}

impl ErrorCode for SessionError {
    fn code(&self) -> i32 {
        match self {
            SessionError::BpmInvalid { .. } => SessionErrorCodes::BPM_INVALID,
            SessionError::AlreadyRunning => SessionErrorCodes::ALREADY_RUNNING,
            SessionError::NotRunning => SessionErrorCodes::NOT_RUNNING,
            SessionError::ClockClosed => SessionErrorCodes::CLOCK_CLOSED,
            SessionError::LockPoisoned { .. } => SessionErrorCodes::LOCK_POISONED,
        }
    }

    fn message(&self) -> String {
        match self {
            SessionError::BpmInvalid { bpm } => {
                format!("BPM must be between 40 and 200 (got {})", bpm)
            }
            SessionError::AlreadyRunning => {
                "Metronome already running. Call stop() first.".to_string()
            }
            SessionError::NotRunning => "Metronome not running. Call start() first.".to_string(),
            SessionError::ClockClosed => "Audio clock is closed".to_string(),
            SessionError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SessionError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for SessionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_codes() {
        assert_eq!(
            SessionError::BpmInvalid { bpm: 0 }.code(),
            SessionErrorCodes::BPM_INVALID
        );
        assert_eq!(
            SessionError::AlreadyRunning.code(),
            SessionErrorCodes::ALREADY_RUNNING
        );
        assert_eq!(SessionError::NotRunning.code(), SessionErrorCodes::NOT_RUNNING);
        assert_eq!(SessionError::ClockClosed.code(), SessionErrorCodes::CLOCK_CLOSED);
        assert_eq!(
            SessionError::LockPoisoned {
                component: "test".to_string()
            }
            .code(),
            SessionErrorCodes::LOCK_POISONED
        );
    }

    #[test]
    fn test_session_error_messages() {
        let err = SessionError::BpmInvalid { bpm: 300 };
        assert_eq!(err.message(), "BPM must be between 40 and 200 (got 300)");

        let err = SessionError::AlreadyRunning;
        assert!(err.message().contains("already running"));

        let err = SessionError::ClockClosed;
        assert!(err.message().contains("closed"));
    }

    #[test]
    fn test_session_error_display() {
        let err = SessionError::NotRunning;
        let display = format!("{}", err);
        assert!(display.contains("SessionError"));
        assert!(display.contains(&err.code().to_string()));
    }

    #[test]
    fn test_error_propagation() {
        fn may_fail() -> Result<(), SessionError> {
            Err(SessionError::ClockClosed)
        }

        fn caller() -> Result<(), SessionError> {
            may_fail()?;
            Ok(())
        }

        assert_eq!(caller(), Err(SessionError::ClockClosed));
    }
}
