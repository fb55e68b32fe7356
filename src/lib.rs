// beattime - look-ahead metronome scheduling and onset accuracy scoring
// Sample-accurate clicks on an audio clock, forward-only beat matching

// Module declarations
pub mod analysis;
pub mod audio;
pub mod clock;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod scoring;
pub mod session;
pub mod telemetry;

// Re-exports for convenience
pub use analysis::{AccuracyCursor, AccuracyEngine, OnsetCandidate, TimingClassification, TimingVerdict};
pub use clock::{AudioClock, ManualClock, ScheduledClick, StreamClock};
pub use config::AppConfig;
pub use error::{AudioError, ConfigError, ErrorCode, SessionError};
pub use scheduler::{BeatEvent, BeatScheduler, BeatTimeLog, SharedBeatLog};
pub use scoring::{ScoreBoard, SessionSummary};
pub use session::{PracticeSession, VerdictEvent};

/// Install the fmt subscriber at `level`. Later calls are no-ops.
///
/// `log` records from library code are forwarded to the same subscriber.
pub fn init_logging(level: tracing::Level) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init();
}
