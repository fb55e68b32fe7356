//! Audio clock abstraction shared by the scheduler and the onset path.
//!
//! Every timestamp in the practice core (scheduled beats, detected onsets)
//! is seconds on one monotonic audio clock. Wall-clock time never enters the
//! comparison.

use serde::{Deserialize, Serialize};

mod manual;
mod stream;

pub use manual::ManualClock;
pub use stream::StreamClock;

/// A click queued for playback at an exact clock instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduledClick {
    /// Clock time in seconds at which the click starts
    pub at: f64,
    /// First beat of the bar
    pub accent: bool,
}

/// Monotonic audio-rate clock that can also start sounds at future instants.
///
/// Implementations must be cheap to call from the housekeeping pass and must
/// never block on the audio thread.
pub trait AudioClock: Send + Sync {
    /// Current clock time in seconds.
    fn now(&self) -> f64;

    /// A closed clock is terminal: nothing may be scheduled on it any more.
    fn is_closed(&self) -> bool {
        false
    }

    /// Queue a click to start exactly at `click.at`.
    fn schedule_click(&self, click: ScheduledClick);
}
