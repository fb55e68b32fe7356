//! BeatScheduler - look-ahead metronome scheduling
//!
//! The housekeeping pass runs on a coarse timer (25ms by default) whose
//! firing time jitters by 10-20ms. Each pass enqueues every beat that falls
//! inside the look-ahead window and asks the clock to start its click at the
//! exact beat time, so timer jitter only decides *when a click is queued*,
//! never *when it sounds*.
//!
//! State machine: Idle -> Running (`start`) -> Idle (`stop`).

use std::sync::{Arc, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::clock::{AudioClock, ScheduledClick};
use crate::config::{SchedulerConfig, MAX_BPM, MIN_BPM};
use crate::error::{log_session_error, SessionError};
use crate::telemetry;

pub mod log;

pub use self::log::{BeatTimeLog, SharedBeatLog};

/// One metronome tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeatEvent {
    /// 1..=time_signature, or 0 for the stop sentinel
    pub beat_number_in_bar: u32,
    /// Clock time in seconds at which the click starts, 0 for the stop sentinel
    pub scheduled_time: f64,
}

impl BeatEvent {
    /// Sentinel emitted once when the scheduler stops.
    pub const STOPPED: BeatEvent = BeatEvent {
        beat_number_in_bar: 0,
        scheduled_time: 0.0,
    };

    pub fn is_stop_signal(&self) -> bool {
        self.beat_number_in_bar == 0
    }

    pub fn is_downbeat(&self) -> bool {
        self.beat_number_in_bar == 1
    }
}

/// Beat notification hook, invoked synchronously inside the scheduling pass.
pub type BeatCallback = Box<dyn FnMut(BeatEvent) + Send>;

/// Scheduling timeline owned by the scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SchedulerState {
    pub next_beat_time: f64,
    pub beat_count: u64,
    pub running: bool,
}

pub struct BeatScheduler {
    config: SchedulerConfig,
    time_signature: u32,
    bpm: u32,
    state: SchedulerState,
    current_beat: u32,
    clock: Option<Arc<dyn AudioClock>>,
    log: SharedBeatLog,
    on_beat: BeatCallback,
}

impl BeatScheduler {
    pub fn new(
        config: SchedulerConfig,
        time_signature: u32,
        log: SharedBeatLog,
        on_beat: BeatCallback,
    ) -> Self {
        Self {
            config,
            time_signature: time_signature.max(1),
            bpm: 120,
            state: SchedulerState::default(),
            current_beat: 0,
            clock: None,
            log,
            on_beat,
        }
    }

    /// Start (or restart) scheduling at `bpm` against `clock`.
    ///
    /// Resets the beat counter, clears the beat log and places the first beat
    /// one lead-in after `clock.now()`. On error nothing is scheduled and the
    /// scheduler is left Idle.
    pub fn start(&mut self, bpm: u32, clock: Arc<dyn AudioClock>) -> Result<(), SessionError> {
        if !(MIN_BPM..=MAX_BPM).contains(&bpm) {
            let err = SessionError::BpmInvalid { bpm };
            log_session_error(&err, "BeatScheduler::start");
            return Err(err);
        }
        if clock.is_closed() {
            let err = SessionError::ClockClosed;
            log_session_error(&err, "BeatScheduler::start");
            return Err(err);
        }

        if self.state.running {
            ::log::info!("[BeatScheduler] Restarting while running");
        }

        let now = clock.now();
        self.bpm = bpm;
        self.current_beat = 0;
        self.state = SchedulerState {
            next_beat_time: now + self.config.lead_in_s,
            beat_count: 0,
            running: true,
        };
        self.write_log().clear();
        self.clock = Some(clock);

        ::log::info!(
            "[BeatScheduler] Started at {} BPM, first beat at {:.3}s",
            bpm,
            self.state.next_beat_time
        );
        Ok(())
    }

    /// One housekeeping pass: schedule every beat inside the look-ahead
    /// window. Returns the number of beats scheduled.
    pub fn tick(&mut self) -> usize {
        if !self.state.running {
            return 0;
        }
        let Some(clock) = self.clock.clone() else {
            return 0;
        };
        if clock.is_closed() {
            ::log::warn!("[BeatScheduler] Clock closed while running, stopping");
            self.stop();
            return 0;
        }

        let now = clock.now();
        let horizon = now + self.config.look_ahead_s;
        let seconds_per_beat = 60.0 / self.bpm as f64;
        let mut scheduled = 0;

        while self.state.next_beat_time < horizon {
            let beat_time = self.state.next_beat_time;
            let beat_in_bar = (self.state.beat_count % self.time_signature as u64) as u32 + 1;
            let event = BeatEvent {
                beat_number_in_bar: beat_in_bar,
                scheduled_time: beat_time,
            };

            // Log before notifying so no listener sees a beat the log lacks
            let index = {
                let mut log = self.write_log();
                log.push(beat_time);
                log.len()
            };
            (self.on_beat)(event);
            clock.schedule_click(ScheduledClick {
                at: beat_time,
                accent: event.is_downbeat(),
            });
            telemetry::hub().record_headroom(index.saturating_sub(1), beat_time - now);

            self.current_beat = beat_in_bar;
            self.state.next_beat_time += seconds_per_beat;
            self.state.beat_count += 1;
            scheduled += 1;
        }

        if scheduled > 0 {
            tracing::trace!(scheduled, now, next = self.state.next_beat_time, "look-ahead pass");
        }
        scheduled
    }

    /// Stop scheduling. Emits the stop sentinel once on the Running -> Idle
    /// transition; calling it again while Idle changes nothing.
    pub fn stop(&mut self) {
        if !self.state.running {
            return;
        }
        self.state.running = false;
        self.state.beat_count = 0;
        self.current_beat = 0;
        self.clock = None;
        (self.on_beat)(BeatEvent::STOPPED);
        ::log::info!("[BeatScheduler] Stopped");
    }

    /// Change the tempo used by the next `start`.
    ///
    /// Refused while running so already scheduled beats keep their spacing.
    pub fn set_bpm(&mut self, bpm: u32) -> Result<(), SessionError> {
        if self.state.running {
            return Err(SessionError::AlreadyRunning);
        }
        if !(MIN_BPM..=MAX_BPM).contains(&bpm) {
            return Err(SessionError::BpmInvalid { bpm });
        }
        self.bpm = bpm;
        Ok(())
    }

    pub fn bpm(&self) -> u32 {
        self.bpm
    }

    pub fn time_signature(&self) -> u32 {
        self.time_signature
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    /// Beat-in-bar of the most recently scheduled beat, 0 when idle.
    pub fn current_beat(&self) -> u32 {
        self.current_beat
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn log(&self) -> SharedBeatLog {
        Arc::clone(&self.log)
    }

    fn write_log(&self) -> RwLockWriteGuard<'_, BeatTimeLog> {
        match self.log.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                ::log::warn!("[BeatScheduler] Beat log lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}
