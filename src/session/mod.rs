// PracticeSession: wires clock, scheduler, beat log, accuracy engine and scoreboard
//
// Single Responsibility: practice session lifecycle (start/tick/stop) and onset reporting
//
// Concurrency:
// - All mutable session state lives in one SessionCore behind a Mutex
// - The housekeeping pass is a tokio interval task that locks the core per pass
// - stop() aborts the task, then marks the scheduler Idle under the core lock,
//   so no beat is scheduled after stop() returns
// - Beats and verdicts are fanned out on tokio broadcast channels
// - The user beat callback runs after the core lock is released, so it may
//   call back into the session

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, RwLockReadGuard, TryLockError};

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::analysis::{AccuracyEngine, OnsetCandidate, TimingClassification, TimingVerdict};
use crate::clock::AudioClock;
use crate::config::AppConfig;
use crate::error::{log_config_error, ErrorCode, SessionError};
use crate::scheduler::{BeatCallback, BeatEvent, BeatScheduler, BeatTimeLog, SharedBeatLog};
use crate::scoring::{ScoreBoard, SessionSummary};
use crate::telemetry::{self, LifecyclePhase};

/// Capacity of the beat and verdict broadcast channels.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A classified onset together with the running score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VerdictEvent {
    pub verdict: TimingVerdict,
    pub classification: TimingClassification,
    /// Timing quality, 0-100
    pub quality: f64,
    /// Points gained or lost by this verdict
    pub points: i64,
    pub score: u64,
    pub streak: u32,
}

/// Mutable state of one practice session. Only ever touched under the lock.
struct SessionCore {
    scheduler: BeatScheduler,
    accuracy: AccuracyEngine,
    scoreboard: ScoreBoard,
    log: SharedBeatLog,
}

fn lock_core(core: &Mutex<SessionCore>) -> MutexGuard<'_, SessionCore> {
    match core.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("[PracticeSession] Session lock poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// Beats queued under the core lock for the user callback.
struct BeatDispatch {
    pending: Mutex<VecDeque<BeatEvent>>,
    on_beat: Mutex<BeatCallback>,
}

impl BeatDispatch {
    fn new(on_beat: BeatCallback) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            on_beat: Mutex::new(on_beat),
        }
    }

    fn push(&self, event: BeatEvent) {
        self.lock_pending().push_back(event);
    }

    fn pop(&self) -> Option<BeatEvent> {
        self.lock_pending().pop_front()
    }

    /// Hand queued beats to the callback in order.
    ///
    /// Only one caller delivers at a time. A call that finds delivery in
    /// progress, including one made from inside the callback, returns at once
    /// and leaves its beats to the active deliverer.
    fn deliver(&self) {
        loop {
            let mut on_beat = match self.on_beat.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => return,
            };
            while let Some(event) = self.pop() {
                (*on_beat)(event);
            }
            drop(on_beat);

            // A beat queued after the drain but before the unlock is ours
            if self.lock_pending().is_empty() {
                return;
            }
        }
    }

    fn lock_pending(&self) -> MutexGuard<'_, VecDeque<BeatEvent>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn deliver_beats(dispatch: &Option<Arc<BeatDispatch>>) {
    if let Some(dispatch) = dispatch {
        dispatch.deliver();
    }
}

/// One look-ahead pass under the core lock.
///
/// # Returns
/// * `(scheduled, running)` - Beats scheduled by this pass and whether the
///   scheduler is still running afterwards
fn run_pass(core: &Mutex<SessionCore>) -> (usize, bool) {
    let mut core = lock_core(core);
    let was_running = core.scheduler.is_running();
    let scheduled = core.scheduler.tick();
    let running = core.scheduler.is_running();
    if was_running && !running {
        // The scheduler stopped itself after its clock closed
        record_session_end(&core);
    }
    (scheduled, running)
}

/// Publish the stop lifecycle event and log the final summary.
fn record_session_end(core: &SessionCore) -> SessionSummary {
    let bpm = core.scheduler.bpm();
    let summary = core.scoreboard.summary(bpm);
    telemetry::hub().record_lifecycle(LifecyclePhase::SessionStopped, bpm);
    log::info!(
        "[PracticeSession] Stopped: score={} accuracy={}% hits={} misses={}",
        summary.score,
        summary.accuracy_pct,
        summary.hits,
        summary.misses
    );
    summary
}

fn read_log(log: &SharedBeatLog) -> RwLockReadGuard<'_, BeatTimeLog> {
    match log.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("[PracticeSession] Beat log lock poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// One practice session: metronome scheduling plus onset scoring.
///
/// Every public method takes `&self`, so a session can be shared between the
/// housekeeping task, the onset worker and the UI behind an `Arc`.
///
/// # Example
/// ```ignore
/// let session = PracticeSession::new(AppConfig::default());
/// let clock = Arc::new(ManualClock::new(0.0));
/// assert!(session.start(120, clock.clone()));
/// clock.advance(0.5);
/// session.tick();
/// let verdict = session.report_onset(0.73);
/// let summary = session.stop();
/// ```
pub struct PracticeSession {
    config: AppConfig,
    core: Arc<Mutex<SessionCore>>,
    beat_tx: broadcast::Sender<BeatEvent>,
    verdict_tx: broadcast::Sender<VerdictEvent>,
    dispatch: Option<Arc<BeatDispatch>>,
    housekeeping: Mutex<Option<JoinHandle<()>>>,
}

impl PracticeSession {
    /// Create an idle session.
    ///
    /// Out-of-range practice settings are logged and clamped, never rejected.
    pub fn new(config: AppConfig) -> Self {
        Self::build(config, None)
    }

    /// Create an idle session that also calls `on_beat` for every beat and
    /// for the stop sentinel.
    ///
    /// Beats reach `on_beat` in order, right after the pass (or `stop`) that
    /// produced them releases the session lock. The callback may therefore
    /// use the session, including `stop`.
    pub fn with_beat_callback(config: AppConfig, on_beat: BeatCallback) -> Self {
        Self::build(config, Some(on_beat))
    }

    fn build(mut config: AppConfig, on_beat: Option<BeatCallback>) -> Self {
        if let Err(err) = config.practice.validate() {
            log_config_error(&err, "PracticeSession::new");
            config.practice = config.practice.clamped();
        }

        let (beat_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (verdict_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let log = BeatTimeLog::shared();
        let dispatch = on_beat.map(|on_beat| Arc::new(BeatDispatch::new(on_beat)));
        let queue = dispatch.clone();
        let beat_sender = beat_tx.clone();
        let callback: BeatCallback = Box::new(move |event| {
            if let Some(queue) = queue.as_ref() {
                queue.push(event);
            }
            // No subscribers is fine
            let _ = beat_sender.send(event);
        });

        let scheduler = BeatScheduler::new(
            config.scheduler,
            config.practice.time_signature,
            Arc::clone(&log),
            callback,
        );

        let core = SessionCore {
            scheduler,
            accuracy: AccuracyEngine::from_config(&config.practice),
            scoreboard: ScoreBoard::new(config.scoring),
            log,
        };

        Self {
            config,
            core: Arc::new(Mutex::new(core)),
            beat_tx,
            verdict_tx,
            dispatch,
            housekeeping: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Start (or restart) the session at `bpm` against `clock`.
    ///
    /// Clears the beat log, the accuracy cursor and the scoreboard. When called
    /// inside a tokio runtime the periodic housekeeping pass is spawned on it;
    /// otherwise the caller drives the session with [`PracticeSession::tick`].
    ///
    /// # Returns
    /// * `true` - Session is running
    /// * `false` - BPM out of range or clock closed; the session stays idle
    ///   (or keeps running unchanged if it already was)
    pub fn start(&self, bpm: u32, clock: Arc<dyn AudioClock>) -> bool {
        {
            let mut core = lock_core(&self.core);
            if let Err(err) = core.scheduler.start(bpm, clock) {
                telemetry::hub().record_error(err.code(), "PracticeSession::start");
                return false;
            }
            core.accuracy.reset();
            core.scoreboard.reset();
        }

        telemetry::hub().record_lifecycle(LifecyclePhase::SessionStarted, bpm);
        self.spawn_housekeeping();
        true
    }

    /// Run one look-ahead pass by hand. Returns the number of beats scheduled.
    pub fn tick(&self) -> usize {
        let (scheduled, _) = run_pass(&self.core);
        deliver_beats(&self.dispatch);
        scheduled
    }

    /// Stop the session and return its summary.
    ///
    /// The stop sentinel is emitted once, on the Running -> Idle transition.
    /// Calling `stop` on an idle session only returns the last summary.
    pub fn stop(&self) -> SessionSummary {
        self.abort_housekeeping();

        let summary = {
            let mut core = lock_core(&self.core);
            let was_running = core.scheduler.is_running();
            core.scheduler.stop();
            if was_running {
                record_session_end(&core)
            } else {
                core.scoreboard.summary(core.scheduler.bpm())
            }
        };
        deliver_beats(&self.dispatch);
        summary
    }

    /// Classify one detected onset against the beats scheduled so far.
    ///
    /// # Arguments
    /// * `detected_time` - Audio clock time of the onset in seconds, before
    ///   latency compensation
    ///
    /// # Returns
    /// * `Some(verdict)` - The onset was classified and scored
    /// * `None` - The session is idle
    pub fn report_onset(&self, detected_time: f64) -> Option<TimingVerdict> {
        let mut guard = lock_core(&self.core);
        let core = &mut *guard;
        if !core.scheduler.is_running() {
            tracing::debug!(detected_time, "onset while idle ignored");
            return None;
        }

        let verdict = {
            let log = read_log(&core.log);
            core.accuracy.classify(detected_time, log.as_slice())
        };
        let window = core.accuracy.timing_window();
        let update = core.scoreboard.record(&verdict, window);

        telemetry::hub().record_verdict(&verdict, window, update.quality);
        let _ = self.verdict_tx.send(VerdictEvent {
            verdict,
            classification: verdict.classification(window),
            quality: update.quality,
            points: update.points,
            score: update.score,
            streak: update.streak,
        });

        Some(verdict)
    }

    /// Classify an onset produced by the level-crossing detector.
    pub fn report_candidate(&self, candidate: OnsetCandidate) -> Option<TimingVerdict> {
        self.report_onset(candidate.detected_time)
    }

    /// Change the tempo for the next `start`. Refused while running.
    pub fn set_bpm(&self, bpm: u32) -> Result<(), SessionError> {
        lock_core(&self.core).scheduler.set_bpm(bpm)
    }

    pub fn bpm(&self) -> u32 {
        lock_core(&self.core).scheduler.bpm()
    }

    pub fn is_running(&self) -> bool {
        lock_core(&self.core).scheduler.is_running()
    }

    /// Beat-in-bar of the most recently scheduled beat, 0 when idle.
    pub fn current_beat(&self) -> u32 {
        lock_core(&self.core).scheduler.current_beat()
    }

    /// Copy of the beat times scheduled in this session.
    pub fn beat_log(&self) -> Vec<f64> {
        let core = lock_core(&self.core);
        let log = read_log(&core.log);
        log.as_slice().to_vec()
    }

    pub fn score(&self) -> u64 {
        lock_core(&self.core).scoreboard.score()
    }

    /// Summary of the session so far, without stopping it.
    pub fn summary(&self) -> SessionSummary {
        let core = lock_core(&self.core);
        core.scoreboard.summary(core.scheduler.bpm())
    }

    pub fn subscribe_beats(&self) -> broadcast::Receiver<BeatEvent> {
        self.beat_tx.subscribe()
    }

    pub fn subscribe_verdicts(&self) -> broadcast::Receiver<VerdictEvent> {
        self.verdict_tx.subscribe()
    }

    /// Whether a housekeeping task is currently attached.
    pub fn has_housekeeping_task(&self) -> bool {
        self.lock_housekeeping()
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    fn spawn_housekeeping(&self) {
        let Ok(handle) = Handle::try_current() else {
            log::debug!("[PracticeSession] No tokio runtime, housekeeping is driven by tick()");
            return;
        };

        let core = Arc::clone(&self.core);
        let dispatch = self.dispatch.clone();
        let period = self.config.scheduler.housekeeping_interval();
        let task = handle.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let (_, running) = run_pass(&core);
                deliver_beats(&dispatch);
                if !running {
                    break;
                }
            }
            tracing::debug!("housekeeping task finished");
        });

        if let Some(previous) = self.lock_housekeeping().replace(task) {
            previous.abort();
        }
    }

    fn abort_housekeeping(&self) {
        if let Some(task) = self.lock_housekeeping().take() {
            task.abort();
        }
    }

    fn lock_housekeeping(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.housekeeping
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for PracticeSession {
    fn drop(&mut self) {
        self.abort_housekeeping();
    }
}
