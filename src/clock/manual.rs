use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use super::{AudioClock, ScheduledClick};

/// Deterministic clock advanced by hand.
///
/// Used by tests, the `simulate` CLI command and anywhere a session has to run
/// without audio hardware. Scheduled clicks are recorded instead of played.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_bits: AtomicU64,
    closed: AtomicBool,
    clicks: Mutex<Vec<ScheduledClick>>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            now_bits: AtomicU64::new(start.to_bits()),
            closed: AtomicBool::new(false),
            clicks: Mutex::new(Vec::new()),
        }
    }

    pub fn set(&self, seconds: f64) {
        self.now_bits.store(seconds.to_bits(), Ordering::SeqCst);
    }

    /// Move the clock forward and return the new time.
    pub fn advance(&self, seconds: f64) -> f64 {
        let next = self.now() + seconds.max(0.0);
        self.set(next);
        next
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Clicks scheduled so far, in scheduling order.
    pub fn scheduled_clicks(&self) -> Vec<ScheduledClick> {
        match self.clicks.lock() {
            Ok(clicks) => clicks.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AudioClock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.now_bits.load(Ordering::SeqCst))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn schedule_click(&self, click: ScheduledClick) {
        match self.clicks.lock() {
            Ok(mut clicks) => clicks.push(click),
            Err(poisoned) => poisoned.into_inner().push(click),
        }
    }
}
