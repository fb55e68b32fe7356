//! Append-only log of scheduled beat times for one practice session.

use std::sync::{Arc, RwLock};

/// Log shared between the scheduler (single writer) and the accuracy engine.
pub type SharedBeatLog = Arc<RwLock<BeatTimeLog>>;

/// Strictly increasing sequence of beat times in seconds.
///
/// Indices are 0-based and are the unit the accuracy cursor walks. Entries are
/// never mutated; the log only grows during a session and is cleared when the
/// next session starts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BeatTimeLog {
    times: Vec<f64>,
}

impl BeatTimeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedBeatLog {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Append a beat time. Non-finite or non-increasing times are rejected and
    /// leave the log unchanged.
    pub fn push(&mut self, time: f64) -> bool {
        if !time.is_finite() {
            return false;
        }
        if let Some(&last) = self.times.last() {
            if time <= last {
                return false;
            }
        }
        self.times.push(time);
        true
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.times
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.times.get(index).copied()
    }

    pub fn last(&self) -> Option<f64> {
        self.times.last().copied()
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn clear(&mut self) {
        self.times.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_keeps_strict_order() {
        let mut log = BeatTimeLog::new();
        assert!(log.push(1.0));
        assert!(log.push(1.5));
        assert!(!log.push(1.5), "equal time must be rejected");
        assert!(!log.push(1.2), "earlier time must be rejected");
        assert!(log.push(2.0));
        assert_eq!(log.as_slice(), &[1.0, 1.5, 2.0]);
    }

    #[test]
    fn push_rejects_non_finite() {
        let mut log = BeatTimeLog::new();
        assert!(!log.push(f64::NAN));
        assert!(!log.push(f64::INFINITY));
        assert!(log.is_empty());
    }

    #[test]
    fn clear_resets_for_next_session() {
        let mut log = BeatTimeLog::new();
        log.push(3.0);
        log.clear();
        assert!(log.is_empty());
        assert!(log.push(0.5), "a cleared log accepts earlier times again");
        assert_eq!(log.last(), Some(0.5));
        assert_eq!(log.get(1), None);
    }
}
