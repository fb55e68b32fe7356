//! Accuracy engine - onset timing classification against the beat log
//!
//! Each detected onset is matched against the scheduled beat times with a
//! forward-only cursor:
//! - compensated onset time = detected time - latency compensation
//! - scan from the cursor; the first beat within ±window is a hit and the
//!   cursor moves past it, so no beat can be matched twice
//! - an onset too early for the beat under the cursor is a miss anchored to
//!   that beat (the beat stays available)
//! - an onset late for every remaining beat is a miss with infinite timing
//!
//! The scan is only correct because the beat log is strictly ascending.
//! `classify` never fails: malformed input degrades to a miss.

use serde::{Deserialize, Serialize};

use crate::config::PracticeConfig;

/// Forward-only position in the beat log.
///
/// `last_beat_index` never decreases within a session. Every beat before it
/// has been matched or skipped and is never revisited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccuracyCursor {
    pub last_beat_index: usize,
}

impl AccuracyCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.last_beat_index = 0;
    }
}

/// Result of classifying one onset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimingVerdict {
    pub hit: bool,
    /// Compensated timing error in seconds (negative = early, positive = late)
    pub timing: f64,
    /// Uncompensated timing error in seconds
    pub raw_timing: f64,
    /// Beat log index this verdict is anchored to. For a hit this is the
    /// cursor's new value (matched index + 1).
    pub beat_index: usize,
}

/// Display classification for feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimingClassification {
    /// Hit within a tenth of the window of the beat
    OnTime,
    /// Before the beat (hit or miss)
    Early,
    /// After the beat (hit or miss)
    Late,
    /// No beat to compare against
    Unmatched,
}

/// Fraction of the window treated as on-time for display purposes.
const ON_TIME_FRACTION: f64 = 0.1;

impl TimingVerdict {
    fn unmatched(cursor: usize) -> Self {
        Self {
            hit: false,
            timing: f64::INFINITY,
            raw_timing: f64::INFINITY,
            beat_index: cursor,
        }
    }

    pub fn is_unmatched(&self) -> bool {
        !self.timing.is_finite()
    }

    pub fn timing_ms(&self) -> f64 {
        self.timing * 1000.0
    }

    /// Timing quality in percent, see [`quality`]. Misses score 0.
    pub fn quality(&self, timing_window: f64) -> f64 {
        if self.hit {
            quality(self.timing, timing_window)
        } else {
            0.0
        }
    }

    pub fn classification(&self, timing_window: f64) -> TimingClassification {
        if self.is_unmatched() {
            TimingClassification::Unmatched
        } else if self.hit && self.timing.abs() <= timing_window * ON_TIME_FRACTION {
            TimingClassification::OnTime
        } else if self.timing < 0.0 {
            TimingClassification::Early
        } else {
            TimingClassification::Late
        }
    }
}

/// Linear timing quality: 100 at perfect timing falling to 0 at the window
/// edge. Not used for hit/miss decisions.
pub fn quality(timing: f64, timing_window: f64) -> f64 {
    if !timing.is_finite() || timing_window.is_nan() || timing_window <= 0.0 {
        return 0.0;
    }
    (100.0 * (1.0 - timing.abs() / timing_window)).max(0.0)
}

/// Classify one onset against `beat_times` starting at `cursor`.
///
/// The cursor only advances on a hit. Ties resolve to the earliest
/// unconsumed beat and the window edge counts as a hit.
pub fn classify(
    detected_time: f64,
    beat_times: &[f64],
    cursor: &mut AccuracyCursor,
    latency_compensation: f64,
    timing_window: f64,
) -> TimingVerdict {
    let start = cursor.last_beat_index;
    let malformed = !detected_time.is_finite()
        || !latency_compensation.is_finite()
        || !timing_window.is_finite()
        || timing_window < 0.0
        || start > beat_times.len();
    if malformed {
        tracing::debug!(detected_time, start, "malformed onset input, treating as miss");
        return TimingVerdict::unmatched(start);
    }

    let compensated = detected_time - latency_compensation;

    for (i, &beat_time) in beat_times.iter().enumerate().skip(start) {
        let timing = compensated - beat_time;
        let raw_timing = detected_time - beat_time;

        if timing.abs() <= timing_window {
            cursor.last_beat_index = i + 1;
            return TimingVerdict {
                hit: true,
                timing,
                raw_timing,
                beat_index: i + 1,
            };
        }

        if compensated < beat_time - timing_window {
            // Too early for this beat and, the log being ascending, for
            // every later beat too
            return TimingVerdict {
                hit: false,
                timing,
                raw_timing,
                beat_index: i,
            };
        }
    }

    TimingVerdict::unmatched(start)
}

/// Owns the cursor and the tolerance settings for one session.
#[derive(Debug, Clone)]
pub struct AccuracyEngine {
    cursor: AccuracyCursor,
    latency_compensation: f64,
    timing_window: f64,
}

impl AccuracyEngine {
    pub fn new(latency_compensation: f64, timing_window: f64) -> Self {
        Self {
            cursor: AccuracyCursor::new(),
            latency_compensation,
            timing_window,
        }
    }

    pub fn from_config(config: &PracticeConfig) -> Self {
        Self::new(config.latency_compensation_s, config.timing_window_s)
    }

    pub fn classify(&mut self, detected_time: f64, beat_times: &[f64]) -> TimingVerdict {
        classify(
            detected_time,
            beat_times,
            &mut self.cursor,
            self.latency_compensation,
            self.timing_window,
        )
    }

    pub fn cursor(&self) -> AccuracyCursor {
        self.cursor
    }

    pub fn timing_window(&self) -> f64 {
        self.timing_window
    }

    pub fn latency_compensation(&self) -> f64 {
        self.latency_compensation
    }

    /// Start-of-session reset.
    pub fn reset(&mut self) {
        self.cursor.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: [f64; 3] = [1.0, 1.5, 2.0];
    const EPS: f64 = 1e-9;

    fn run(detected: f64, cursor: usize, latency: f64, window: f64) -> (TimingVerdict, usize) {
        let mut c = AccuracyCursor {
            last_beat_index: cursor,
        };
        let verdict = classify(detected, &LOG, &mut c, latency, window);
        (verdict, c.last_beat_index)
    }

    #[test]
    fn test_hit_slightly_late() {
        // Beat 1.0 is more than a window away, so the scan moves on to 1.5
        let (verdict, cursor) = run(1.51, 0, 0.0, 0.2);
        assert!(verdict.hit);
        assert!((verdict.timing - 0.01).abs() < EPS);
        assert_eq!(verdict.beat_index, 2);
        assert_eq!(cursor, 2);
    }

    #[test]
    fn test_window_edge_is_inclusive() {
        // |1.3 - 1.5| == 0.2 sits on the window edge
        let (verdict, cursor) = run(1.3, 0, 0.0, 0.2);
        assert!(verdict.hit);
        assert!((verdict.timing + 0.2).abs() < EPS);
        assert_eq!(verdict.beat_index, 2);
        assert_eq!(cursor, 2);

        // Exactly representable edge: 0.25 early of 1.5 with a 0.25 window
        let (verdict, cursor) = run(1.25, 1, 0.0, 0.25);
        assert!(verdict.hit);
        assert_eq!(verdict.timing, -0.25);
        assert_eq!(cursor, 2);
    }

    #[test]
    fn test_early_before_first_beat() {
        let (verdict, cursor) = run(0.5, 0, 0.0, 0.2);
        assert!(!verdict.hit);
        assert_eq!(verdict.beat_index, 0);
        assert!((verdict.timing + 0.5).abs() < EPS);
        assert_eq!(cursor, 0, "early miss must not consume the beat");
    }

    #[test]
    fn test_after_all_beats_consumed() {
        let (verdict, cursor) = run(5.0, 3, 0.0, 0.2);
        assert!(!verdict.hit);
        assert_eq!(verdict.timing, f64::INFINITY);
        assert_eq!(verdict.beat_index, 3);
        assert_eq!(cursor, 3);
        assert!(verdict.is_unmatched());
    }

    #[test]
    fn test_latency_compensation() {
        let (verdict, cursor) = run(1.63, 0, 0.13, 0.2);
        assert!(verdict.hit);
        assert!((verdict.raw_timing - 0.13).abs() < EPS);
        assert!(verdict.timing.abs() < EPS);
        assert_eq!(cursor, 2);
        assert!(verdict.quality(0.2) > 99.9);
    }

    #[test]
    fn test_late_onsets_skip_to_later_beat() {
        // Beat 1.0 is long gone; scan continues to 2.0
        let (verdict, cursor) = run(2.05, 0, 0.0, 0.2);
        assert!(verdict.hit);
        assert_eq!(verdict.beat_index, 3);
        assert_eq!(cursor, 3);
    }

    #[test]
    fn test_between_beats_is_miss_anchored_to_next() {
        // 1.25 is 0.25 late of 1.0 and 0.25 early of 1.5, window 0.2
        let (verdict, cursor) = run(1.25, 0, 0.0, 0.2);
        assert!(!verdict.hit);
        assert_eq!(verdict.beat_index, 1);
        assert!((verdict.timing + 0.25).abs() < EPS);
        assert_eq!(cursor, 0);
    }

    #[test]
    fn test_overlapping_windows_prefer_earliest_beat() {
        // With a 0.3 window, 1.25 is inside both 1.0 and 1.5
        let (verdict, _) = run(1.25, 0, 0.0, 0.3);
        assert!(verdict.hit);
        assert_eq!(verdict.beat_index, 1);
        assert!((verdict.timing - 0.25).abs() < EPS);
    }

    #[test]
    fn test_no_double_match() {
        let mut cursor = AccuracyCursor::new();
        let first = classify(1.01, &LOG, &mut cursor, 0.0, 0.2);
        let second = classify(1.02, &LOG, &mut cursor, 0.0, 0.2);
        assert!(first.hit);
        assert_eq!(first.beat_index, 1);
        // Beat 0 is consumed; 1.02 is too early for 1.5
        assert!(!second.hit);
        assert_eq!(second.beat_index, 1);
    }

    #[test]
    fn test_malformed_inputs_are_misses() {
        for (detected, cursor, latency, window) in [
            (f64::NAN, 0, 0.0, 0.2),
            (1.0, 0, f64::NAN, 0.2),
            (1.0, 0, 0.0, f64::NAN),
            (1.0, 0, 0.0, -0.1),
            (1.0, 7, 0.0, 0.2),
            (f64::INFINITY, 0, 0.0, 0.2),
        ] {
            let (verdict, after) = run(detected, cursor, latency, window);
            assert!(!verdict.hit);
            assert_eq!(verdict.timing, f64::INFINITY);
            assert_eq!(verdict.beat_index, cursor);
            assert_eq!(after, cursor);
        }
    }

    #[test]
    fn test_empty_log() {
        let mut cursor = AccuracyCursor::new();
        let verdict = classify(1.0, &[], &mut cursor, 0.13, 0.2);
        assert!(!verdict.hit);
        assert!(verdict.is_unmatched());
        assert_eq!(verdict.beat_index, 0);
    }

    #[test]
    fn test_compensation_symmetry() {
        let latency = 0.13;
        let mut cursor = AccuracyCursor::new();
        for detected in [0.7, 1.1, 1.2, 1.64, 1.9, 2.1] {
            let verdict = classify(detected, &LOG, &mut cursor, latency, 0.2);
            if !verdict.is_unmatched() {
                assert!((verdict.raw_timing - verdict.timing - latency).abs() < EPS);
            }
        }
    }

    #[test]
    fn test_quality_falloff() {
        assert_eq!(quality(0.0, 0.2), 100.0);
        assert!((quality(0.1, 0.2) - 50.0).abs() < EPS);
        assert!((quality(-0.1, 0.2) - 50.0).abs() < EPS);
        assert_eq!(quality(0.2, 0.2), 0.0);
        assert_eq!(quality(0.5, 0.2), 0.0);
        assert_eq!(quality(f64::INFINITY, 0.2), 0.0);
        assert_eq!(quality(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_classification_labels() {
        let hit = |timing: f64| TimingVerdict {
            hit: true,
            timing,
            raw_timing: timing,
            beat_index: 1,
        };
        assert_eq!(hit(0.01).classification(0.2), TimingClassification::OnTime);
        assert_eq!(hit(-0.15).classification(0.2), TimingClassification::Early);
        assert_eq!(hit(0.15).classification(0.2), TimingClassification::Late);
        assert_eq!(
            TimingVerdict::unmatched(0).classification(0.2),
            TimingClassification::Unmatched
        );
    }

    #[test]
    fn test_engine_tracks_cursor_and_resets() {
        let mut engine = AccuracyEngine::new(0.0, 0.2);
        assert!(engine.classify(1.0, &LOG).hit);
        assert!(engine.classify(1.5, &LOG).hit);
        assert_eq!(engine.cursor().last_beat_index, 2);

        engine.reset();
        assert_eq!(engine.cursor().last_beat_index, 0);
    }

    #[test]
    fn test_engine_from_config_defaults() {
        let engine = AccuracyEngine::from_config(&PracticeConfig::default());
        assert_eq!(engine.timing_window(), 0.2);
        assert_eq!(engine.latency_compensation(), 0.13);
    }
}
