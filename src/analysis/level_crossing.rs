use serde::{Deserialize, Serialize};

use crate::config::OnsetDetectionConfig;

/// A candidate onset handed to the accuracy engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OnsetCandidate {
    /// Audio clock time in seconds
    pub detected_time: f64,
    /// RMS level that triggered the detection
    pub level: f32,
}

/// One RMS measurement of an input block, stamped with audio clock time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelFrame {
    pub rms: f32,
    pub time: f64,
}

/// Root-mean-square level of a block of samples.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Rising-edge level detector with a refractory gap.
///
/// A frame produces an onset when its level rises through `threshold` and at
/// least `debounce` seconds have passed since the last accepted onset.
#[derive(Debug)]
pub struct LevelCrossingDetector {
    prev_rms: f32,
    last_onset_time: Option<f64>,
    threshold: f32,
    debounce_s: f64,
}

impl LevelCrossingDetector {
    pub fn new(threshold: f32, debounce_ms: u64) -> Self {
        Self {
            prev_rms: 0.0,
            last_onset_time: None,
            threshold,
            debounce_s: debounce_ms as f64 / 1000.0,
        }
    }

    pub fn from_config(config: &OnsetDetectionConfig) -> Self {
        Self::new(config.threshold, config.debounce_ms)
    }

    /// Reset internal state (e.g. when a new session starts)
    pub fn reset(&mut self) {
        self.prev_rms = 0.0;
        self.last_onset_time = None;
    }

    pub fn last_onset_time(&self) -> Option<f64> {
        self.last_onset_time
    }

    pub fn process(&mut self, frame: LevelFrame) -> Option<OnsetCandidate> {
        // Check debounce
        if let Some(last) = self.last_onset_time {
            if frame.time - last < self.debounce_s {
                self.prev_rms = frame.rms;
                return None;
            }
        }

        let crossed = self.prev_rms < self.threshold && frame.rms >= self.threshold;
        self.prev_rms = frame.rms;

        if crossed {
            self.last_onset_time = Some(frame.time);
            Some(OnsetCandidate {
                detected_time: frame.time,
                level: frame.rms,
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(rms: f32, time: f64) -> LevelFrame {
        LevelFrame { rms, time }
    }

    #[test]
    fn test_rms() {
        assert_eq!(rms(&[]), 0.0);
        assert!((rms(&[0.5, -0.5, 0.5, -0.5]) - 0.5).abs() < 1e-6);
        assert!((rms(&[1.0, 0.0]) - (0.5f32).sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_rising_edge_detection() {
        let mut detector = LevelCrossingDetector::new(0.05, 100);

        // Below threshold
        assert!(detector.process(frame(0.01, 1.0)).is_none());

        // Crossing
        let onset = detector.process(frame(0.2, 1.02)).expect("onset");
        assert_eq!(onset.detected_time, 1.02);
        assert_eq!(onset.level, 0.2);

        // Staying loud is not a new onset
        assert!(detector.process(frame(0.3, 1.2)).is_none());
    }

    #[test]
    fn test_debounce_gap() {
        let mut detector = LevelCrossingDetector::new(0.05, 100);
        assert!(detector.process(frame(0.2, 1.0)).is_some());

        // Drop and rise again inside the refractory gap
        assert!(detector.process(frame(0.01, 1.03)).is_none());
        assert!(detector.process(frame(0.2, 1.06)).is_none());

        // Gap expired, quiet first to re-arm the edge
        assert!(detector.process(frame(0.01, 1.15)).is_none());
        assert!(detector.process(frame(0.2, 1.2)).is_some());
        assert_eq!(detector.last_onset_time(), Some(1.2));
    }

    #[test]
    fn test_reset_clears_history() {
        let mut detector = LevelCrossingDetector::from_config(&OnsetDetectionConfig::default());
        assert!(detector.process(frame(0.5, 2.0)).is_some());
        detector.reset();
        assert_eq!(detector.last_onset_time(), None);
        assert!(detector.process(frame(0.5, 2.01)).is_some());
    }
}
