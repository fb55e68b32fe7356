//! Configuration management for practice sessions
//!
//! This module provides runtime configuration loading from JSON files so
//! tempo, tolerance and latency defaults can be tuned without recompiling.
//! Every section has a `Default` and a missing or broken file never stops a
//! session from starting.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

pub const MIN_BPM: u32 = 40;
pub const MAX_BPM: u32 = 200;
pub const MIN_TIMING_WINDOW_S: f64 = 0.05;
pub const MAX_TIMING_WINDOW_S: f64 = 0.5;
pub const MAX_LATENCY_COMPENSATION_S: f64 = 0.5;
const MAX_TIME_SIGNATURE: u32 = 16;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub practice: PracticeConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub onset_detection: OnsetDetectionConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
}

/// User-facing practice parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PracticeConfig {
    /// Beats per minute (40-200)
    pub bpm: u32,
    /// Beats per bar
    pub time_signature: u32,
    /// Half-width of the hit window in seconds
    pub timing_window_s: f64,
    /// Fixed input-to-detection delay subtracted from every onset, in seconds
    pub latency_compensation_s: f64,
}

impl Default for PracticeConfig {
    fn default() -> Self {
        Self {
            bpm: 120,
            time_signature: 4,
            timing_window_s: 0.2,
            latency_compensation_s: 0.13,
        }
    }
}

impl PracticeConfig {
    /// Check every field against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_BPM..=MAX_BPM).contains(&self.bpm) {
            return Err(ConfigError::BpmOutOfRange { bpm: self.bpm });
        }
        if !(1..=MAX_TIME_SIGNATURE).contains(&self.time_signature) {
            return Err(ConfigError::TimeSignatureOutOfRange {
                beats: self.time_signature,
            });
        }
        if !(MIN_TIMING_WINDOW_S..=MAX_TIMING_WINDOW_S).contains(&self.timing_window_s) {
            return Err(ConfigError::TimingWindowOutOfRange {
                seconds: self.timing_window_s,
            });
        }
        if !(0.0..=MAX_LATENCY_COMPENSATION_S).contains(&self.latency_compensation_s) {
            return Err(ConfigError::LatencyOutOfRange {
                seconds: self.latency_compensation_s,
            });
        }
        Ok(())
    }

    /// Copy with every field forced into range. NaN falls back to the default.
    pub fn clamped(&self) -> Self {
        let defaults = Self::default();
        let clamp_f64 = |value: f64, min: f64, max: f64, fallback: f64| {
            if value.is_nan() {
                fallback
            } else {
                value.clamp(min, max)
            }
        };

        Self {
            bpm: self.bpm.clamp(MIN_BPM, MAX_BPM),
            time_signature: self.time_signature.clamp(1, MAX_TIME_SIGNATURE),
            timing_window_s: clamp_f64(
                self.timing_window_s,
                MIN_TIMING_WINDOW_S,
                MAX_TIMING_WINDOW_S,
                defaults.timing_window_s,
            ),
            latency_compensation_s: clamp_f64(
                self.latency_compensation_s,
                0.0,
                MAX_LATENCY_COMPENSATION_S,
                defaults.latency_compensation_s,
            ),
        }
    }
}

/// Look-ahead scheduler constants (not exposed to users)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How far past `now` each housekeeping pass schedules beats
    pub look_ahead_s: f64,
    /// Period of the housekeeping pass
    pub housekeeping_interval_ms: u64,
    /// Offset of the first beat from the clock time at start
    pub lead_in_s: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            look_ahead_s: 0.1,
            housekeeping_interval_ms: 25,
            lead_in_s: 0.1,
        }
    }
}

impl SchedulerConfig {
    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_millis(self.housekeeping_interval_ms.max(1))
    }
}

/// Energy-threshold onset detector parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OnsetDetectionConfig {
    /// RMS level a block must rise to for an onset
    pub threshold: f32,
    /// Refractory gap after an accepted onset
    pub debounce_ms: u64,
    /// Samples per RMS block
    pub window_size: usize,
}

impl Default for OnsetDetectionConfig {
    fn default() -> Self {
        Self {
            // Sensitivity 0.5 mapped onto RMS as sensitivity / 10
            threshold: 0.05,
            debounce_ms: 100,
            window_size: 1024,
        }
    }
}

/// Points and streak bonus tiers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub hit_points: u32,
    /// Bonus percentage once the streak reaches 2
    pub streak2_bonus_pct: u32,
    /// Bonus percentage once the streak reaches 3
    pub streak3_bonus_pct: u32,
    /// Bonus percentage once the streak reaches 5
    pub streak5_bonus_pct: u32,
    /// Points removed per miss (score never drops below zero)
    pub miss_penalty: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            hit_points: 10,
            streak2_bonus_pct: 10,
            streak3_bonus_pct: 20,
            streak5_bonus_pct: 50,
            miss_penalty: 0,
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// Missing sections take their defaults. If the file doesn't exist or the
    /// JSON is invalid the full default config is returned.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    pub fn load() -> Self {
        Self::load_from_file("assets/beattime_config.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.practice.bpm, 120);
        assert_eq!(config.practice.time_signature, 4);
        assert_eq!(config.practice.timing_window_s, 0.2);
        assert_eq!(config.practice.latency_compensation_s, 0.13);
        assert_eq!(config.scheduler.housekeeping_interval_ms, 25);
        assert_eq!(config.onset_detection.debounce_ms, 100);
        assert_eq!(config.scoring.hit_points, 10);
        assert!(config.practice.validate().is_ok());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = AppConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.practice, config.practice);
        assert_eq!(parsed.scheduler, config.scheduler);
    }

    #[test]
    fn test_partial_json_uses_section_defaults() {
        let json = r#"{ "practice": { "bpm": 90, "time_signature": 3,
            "timing_window_s": 0.1, "latency_compensation_s": 0.0 } }"#;
        let parsed: AppConfig = serde_json::from_str(json).unwrap();

        assert_eq!(parsed.practice.bpm, 90);
        assert_eq!(parsed.practice.time_signature, 3);
        assert_eq!(parsed.scheduler, SchedulerConfig::default());
        assert_eq!(parsed.scoring, ScoringConfig::default());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = AppConfig::load_from_file("/nonexistent/beattime_config.json");
        assert_eq!(config.practice, PracticeConfig::default());
    }

    #[test]
    fn test_bundled_config_matches_defaults() {
        let config = AppConfig::load_from_file(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/assets/beattime_config.json"
        ));
        assert_eq!(config.practice, PracticeConfig::default());
        assert_eq!(config.scheduler, SchedulerConfig::default());
        assert_eq!(config.onset_detection, OnsetDetectionConfig::default());
        assert_eq!(config.scoring, ScoringConfig::default());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut config = PracticeConfig {
            bpm: 300,
            ..PracticeConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::BpmOutOfRange { bpm: 300 }));

        config.bpm = 120;
        config.timing_window_s = 0.6;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TimingWindowOutOfRange { .. })
        ));

        config.timing_window_s = 0.2;
        config.latency_compensation_s = -0.01;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::LatencyOutOfRange { .. })
        ));

        config.latency_compensation_s = 0.1;
        config.time_signature = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TimeSignatureOutOfRange { beats: 0 })
        ));
    }

    #[test]
    fn test_clamped_forces_range() {
        let config = PracticeConfig {
            bpm: 10,
            time_signature: 40,
            timing_window_s: f64::NAN,
            latency_compensation_s: 2.0,
        }
        .clamped();

        assert_eq!(config.bpm, MIN_BPM);
        assert_eq!(config.time_signature, 16);
        assert_eq!(config.timing_window_s, 0.2);
        assert_eq!(config.latency_compensation_s, MAX_LATENCY_COMPENSATION_S);
        assert!(config.validate().is_ok());
    }
}
