//! Score, streak and hit/miss bookkeeping fed by timing verdicts.

use serde::{Deserialize, Serialize};

use crate::analysis::TimingVerdict;
use crate::config::ScoringConfig;

/// Outcome of applying one verdict to the board.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreUpdate {
    /// Points added (positive) or removed (negative)
    pub points: i64,
    pub score: u64,
    pub streak: u32,
    /// Timing quality of this verdict, 0-100
    pub quality: f64,
}

/// End-of-session report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub score: u64,
    pub accuracy_pct: u32,
    pub best_streak: u32,
    pub hits: u32,
    pub misses: u32,
    pub bpm: u32,
    /// Mean absolute compensated timing error of hits, in milliseconds
    pub mean_abs_timing_ms: f64,
}

#[derive(Debug, Clone)]
pub struct ScoreBoard {
    config: ScoringConfig,
    score: u64,
    hits: u32,
    misses: u32,
    streak: u32,
    best_streak: u32,
    abs_timing_sum: f64,
}

impl ScoreBoard {
    pub fn new(config: ScoringConfig) -> Self {
        Self {
            config,
            score: 0,
            hits: 0,
            misses: 0,
            streak: 0,
            best_streak: 0,
            abs_timing_sum: 0.0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.config);
    }

    /// Bonus percentage earned at a given streak length.
    pub fn streak_bonus_pct(&self, streak: u32) -> u32 {
        match streak {
            s if s >= 5 => self.config.streak5_bonus_pct,
            3 | 4 => self.config.streak3_bonus_pct,
            2 => self.config.streak2_bonus_pct,
            _ => 0,
        }
    }

    pub fn record(&mut self, verdict: &TimingVerdict, timing_window: f64) -> ScoreUpdate {
        let quality = verdict.quality(timing_window);

        let points = if verdict.hit {
            self.hits += 1;
            self.streak += 1;
            self.best_streak = self.best_streak.max(self.streak);
            self.abs_timing_sum += verdict.timing.abs();

            let bonus = self.streak_bonus_pct(self.streak) as u64;
            let earned = (self.config.hit_points as u64 * (100 + bonus) + 50) / 100;
            self.score += earned;
            earned as i64
        } else {
            self.misses += 1;
            self.streak = 0;

            let lost = (self.config.miss_penalty as u64).min(self.score);
            self.score -= lost;
            -(lost as i64)
        };

        ScoreUpdate {
            points,
            score: self.score,
            streak: self.streak,
            quality,
        }
    }

    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn hits(&self) -> u32 {
        self.hits
    }

    pub fn misses(&self) -> u32 {
        self.misses
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn best_streak(&self) -> u32 {
        self.best_streak
    }

    /// Rounded hit percentage, 0 before anything was classified.
    pub fn accuracy_pct(&self) -> u32 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0;
        }
        ((self.hits as f64 / total as f64) * 100.0).round() as u32
    }

    pub fn summary(&self, bpm: u32) -> SessionSummary {
        let mean_abs_timing_ms = if self.hits == 0 {
            0.0
        } else {
            self.abs_timing_sum / self.hits as f64 * 1000.0
        };
        SessionSummary {
            score: self.score,
            accuracy_pct: self.accuracy_pct(),
            best_streak: self.best_streak,
            hits: self.hits,
            misses: self.misses,
            bpm,
            mean_abs_timing_ms,
        }
    }
}
