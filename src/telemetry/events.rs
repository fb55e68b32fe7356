//! Telemetry event types exposed to the CLI and to subscribers.

use serde::{Deserialize, Serialize};

use crate::analysis::TimingClassification;

/// Session and stream lifecycle stages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    SessionStarted,
    SessionStopped,
    StreamOpened,
    StreamClosed,
}

/// Metric events covering verdicts, timing error, scheduler headroom and lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MetricEvent {
    Verdict {
        hit: bool,
        classification: TimingClassification,
        timing_ms: f64,
        quality: f64,
        beat_index: usize,
    },
    TimingError {
        avg_ms: f64,
        max_ms: f64,
        sample_count: usize,
    },
    SchedulerHeadroom {
        beat_index: usize,
        headroom_ms: f64,
    },
    Lifecycle {
        phase: LifecyclePhase,
        bpm: u32,
        timestamp_ms: u64,
    },
    Error {
        code: i32,
        context: String,
    },
}
