// Analysis module - onset detection and timing classification
//
// Architecture:
// - Input callback: computes one RMS LevelFrame per block, pushes to LEVEL_QUEUE
// - OnsetWorker thread: LevelFrame -> LevelCrossingDetector -> OnsetCandidate
// - Candidates go to the session, whose AccuracyEngine classifies them
//   against the beat log

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rtrb::Consumer;

use crate::config::OnsetDetectionConfig;

pub mod accuracy;
pub mod level_crossing;

pub use accuracy::{
    classify, quality, AccuracyCursor, AccuracyEngine, TimingClassification, TimingVerdict,
};
pub use level_crossing::{rms, LevelCrossingDetector, LevelFrame, OnsetCandidate};

/// Receives each accepted onset candidate on the worker thread.
pub type OnsetSink = Box<dyn FnMut(OnsetCandidate) + Send>;

/// Worker draining level frames and emitting onset candidates.
pub struct OnsetWorker {
    frames: Consumer<LevelFrame>,
    detector: LevelCrossingDetector,
    running: Arc<AtomicBool>,
    sink: OnsetSink,
    frames_processed: u64,
}

impl OnsetWorker {
    pub fn new(
        frames: Consumer<LevelFrame>,
        config: &OnsetDetectionConfig,
        running: Arc<AtomicBool>,
        sink: OnsetSink,
    ) -> Self {
        Self {
            frames,
            detector: LevelCrossingDetector::from_config(config),
            running,
            sink,
            frames_processed: 0,
        }
    }

    /// Process every queued frame. Returns the number of onsets emitted.
    pub fn drain(&mut self) -> usize {
        let mut emitted = 0;
        while let Ok(frame) = self.frames.pop() {
            self.frames_processed += 1;
            if let Some(candidate) = self.detector.process(frame) {
                tracing::debug!(
                    "[OnsetWorker] Onset at {:.3}s (rms {:.3})",
                    candidate.detected_time,
                    candidate.level
                );
                (self.sink)(candidate);
                emitted += 1;
            }
        }
        emitted
    }

    /// Run until the running flag clears and the queue is empty.
    pub fn run(mut self) {
        tracing::info!("[OnsetWorker] Starting onset loop");
        loop {
            match self.frames.peek() {
                Ok(_) => {
                    self.drain();
                }
                Err(_) => {
                    // Check shutdown flag only when queue is empty
                    if !self.running.load(Ordering::SeqCst) {
                        tracing::info!(
                            "[OnsetWorker] Stopped after {} frames",
                            self.frames_processed
                        );
                        break;
                    }
                    // Small sleep to avoid busy loop when empty
                    thread::sleep(Duration::from_millis(1));
                }
            }
        }
    }
}

/// Spawn the onset worker on its own thread.
pub fn spawn_onset_thread(
    frames: Consumer<LevelFrame>,
    config: OnsetDetectionConfig,
    running: Arc<AtomicBool>,
    sink: OnsetSink,
) -> JoinHandle<()> {
    thread::spawn(move || {
        OnsetWorker::new(frames, &config, running, sink).run();
    })
}
