//! ClickRenderer - sample-accurate playback of scheduled clicks
//!
//! The scheduler queues clicks on the [`StreamClock`] ahead of time; the
//! output callback drains them here and starts each one on the exact frame of
//! its scheduled time. After every buffer the shared frame counter advances,
//! which is what `StreamClock::now()` reads.
//!
//! Real-time safety: no allocation, no locks, only an SPSC pop per frame
//! while idle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rtrb::Consumer;

use super::click::{seconds_to_frame, ClickSamples};
use crate::clock::{ScheduledClick, StreamClock};

/// A click currently sounding.
#[derive(Debug, Clone, Copy)]
struct Voice {
    accent: bool,
    position: usize,
}

pub struct ClickRenderer {
    clicks: Consumer<ScheduledClick>,
    samples: ClickSamples,
    sample_rate: u32,
    frame_counter: Arc<AtomicU64>,
    /// Next queued click as (start frame, accent)
    pending: Option<(u64, bool)>,
    voice: Option<Voice>,
}

impl ClickRenderer {
    pub fn new(
        clicks: Consumer<ScheduledClick>,
        sample_rate: u32,
        frame_counter: Arc<AtomicU64>,
    ) -> Self {
        Self {
            clicks,
            samples: ClickSamples::new(sample_rate),
            sample_rate: sample_rate.max(1),
            frame_counter,
            pending: None,
            voice: None,
        }
    }

    /// Renderer driving `clock`, fed by the consumer `StreamClock::new` returned.
    pub fn for_clock(clock: &StreamClock, clicks: Consumer<ScheduledClick>) -> Self {
        Self::new(clicks, clock.sample_rate(), clock.frame_counter_ref())
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frame_counter.load(Ordering::Relaxed)
    }

    /// Fill an interleaved buffer and advance the frame counter.
    ///
    /// Every channel receives the same signal. Clicks whose start frame has
    /// already passed start immediately. Returns the number of frames written.
    pub fn render(&mut self, data: &mut [f32], channels: usize) -> usize {
        let channels = channels.max(1);
        let frame_count = data.len() / channels;
        let start = self.frame_counter.load(Ordering::Relaxed);

        for (i, frame) in data.chunks_exact_mut(channels).enumerate() {
            let frame_idx = start + i as u64;
            self.start_due_clicks(frame_idx);

            let mut sample_val = 0.0;
            if let Some(voice) = self.voice.as_mut() {
                let click = self.samples.get(voice.accent);
                if voice.position < click.len() {
                    sample_val = click[voice.position];
                    voice.position += 1;
                }
                if voice.position >= click.len() {
                    self.voice = None;
                }
            }

            frame.fill(sample_val);
        }

        self.frame_counter
            .fetch_add(frame_count as u64, Ordering::Relaxed);
        frame_count
    }

    fn start_due_clicks(&mut self, frame_idx: u64) {
        loop {
            if self.pending.is_none() {
                self.pending = self
                    .clicks
                    .pop()
                    .ok()
                    .map(|click| (seconds_to_frame(click.at, self.sample_rate), click.accent));
            }
            match self.pending {
                Some((at, accent)) if at <= frame_idx => {
                    self.voice = Some(Voice {
                        accent,
                        position: 0,
                    });
                    self.pending = None;
                }
                _ => break,
            }
        }
    }
}
