use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rtrb::{Consumer, Producer, RingBuffer};

use super::{AudioClock, ScheduledClick};

/// Capacity of the click queue. At 200 BPM and a 100ms look-ahead the
/// scheduler holds at most one click in flight, so this is ample.
pub const CLICK_QUEUE_CAPACITY: usize = 64;

/// Clock derived from the output stream's frame counter.
///
/// The output callback owns the other half of the click queue (see
/// [`crate::audio::ClickRenderer`]) and advances the shared frame counter after
/// every buffer, so `now()` is sample-accurate playback time.
pub struct StreamClock {
    frame_counter: Arc<AtomicU64>,
    sample_rate: u32,
    closed: AtomicBool,
    clicks: Mutex<Producer<ScheduledClick>>,
}

impl StreamClock {
    /// Create the clock plus the consumer end of its click queue.
    pub fn new(sample_rate: u32) -> (Self, Consumer<ScheduledClick>) {
        let (producer, consumer) = RingBuffer::new(CLICK_QUEUE_CAPACITY);
        let clock = Self {
            frame_counter: Arc::new(AtomicU64::new(0)),
            sample_rate: sample_rate.max(1),
            closed: AtomicBool::new(false),
            clicks: Mutex::new(producer),
        };
        (clock, consumer)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Shared frame counter the output callback must advance.
    pub fn frame_counter_ref(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.frame_counter)
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl AudioClock for StreamClock {
    fn now(&self) -> f64 {
        self.frame_counter.load(Ordering::Relaxed) as f64 / self.sample_rate as f64
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn schedule_click(&self, click: ScheduledClick) {
        let mut producer = match self.clicks.lock() {
            Ok(producer) => producer,
            Err(poisoned) => poisoned.into_inner(),
        };
        if producer.push(click).is_err() {
            log::warn!("[StreamClock] Click queue full, dropping click at {:.3}s", click.at);
        }
    }
}
