//! Click synthesis - decaying sine clicks for the metronome
//!
//! Key features:
//! - Accent click on beat 1 of each bar (1000 Hz), regular clicks 800 Hz
//! - Gain starts at 1.0 and decays exponentially to 0.001 over 50ms
//! - Pure functions, deterministic output, generated once per stream

use std::f32::consts::TAU;

/// Duration of a metronome click in seconds
pub const CLICK_DURATION_S: f64 = 0.05;

/// Pitch of the first beat of each bar
pub const ACCENT_FREQUENCY_HZ: f32 = 1000.0;

/// Pitch of every other beat
pub const REGULAR_FREQUENCY_HZ: f32 = 800.0;

/// Gain reached at the end of the click
const DECAY_FLOOR: f32 = 0.001;

/// Generates one click: a sine at `frequency` under an exponential decay.
///
/// # Arguments
/// * `sample_rate` - Sample rate in Hz (typically 48000)
/// * `frequency` - Pitch of the click in Hz
///
/// # Returns
/// Exactly 50ms of mono samples in range [-1.0, 1.0]
pub fn generate_click(sample_rate: u32, frequency: f32) -> Vec<f32> {
    let sample_rate = sample_rate.max(1) as f32;
    let num_samples = (sample_rate * CLICK_DURATION_S as f32) as usize;
    let duration = CLICK_DURATION_S as f32;

    (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate;
            let gain = DECAY_FLOOR.powf(t / duration);
            (TAU * frequency * t).sin() * gain
        })
        .collect()
}

/// Converts a clock time in seconds to the nearest frame index.
#[inline]
pub fn seconds_to_frame(seconds: f64, sample_rate: u32) -> u64 {
    if seconds <= 0.0 || !seconds.is_finite() {
        return 0;
    }
    (seconds * sample_rate as f64).round() as u64
}

/// Pre-generated accent and regular clicks for one sample rate.
#[derive(Debug, Clone)]
pub struct ClickSamples {
    accent: Vec<f32>,
    regular: Vec<f32>,
}

impl ClickSamples {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            accent: generate_click(sample_rate, ACCENT_FREQUENCY_HZ),
            regular: generate_click(sample_rate, REGULAR_FREQUENCY_HZ),
        }
    }

    pub fn get(&self, accent: bool) -> &[f32] {
        if accent {
            &self.accent
        } else {
            &self.regular
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_click_duration() {
        for &sr in &[44100, 48000, 96000] {
            let click = generate_click(sr, ACCENT_FREQUENCY_HZ);
            let expected = (sr as f32 * 0.05) as usize;
            assert_eq!(click.len(), expected, "Click should be 50ms at {} Hz", sr);
        }
    }

    #[test]
    fn test_click_range_and_decay() {
        let click = generate_click(48000, REGULAR_FREQUENCY_HZ);

        for &sample in &click {
            assert!((-1.0..=1.0).contains(&sample));
        }

        // Peak of the first and last 5ms
        let head = click[..240].iter().fold(0.0f32, |m, s| m.max(s.abs()));
        let tail = click[click.len() - 240..]
            .iter()
            .fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(head > 0.5, "head peak {}", head);
        assert!(tail < 0.01, "tail peak {}", tail);
    }

    #[test]
    fn test_click_deterministic() {
        assert_eq!(generate_click(48000, 800.0), generate_click(48000, 800.0));
    }

    #[test]
    fn test_accent_differs_from_regular() {
        let samples = ClickSamples::new(48000);
        assert_eq!(samples.get(true).len(), samples.get(false).len());
        assert_ne!(samples.get(true), samples.get(false));
    }

    #[test]
    fn test_seconds_to_frame() {
        assert_eq!(seconds_to_frame(0.5, 48000), 24000);
        assert_eq!(seconds_to_frame(0.1, 44100), 4410);
        assert_eq!(seconds_to_frame(-1.0, 48000), 0);
        assert_eq!(seconds_to_frame(f64::NAN, 48000), 0);
    }
}
