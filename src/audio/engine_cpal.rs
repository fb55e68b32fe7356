//! DuplexEngine - cpal full-duplex audio for live practice (desktop)
//!
//! Architecture:
//! - Output callback (master): renders scheduled clicks through
//!   [`ClickRenderer`] and advances the frame counter behind [`StreamClock`]
//! - Input callback: folds the first channel into fixed-size blocks, computes
//!   one RMS [`LevelFrame`] per block and pushes it to the level queue
//! - Onset worker thread (see [`crate::analysis::spawn_onset_thread`]) drains
//!   the level queue
//!
//! Both callbacks are lock-free: atomics plus rtrb SPSC queues only.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rtrb::{Consumer, Producer};

use super::renderer::ClickRenderer;
use crate::analysis::{rms, LevelFrame};
use crate::clock::{ScheduledClick, StreamClock};
use crate::error::{log_audio_error, AudioError};
use crate::telemetry::{self, LifecyclePhase};

pub struct DuplexEngine {
    /// Input audio stream
    input_stream: Option<cpal::Stream>,
    /// Output audio stream
    output_stream: Option<cpal::Stream>,
    /// Clock shared with the scheduler
    clock: Arc<StreamClock>,
    /// Consumer end of the click queue, moved into the output callback on start
    clicks: Option<Consumer<ScheduledClick>>,
    /// Sample rate of the output device in Hz
    sample_rate: u32,
    /// Input samples per RMS block
    window_size: usize,
}

fn default_output_device() -> Result<(cpal::Device, cpal::SupportedStreamConfig), AudioError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(AudioError::NoDevice {
            direction: "output",
        })?;
    let config = device
        .default_output_config()
        .map_err(|e| AudioError::StreamOpenFailed {
            reason: format!("Failed to get default output config: {:?}", e),
        })?;
    Ok((device, config))
}

impl DuplexEngine {
    /// Probe the default output device and create the stream clock.
    ///
    /// Streams are not opened until [`DuplexEngine::start`].
    pub fn new(window_size: usize) -> Result<Self, AudioError> {
        let (_, config) = default_output_device().map_err(|err| {
            log_audio_error(&err, "DuplexEngine::new");
            err
        })?;
        let sample_rate = config.sample_rate().0;
        let (clock, clicks) = StreamClock::new(sample_rate);

        log::info!("[DuplexEngine] Output device at {} Hz", sample_rate);
        Ok(Self {
            input_stream: None,
            output_stream: None,
            clock: Arc::new(clock),
            clicks: Some(clicks),
            sample_rate,
            window_size: window_size.max(1),
        })
    }

    /// Clock to hand to the scheduler.
    pub fn clock(&self) -> Arc<StreamClock> {
        Arc::clone(&self.clock)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_running(&self) -> bool {
        self.output_stream.is_some()
    }

    fn create_output_stream(&self, mut renderer: ClickRenderer) -> Result<cpal::Stream, AudioError> {
        let (device, config) = default_output_device()?;
        let stream_config: cpal::StreamConfig = config.clone().into();
        let channels_count = stream_config.channels as usize;

        let err_fn = |err| log::error!("[DuplexEngine] Output stream error: {}", err);

        match config.sample_format() {
            cpal::SampleFormat::F32 => device.build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    renderer.render(data, channels_count);
                },
                err_fn,
                None,
            ),
            other => {
                return Err(AudioError::UnsupportedFormat {
                    format: format!("{:?}", other),
                })
            }
        }
        .map_err(|e| AudioError::StreamOpenFailed {
            reason: format!("{:?}", e),
        })
    }

    fn create_input_stream(
        &self,
        mut levels: Producer<LevelFrame>,
    ) -> Result<cpal::Stream, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(AudioError::NoDevice { direction: "input" })?;
        let config = device
            .default_input_config()
            .map_err(|e| AudioError::StreamOpenFailed {
                reason: format!("Failed to get default input config: {:?}", e),
            })?;

        let stream_config: cpal::StreamConfig = config.clone().into();
        let channels_count = (stream_config.channels as usize).max(1);

        let frame_counter: Arc<AtomicU64> = self.clock.frame_counter_ref();
        let sample_rate = self.sample_rate as f64;
        let window_size = self.window_size;
        // Pre-allocated so the callback never allocates
        let mut block: Vec<f32> = Vec::with_capacity(window_size);

        let err_fn = |err| log::error!("[DuplexEngine] Input stream error: {}", err);

        match config.sample_format() {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    // De-interleave: take first channel
                    for frame in data.chunks(channels_count) {
                        block.push(frame[0]);
                        if block.len() == window_size {
                            let time = frame_counter.load(Ordering::Relaxed) as f64 / sample_rate;
                            let _ = levels.push(LevelFrame {
                                rms: rms(&block),
                                time,
                            });
                            block.clear();
                        }
                    }
                },
                err_fn,
                None,
            ),
            other => {
                return Err(AudioError::UnsupportedFormat {
                    format: format!("{:?}", other),
                })
            }
        }
        .map_err(|e| AudioError::StreamOpenFailed {
            reason: format!("{:?}", e),
        })
    }

    /// Open and start both streams.
    ///
    /// # Arguments
    /// * `levels` - Producer end of the level queue read by the onset worker
    ///
    /// # Errors
    /// - Engine already started
    /// - No default device, unsupported sample format or stream open failure
    pub fn start(&mut self, levels: Producer<LevelFrame>) -> Result<(), AudioError> {
        let Some(clicks) = self.clicks.take() else {
            let err = AudioError::HardwareError {
                details: "Engine already started".to_string(),
            };
            log_audio_error(&err, "DuplexEngine::start");
            return Err(err);
        };

        let renderer = ClickRenderer::for_clock(&self.clock, clicks);
        let output_stream = self.create_output_stream(renderer).map_err(|err| {
            log_audio_error(&err, "DuplexEngine::start");
            err
        })?;
        let input_stream = self.create_input_stream(levels).map_err(|err| {
            log_audio_error(&err, "DuplexEngine::start");
            err
        })?;

        output_stream
            .play()
            .map_err(|e| AudioError::HardwareError {
                details: format!("Output start failed: {}", e),
            })?;
        input_stream.play().map_err(|e| AudioError::HardwareError {
            details: format!("Input start failed: {}", e),
        })?;

        self.output_stream = Some(output_stream);
        self.input_stream = Some(input_stream);
        telemetry::hub().record_lifecycle(LifecyclePhase::StreamOpened, 0);
        log::info!("[DuplexEngine] Streams started");
        Ok(())
    }

    /// Drop both streams and close the clock. Safe to call more than once.
    pub fn stop(&mut self) {
        let was_running = self.output_stream.is_some();
        self.input_stream.take();
        self.output_stream.take();
        self.clock.close();
        if was_running {
            telemetry::hub().record_lifecycle(LifecyclePhase::StreamClosed, 0);
            log::info!("[DuplexEngine] Streams stopped");
        }
    }
}

impl Drop for DuplexEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
