use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use beattime::analysis::{AccuracyEngine, TimingClassification, TimingVerdict};
use beattime::audio::{ClickRenderer, CLICK_DURATION_S};
use beattime::clock::{AudioClock, ManualClock, StreamClock};
use beattime::config::{AppConfig, PracticeConfig};
use beattime::scheduler::{BeatScheduler, BeatTimeLog};
use beattime::scoring::ScoreBoard;
use beattime::session::PracticeSession;
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(
    name = "beattime_cli",
    about = "Metronome scheduling and onset accuracy tools"
)]
struct Cli {
    /// JSON config file (defaults to assets/beattime_config.json)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Log debug output to stderr
    #[arg(long, short)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a deterministic session with synthetic taps and print every verdict
    Simulate {
        #[arg(long, default_value_t = 120)]
        bpm: u32,
        /// Number of beats to tap along with
        #[arg(long, default_value_t = 16)]
        beats: usize,
        /// Maximum random tap error either side of the beat
        #[arg(long, default_value_t = 30.0)]
        jitter_ms: f64,
        /// Input latency added to every tap, and compensated by the session
        #[arg(long, default_value_t = 130.0)]
        latency_ms: f64,
        /// Skip every Nth beat (0 taps every beat)
        #[arg(long, default_value_t = 0)]
        miss_every: usize,
        #[arg(long, default_value_t = 7)]
        seed: u64,
        /// Print the telemetry snapshot after the summary
        #[arg(long)]
        telemetry: bool,
    },
    /// Classify recorded onsets against recorded beat times (JSON arrays of seconds)
    Classify {
        #[arg(long)]
        beats: PathBuf,
        #[arg(long)]
        onsets: PathBuf,
        /// Latency compensation in seconds
        #[arg(long)]
        latency: Option<f64>,
        /// Timing window half-width in seconds
        #[arg(long)]
        window: Option<f64>,
    },
    /// Render a click track to a WAV file through the look-ahead scheduler
    Render {
        #[arg(long, default_value_t = 120)]
        bpm: u32,
        #[arg(long, default_value_t = 8)]
        beats: usize,
        #[arg(long, default_value_t = 48000)]
        sample_rate: u32,
        #[arg(long)]
        output: PathBuf,
    },
    /// Live practice with the default audio devices
    Practice {
        #[arg(long, default_value_t = 120)]
        bpm: u32,
        #[arg(long, default_value_t = 30)]
        seconds: u64,
    },
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    beattime::init_logging(if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    });

    let config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path),
        None => AppConfig::load(),
    };

    match cli.command {
        Commands::Simulate {
            bpm,
            beats,
            jitter_ms,
            latency_ms,
            miss_every,
            seed,
            telemetry,
        } => run_simulate(
            config,
            SimulateArgs {
                bpm,
                beats,
                jitter_s: jitter_ms / 1000.0,
                latency_s: latency_ms / 1000.0,
                miss_every,
                seed,
                telemetry,
            },
        ),
        Commands::Classify {
            beats,
            onsets,
            latency,
            window,
        } => run_classify(config, &beats, &onsets, latency, window),
        Commands::Render {
            bpm,
            beats,
            sample_rate,
            output,
        } => run_render(config, bpm, beats, sample_rate, &output),
        Commands::Practice { bpm, seconds } => run_practice(config, bpm, seconds),
    }
}

struct SimulateArgs {
    bpm: u32,
    beats: usize,
    jitter_s: f64,
    latency_s: f64,
    miss_every: usize,
    seed: u64,
    telemetry: bool,
}

fn run_simulate(mut config: AppConfig, args: SimulateArgs) -> Result<ExitCode> {
    config.practice = PracticeConfig {
        latency_compensation_s: args.latency_s,
        ..config.practice
    }
    .clamped();

    let session = PracticeSession::new(config);
    let mut verdicts = session.subscribe_verdicts();
    let clock = Arc::new(ManualClock::new(0.0));
    if !session.start(args.bpm, clock.clone()) {
        bail!("session refused to start at {} BPM", args.bpm);
    }

    let mut rng = StdRng::seed_from_u64(args.seed);
    let step = session.config().scheduler.housekeeping_interval().as_secs_f64();
    let mut tapped_beats = 0;
    let mut taps: Vec<f64> = Vec::new();

    loop {
        clock.advance(step);
        session.tick();

        let log = session.beat_log();
        while tapped_beats < log.len().min(args.beats) {
            tapped_beats += 1;
            if args.miss_every > 0 && tapped_beats % args.miss_every == 0 {
                continue;
            }
            let jitter = if args.jitter_s > 0.0 {
                rng.gen_range(-args.jitter_s..=args.jitter_s)
            } else {
                0.0
            };
            taps.push(log[tapped_beats - 1] + args.latency_s + jitter);
        }
        taps.sort_by(f64::total_cmp);

        let now = clock.now();
        let due = taps.iter().take_while(|&&t| t <= now).count();
        for tap in taps.drain(..due) {
            session.report_onset(tap);
        }
        while let Ok(event) = verdicts.try_recv() {
            println!("{}", serde_json::to_string(&event)?);
        }

        if tapped_beats >= args.beats && taps.is_empty() {
            break;
        }
    }

    let summary = session.stop();
    println!("{}", serde_json::to_string_pretty(&summary)?);
    if args.telemetry {
        let snapshot = beattime::telemetry::hub().snapshot();
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }
    Ok(ExitCode::from(0))
}

#[derive(Serialize)]
struct ClassifyRow {
    onset: f64,
    verdict: TimingVerdict,
    classification: TimingClassification,
    quality: f64,
}

fn read_times(path: &Path) -> Result<Vec<f64>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn run_classify(
    config: AppConfig,
    beats_path: &Path,
    onsets_path: &Path,
    latency: Option<f64>,
    window: Option<f64>,
) -> Result<ExitCode> {
    let beats = read_times(beats_path)?;
    let onsets = read_times(onsets_path)?;
    if beats.windows(2).any(|pair| pair[1] <= pair[0]) {
        bail!("beat times in {} are not strictly increasing", beats_path.display());
    }

    let practice = PracticeConfig {
        latency_compensation_s: latency.unwrap_or(config.practice.latency_compensation_s),
        timing_window_s: window.unwrap_or(config.practice.timing_window_s),
        ..config.practice
    };
    let mut engine = AccuracyEngine::from_config(&practice);
    let mut board = ScoreBoard::new(config.scoring);

    for onset in onsets {
        let verdict = engine.classify(onset, &beats);
        let update = board.record(&verdict, practice.timing_window_s);
        let row = ClassifyRow {
            onset,
            verdict,
            classification: verdict.classification(practice.timing_window_s),
            quality: update.quality,
        };
        println!("{}", serde_json::to_string(&row)?);
    }

    println!("{}", serde_json::to_string_pretty(&board.summary(practice.bpm))?);
    Ok(ExitCode::from(0))
}

fn run_render(
    config: AppConfig,
    bpm: u32,
    beats: usize,
    sample_rate: u32,
    output: &Path,
) -> Result<ExitCode> {
    if beats == 0 {
        bail!("--beats must be at least 1");
    }
    let (clock, clicks) = StreamClock::new(sample_rate);
    let clock = Arc::new(clock);
    let mut renderer = ClickRenderer::for_clock(&clock, clicks);
    let log = BeatTimeLog::shared();
    let mut scheduler = BeatScheduler::new(
        config.scheduler,
        config.practice.time_signature,
        Arc::clone(&log),
        Box::new(|_| {}),
    );
    scheduler
        .start(bpm, clock.clone())
        .with_context(|| format!("starting scheduler at {} BPM", bpm))?;

    // One housekeeping pass per buffer, buffers as long as the pass interval
    let interval = config.scheduler.housekeeping_interval().as_secs_f64();
    let buffer_frames = ((sample_rate as f64 * interval) as usize).max(1);
    let mut buffer = vec![0.0f32; buffer_frames];

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(output, spec)
        .with_context(|| format!("creating {}", output.display()))?;

    let mut end_time: Option<f64> = None;
    loop {
        if end_time.is_none() {
            scheduler.tick();
            let beat_log = log.read().map_err(|_| anyhow::anyhow!("beat log poisoned"))?;
            if beat_log.len() >= beats {
                end_time = beat_log.get(beats - 1).map(|last| last + CLICK_DURATION_S);
                drop(beat_log);
                scheduler.stop();
            }
        }

        renderer.render(&mut buffer, 1);
        for &sample in &buffer {
            writer.write_sample(sample)?;
        }

        if matches!(end_time, Some(end) if clock.now() >= end) {
            break;
        }
    }

    writer.finalize()?;
    eprintln!(
        "Wrote {} beats at {} BPM ({:.2}s) to {}",
        beats,
        bpm,
        clock.now(),
        output.display()
    );
    Ok(ExitCode::from(0))
}

#[cfg(not(target_os = "android"))]
fn run_practice(config: AppConfig, bpm: u32, seconds: u64) -> Result<ExitCode> {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use beattime::analysis::spawn_onset_thread;
    use beattime::audio::DuplexEngine;
    use rtrb::RingBuffer;
    use tokio::sync::broadcast::error::RecvError;

    let runtime = tokio::runtime::Runtime::new().context("creating tokio runtime")?;
    let _guard = runtime.enter();

    let mut engine = DuplexEngine::new(config.onset_detection.window_size)?;
    let (levels_tx, levels_rx) = RingBuffer::new(256);
    let running = Arc::new(AtomicBool::new(true));

    let session = Arc::new(PracticeSession::new(config.clone()));
    let onset_session = Arc::clone(&session);
    let onset_thread = spawn_onset_thread(
        levels_rx,
        config.onset_detection,
        Arc::clone(&running),
        Box::new(move |candidate| {
            onset_session.report_candidate(candidate);
        }),
    );

    let mut verdicts = session.subscribe_verdicts();
    let printer = runtime.spawn(async move {
        loop {
            match verdicts.recv().await {
                Ok(event) => println!(
                    "{:?} {:+.1}ms score={} streak={}",
                    event.classification,
                    event.verdict.timing_ms(),
                    event.score,
                    event.streak
                ),
                Err(RecvError::Lagged(skipped)) => eprintln!("skipped {} verdicts", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    engine.start(levels_tx)?;
    let clock: Arc<dyn AudioClock> = engine.clock();
    if !session.start(bpm, clock) {
        engine.stop();
        bail!("session refused to start at {} BPM", bpm);
    }
    eprintln!("Practicing at {} BPM for {}s, tap along...", bpm, seconds);

    runtime.block_on(tokio::time::sleep(Duration::from_secs(seconds)));

    let summary = session.stop();
    engine.stop();
    running.store(false, Ordering::SeqCst);
    if onset_thread.join().is_err() {
        eprintln!("onset thread panicked");
    }
    printer.abort();

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(ExitCode::from(0))
}

#[cfg(target_os = "android")]
fn run_practice(_config: AppConfig, _bpm: u32, _seconds: u64) -> Result<ExitCode> {
    bail!("live practice is only available on desktop targets")
}
