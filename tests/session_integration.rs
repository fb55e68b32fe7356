//! Integration tests for PracticeSession driven by its tokio housekeeping task
//!
//! Time on the audio side comes from a ManualClock; the housekeeping task runs
//! on a real multi-thread runtime, so these tests check the interplay of the
//! timer-driven pass with start/stop and onset reporting.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use beattime::clock::{AudioClock, ManualClock};
use beattime::config::AppConfig;
use beattime::scheduler::BeatEvent;
use beattime::session::PracticeSession;

fn init_test_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build test runtime")
}

fn wait(runtime: &tokio::runtime::Runtime, millis: u64) {
    runtime.block_on(tokio::time::sleep(Duration::from_millis(millis)));
}

fn session_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.practice.latency_compensation_s = 0.0;
    config
}

#[test]
fn housekeeping_task_schedules_beats() {
    let runtime = init_test_runtime();
    let _guard = runtime.enter();

    let session = PracticeSession::new(session_config());
    let clock = Arc::new(ManualClock::new(0.0));
    assert!(session.start(120, clock.clone()));
    assert!(session.has_housekeeping_task());

    // One late pass catches up every beat inside the horizon
    clock.set(1.2);
    wait(&runtime, 100);

    let log = session.beat_log();
    assert_eq!(log.len(), 3);
    assert!((log[1] - 0.6).abs() < 1e-9);
    assert_eq!(clock.scheduled_clicks().len(), 3);
    assert!(clock.scheduled_clicks()[0].accent);

    session.stop();
}

#[test]
fn no_beats_after_stop() {
    let runtime = init_test_runtime();
    let _guard = runtime.enter();

    let session = PracticeSession::new(session_config());
    let mut beats = session.subscribe_beats();
    let clock = Arc::new(ManualClock::new(0.0));
    session.start(120, clock.clone());

    for _ in 0..20 {
        clock.advance(0.05);
        wait(&runtime, 5);
    }

    session.stop();
    let stopped_len = session.beat_log().len();
    assert!(!session.has_housekeeping_task());

    clock.advance(5.0);
    wait(&runtime, 80);
    assert_eq!(session.beat_log().len(), stopped_len);

    let mut received = Vec::new();
    while let Ok(event) = beats.try_recv() {
        received.push(event);
    }
    assert_eq!(received.len(), stopped_len + 1);
    assert_eq!(received.last(), Some(&BeatEvent::STOPPED));
    assert_eq!(
        received.iter().filter(|event| event.is_stop_signal()).count(),
        1
    );
}

#[test]
fn onsets_from_another_thread_are_scored() {
    let runtime = init_test_runtime();
    let _guard = runtime.enter();

    let session = Arc::new(PracticeSession::new(session_config()));
    let clock = Arc::new(ManualClock::new(0.0));
    session.start(120, clock.clone());
    clock.set(2.2);
    wait(&runtime, 100);

    let beats = session.beat_log();
    assert!(beats.len() >= 4);

    let reporter = {
        let session = Arc::clone(&session);
        let taps: Vec<f64> = beats.iter().take(4).map(|t| t + 0.02).collect();
        std::thread::spawn(move || {
            taps.into_iter()
                .filter_map(|t| session.report_onset(t))
                .filter(|verdict| verdict.hit)
                .count()
        })
    };
    assert_eq!(reporter.join().expect("reporter panicked"), 4);

    let summary = session.stop();
    assert_eq!(summary.hits, 4);
    assert_eq!(summary.best_streak, 4);
    assert_eq!(summary.accuracy_pct, 100);
}

#[test]
fn closing_the_clock_ends_the_session() {
    let runtime = init_test_runtime();
    let _guard = runtime.enter();

    let session = PracticeSession::new(session_config());
    let mut beats = session.subscribe_beats();
    let clock = Arc::new(ManualClock::new(0.0));
    session.start(120, clock.clone());

    clock.set(0.7);
    wait(&runtime, 60);
    clock.close();
    wait(&runtime, 60);

    assert!(!session.is_running());
    assert!(!session.has_housekeeping_task());

    let mut last = None;
    while let Ok(event) = beats.try_recv() {
        last = Some(event);
    }
    assert_eq!(last, Some(BeatEvent::STOPPED));
}

#[test]
fn restart_replaces_housekeeping_task() {
    let runtime = init_test_runtime();
    let _guard = runtime.enter();

    let session = PracticeSession::new(session_config());
    let clock = Arc::new(ManualClock::new(0.0));
    session.start(120, clock.clone());
    clock.set(1.0);
    wait(&runtime, 60);
    assert!(!session.beat_log().is_empty());

    // Restart at a new tempo while running
    assert!(session.start(60, clock.clone()));
    assert!(session.beat_log().is_empty());
    clock.set(3.2);
    wait(&runtime, 60);

    let log = session.beat_log();
    assert_eq!(log.len(), 3);
    assert!((log[0] - 1.1).abs() < 1e-9);
    assert!((log[1] - 2.1).abs() < 1e-9);
    assert_eq!(session.bpm(), 60);
    assert!(clock.now() >= 3.2);

    session.stop();
}

#[test]
fn beat_callback_reenters_session_from_housekeeping_task() {
    let runtime = init_test_runtime();
    let _guard = runtime.enter();

    let slot: Arc<Mutex<Weak<PracticeSession>>> = Arc::new(Mutex::new(Weak::new()));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let session = {
        let slot = Arc::clone(&slot);
        let seen = Arc::clone(&seen);
        Arc::new(PracticeSession::with_beat_callback(
            session_config(),
            Box::new(move |event: BeatEvent| {
                let session = slot.lock().unwrap().upgrade();
                if let Some(session) = session {
                    seen.lock().unwrap().push((event, session.current_beat()));
                }
            }),
        ))
    };
    *slot.lock().unwrap() = Arc::downgrade(&session);

    let clock = Arc::new(ManualClock::new(0.0));
    assert!(session.start(120, clock.clone()));
    clock.set(1.2);
    wait(&runtime, 100);

    // The session stays usable after the task ran the callback
    let verdict = session.report_onset(0.1).expect("verdict");
    assert!(verdict.hit);
    session.stop();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 4);
    assert!(seen[..3].iter().all(|(_, current)| *current == 3));
    assert_eq!(seen[3], (BeatEvent::STOPPED, 0));
}
