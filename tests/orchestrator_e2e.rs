// tests/orchestrator_e2e.rs
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use snapsoak::testing::MockDevice;
use snapsoak::{
    Credentials, ErrorCode, Orchestrator, RetentionStore, RunSettings, SoakError, WorkerState,
};

const CAPTURE_TIMEOUT: Duration = Duration::from_millis(2_000);

fn settings(dir: &tempfile::TempDir, seconds: f64) -> RunSettings {
    let mut settings = RunSettings::new(
        "10.78.203.159",
        8000,
        Credentials::new("admin", "12345"),
        seconds / 3600.0,
    )
    .unwrap();
    settings.capture.interval = Duration::from_millis(20);
    settings.capture_dir = dir.path().join("capture");
    settings.log_dir = dir.path().join("logs");
    settings
}

fn jpeg_count(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .flatten()
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "jpeg"))
        .count()
}

#[test]
fn test_four_channels_run_and_stop_on_budget() {
    let dir = tempfile::tempdir().unwrap();
    let device = Arc::new(MockDevice::with_channels(1, 4).with_capture_delay(Duration::from_millis(5)));
    let orchestrator = Orchestrator::new(device.clone(), settings(&dir, 1.0));

    let started = Instant::now();
    let report = orchestrator.run().unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_secs(1) + CAPTURE_TIMEOUT);
    assert!(report.stop_latency_secs < CAPTURE_TIMEOUT.as_secs_f64());

    assert_eq!(report.workers.len(), 4);
    assert!(report.all_stopped());
    let mut channels: Vec<u32> = report.workers.iter().map(|w| w.channel).collect();
    channels.sort_unstable();
    assert_eq!(channels, vec![1, 2, 3, 4]);

    assert_eq!(device.logins(), 1);
    assert_eq!(device.logouts(), 1);
    assert_eq!(device.disconnects(), 1);

    let store = RetentionStore::new(dir.path().join("capture"), dir.path().join("logs"), 3);
    for worker in &report.workers {
        assert!(worker.captures >= 3, "channel {} captured {}", worker.channel, worker.captures);
        assert_eq!(device.captures(worker.channel), worker.iterations);
        assert_eq!(jpeg_count(&store.channel_dir(worker.channel)), 3);

        let last = worker.iterations;
        for seq in [last, last - 1, last - 2] {
            assert!(store.frame_path(worker.channel, seq).is_file());
        }
        assert!(!store.frame_path(worker.channel, last - 3).exists());

        let log = std::fs::read_to_string(store.channel_log_path(worker.channel)).unwrap();
        assert!(log.contains(&format!("|INFO|Thread started for {}", worker.channel)));
        assert!(log.contains(&format!("|INFO|Thread stopped for {}", worker.channel)));
    }

    let run_log = std::fs::read_to_string(dir.path().join("logs").join("run.log")).unwrap();
    assert!(run_log.contains("|INFO|Logged in successfully"));
    assert!(run_log.contains("|INFO|Stop signal raised"));
    assert!(run_log.contains("|INFO|Logged out successfully"));
}

#[test]
fn test_authentication_failure_starts_no_workers() {
    let dir = tempfile::tempdir().unwrap();
    let device = Arc::new(
        MockDevice::with_channels(1, 4).fail_authenticate(ErrorCode::NETWORK_FAIL_CONNECT),
    );
    let orchestrator = Orchestrator::new(device.clone(), settings(&dir, 1.0));

    let err = orchestrator.run().unwrap_err();
    match &err {
        SoakError::AuthenticationFailure(entry) => {
            assert_eq!(entry.code(), ErrorCode(7));
            assert!(entry.message().starts_with("Failed to connect to the device"));
        }
        other => panic!("expected authentication failure, got {:?}", other),
    }
    assert!(err.to_string().contains("Failed to connect to the device"));

    for channel in 1..=4 {
        assert_eq!(device.captures(channel), 0);
    }
    assert!(!dir.path().join("capture").exists());
    assert_eq!(device.logouts(), 0);
    assert_eq!(device.disconnects(), 1);
}

#[test]
fn test_init_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let device = Arc::new(MockDevice::with_channels(1, 2).fail_connect(ErrorCode(84)));
    let orchestrator = Orchestrator::new(device.clone(), settings(&dir, 1.0));

    let err = orchestrator.run().unwrap_err();
    assert!(matches!(err, SoakError::SessionInitFailure(_)));
    assert!(err.to_string().contains("Load StreamTransClient.dll failed"));
    assert_eq!(device.logins(), 0);
}

#[test]
fn test_persist_failure_only_stops_that_channel() {
    let dir = tempfile::tempdir().unwrap();
    let store = RetentionStore::new(dir.path().join("capture"), dir.path().join("logs"), 3);
    store.provision(1..3).unwrap();
    // A directory squatting on the first frame name makes the write fail.
    std::fs::create_dir_all(store.frame_path(2, 1)).unwrap();

    let device = Arc::new(MockDevice::with_channels(1, 2));
    let report = Orchestrator::new(device.clone(), settings(&dir, 0.5))
        .run()
        .unwrap();

    let failed = report.workers.iter().find(|w| w.channel == 2).unwrap();
    assert_eq!(failed.iterations, 1);
    assert!(failed.persist_failure.is_some());
    assert_eq!(failed.state, WorkerState::Stopped);

    let healthy = report.workers.iter().find(|w| w.channel == 1).unwrap();
    assert!(healthy.captures > 1);
    assert!(healthy.persist_failure.is_none());

    let log = std::fs::read_to_string(store.channel_log_path(2)).unwrap();
    assert!(log.contains("|ERROR|Stopping capture"));
    assert_eq!(device.logouts(), 1);
}

#[test]
fn test_serialized_captures_never_overlap() {
    let dir = tempfile::tempdir().unwrap();
    let device = Arc::new(MockDevice::with_channels(1, 4).with_capture_delay(Duration::from_millis(10)));
    let mut settings = settings(&dir, 0.5);
    settings.capture.serialize_calls = true;

    let report = Orchestrator::new(device.clone(), settings).run().unwrap();

    assert!(report.all_stopped());
    assert!(report.total_captures() > 0);
    assert_eq!(device.max_concurrent_captures(), 1);
}

#[test]
fn test_early_stop_ends_run_before_budget() {
    let dir = tempfile::tempdir().unwrap();
    let device = Arc::new(MockDevice::with_channels(1, 2));
    let orchestrator = Orchestrator::new(device.clone(), settings(&dir, 3600.0));
    let stop = orchestrator.stop_signal();

    let trigger = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(200));
        stop.raise();
    });

    let started = Instant::now();
    let report = orchestrator.run().unwrap();
    trigger.join().unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(report.all_stopped());
    assert_eq!(device.disconnects(), 1);
}

#[test]
fn test_supervisor_panic_still_stops_workers_and_tears_down() {
    let dir = tempfile::tempdir().unwrap();
    let device = Arc::new(MockDevice::with_channels(1, 3));
    let orchestrator = Orchestrator::new(device.clone(), settings(&dir, 3600.0)).on_worker_event(
        |event| {
            if event.state == WorkerState::Looping {
                panic!("observer failed on channel {}", event.channel);
            }
        },
    );
    let stop = orchestrator.stop_signal();

    let started = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| orchestrator.run()));

    assert!(outcome.is_err());
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(stop.is_raised());
    assert_eq!(device.logins(), 1);
    assert_eq!(device.logouts(), 1);
    assert_eq!(device.disconnects(), 1);

    let store = RetentionStore::new(dir.path().join("capture"), dir.path().join("logs"), 3);
    for channel in 1..=3 {
        let log = std::fs::read_to_string(store.channel_log_path(channel)).unwrap();
        assert!(log.contains(&format!("|INFO|Thread stopped for {}", channel)));
    }
}
