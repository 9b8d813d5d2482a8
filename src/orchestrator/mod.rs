// src/orchestrator/mod.rs
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, RecvTimeoutError};
use serde::Serialize;

use crate::core::{ComponentLogger, EvidenceLog, LogContext, Result, SoakError, StopSignal};
use crate::device::{Credentials, DeviceClient, DeviceInfo, JpegParams};
use crate::session::{ConnectionPolicy, Session, SessionManager};
use crate::storage::{RetentionStore, DEFAULT_RETENTION_WINDOW};
use crate::worker::{
    CaptureWorker, WorkerEvent, WorkerParams, WorkerReport, WorkerState, DEFAULT_CAPTURE_INTERVAL,
};

const SUPERVISE_TICK: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub interval: Duration,
    pub retention_window: u64,
    pub jpeg: JpegParams,
    /// Serialize capture calls behind one mutex instead of running them
    /// concurrently on the shared session.
    pub serialize_calls: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_CAPTURE_INTERVAL,
            retention_window: DEFAULT_RETENTION_WINDOW,
            jpeg: JpegParams::default(),
            serialize_calls: false,
        }
    }
}

/// Inputs of one capture run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub address: String,
    pub port: u16,
    pub credentials: Credentials,
    pub duration: Duration,
    pub policy: ConnectionPolicy,
    pub capture: CaptureSettings,
    pub capture_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl RunSettings {
    pub fn new(address: &str, port: u16, credentials: Credentials, duration_hours: f64) -> Result<Self> {
        Ok(Self {
            address: address.to_string(),
            port,
            credentials,
            duration: duration_from_hours(duration_hours)?,
            policy: ConnectionPolicy::default(),
            capture: CaptureSettings::default(),
            capture_dir: PathBuf::from("capture"),
            log_dir: PathBuf::from("logs"),
        })
    }
}

/// Converts a fractional hour count (e.g. `0.0066`) to a wall-clock budget.
pub fn duration_from_hours(hours: f64) -> Result<Duration> {
    if !hours.is_finite() || hours <= 0.0 {
        return Err(SoakError::Config(format!(
            "run duration must be a positive number of hours, got {}",
            hours
        )));
    }
    Duration::try_from_secs_f64(hours * 3600.0)
        .map_err(|e| SoakError::Config(format!("run duration {}h: {}", hours, e)))
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub device: DeviceInfo,
    pub budget_secs: f64,
    pub elapsed_secs: f64,
    /// Time from raising the stop signal until the last worker was joined.
    pub stop_latency_secs: f64,
    pub workers: Vec<WorkerReport>,
}

impl RunReport {
    pub fn all_stopped(&self) -> bool {
        self.workers.iter().all(|w| w.state == WorkerState::Stopped)
    }

    pub fn total_captures(&self) -> u64 {
        self.workers.iter().map(|w| w.captures).sum()
    }
}

/// Callback invoked on the orchestrator thread for every worker event.
pub type EventObserver = Box<dyn Fn(&WorkerEvent) + Send + Sync>;

pub struct Orchestrator {
    client: Arc<dyn DeviceClient>,
    settings: RunSettings,
    stop: StopSignal,
    observer: Option<EventObserver>,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn DeviceClient>, settings: RunSettings) -> Self {
        Self {
            client,
            settings,
            stop: StopSignal::new(),
            observer: None,
        }
    }

    pub fn on_worker_event(mut self, observer: impl Fn(&WorkerEvent) + Send + Sync + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Handle for raising the stop signal before the deadline (Ctrl+C).
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Opens the session, captures on every channel until the time budget
    /// elapses, then stops, joins and tears down.
    ///
    /// Session setup failures return before any worker exists. Once the
    /// session is open it is closed on every exit path.
    pub fn run(&self) -> Result<RunReport> {
        let s = &self.settings;
        std::fs::create_dir_all(&s.log_dir)?;
        let mut run_log = EvidenceLog::create(s.log_dir.join("run.log"))?;
        run_log.info(&format!("{} created", run_log.path().display()));

        let session = match SessionManager::new(self.client.clone()).open(
            &s.address,
            s.port,
            &s.credentials,
            s.policy,
            &mut run_log,
        ) {
            Ok(session) => session,
            Err(e) => {
                self.error(&format!("session setup failed: {}", e));
                return Err(e);
            }
        };

        let outcome = self.capture_until_deadline(&session, &mut run_log);
        let closed = session.close(&mut run_log);

        let report = outcome?;
        closed?;
        if let Ok(json) = serde_json::to_string(&report) {
            run_log.info(&format!("Run report {}", json));
        }
        Ok(report)
    }

    fn capture_until_deadline(&self, session: &Session, run_log: &mut EvidenceLog) -> Result<RunReport> {
        let s = &self.settings;
        let device = session.device_info().clone();
        let channels = device.channels();

        let store = RetentionStore::new(&s.capture_dir, &s.log_dir, s.capture.retention_window);
        store.provision(channels.clone())?;

        let started = Instant::now();
        let deadline = started + s.duration;
        run_log.info(&format!(
            "Start time: {}; ETA in {:.1}s; channels {:?}",
            chrono::Local::now().to_rfc3339(),
            s.duration.as_secs_f64(),
            channels
        ));
        self.info(&format!(
            "starting {} workers for {:.1}s",
            channels.len(),
            s.duration.as_secs_f64()
        ));

        let gate = Mutex::new(());
        let capture_gate = s.capture.serialize_calls.then_some(&gate);
        let (events_tx, events_rx) = crossbeam::channel::unbounded::<WorkerEvent>();

        let (workers, stop_latency) = thread::scope(|scope| {
            // Unwinding out of this closure still joins the workers, so they must see the stop.
            let _stop_on_exit = self.stop.raise_on_drop();
            let mut handles = Vec::new();
            for channel in channels.clone() {
                let params = WorkerParams {
                    session,
                    store: &store,
                    channel,
                    jpeg: s.capture.jpeg,
                    interval: s.capture.interval,
                    stop: self.stop.clone(),
                    capture_gate,
                    events: events_tx.clone(),
                };
                let spawned = thread::Builder::new()
                    .name(format!("capture-{}", channel))
                    .spawn_scoped(scope, move || match CaptureWorker::new(params) {
                        Ok(worker) => worker.run(),
                        Err(e) => WorkerReport::aborted(channel, &e.to_string()),
                    });
                match spawned {
                    Ok(handle) => handles.push((channel, handle)),
                    Err(e) => {
                        run_log.error(&format!("Thread spawn failed for {}: {}", channel, e));
                        self.error(&format!("spawn for channel {} failed: {}", channel, e));
                    }
                }
            }
            // Only workers hold senders now; disconnect means all have exited.
            drop(events_tx);

            self.supervise(&events_rx, deadline, run_log);

            if self.stop.raise() {
                run_log.info("Stop signal raised");
            }
            let stop_raised = Instant::now();

            let mut reports = Vec::with_capacity(handles.len());
            for (channel, handle) in handles {
                match handle.join() {
                    Ok(report) => reports.push(report),
                    Err(_) => {
                        run_log.error(&format!("Thread for {} panicked", channel));
                        reports.push(WorkerReport::aborted(channel, "worker panicked"));
                    }
                }
            }
            for event in events_rx.try_iter() {
                self.note_event(&event, run_log);
            }
            (reports, stop_raised.elapsed())
        });

        let elapsed = started.elapsed();
        run_log.info(&format!(
            "All workers joined after {:.3}s",
            stop_latency.as_secs_f64()
        ));
        self.info(&format!("{} workers joined", workers.len()));

        Ok(RunReport {
            device,
            budget_secs: s.duration.as_secs_f64(),
            elapsed_secs: elapsed.as_secs_f64(),
            stop_latency_secs: stop_latency.as_secs_f64(),
            workers,
        })
    }

    /// Blocks until the deadline, an early stop, or every worker has exited,
    /// recording worker lifecycle events as they arrive.
    fn supervise(&self, events: &Receiver<WorkerEvent>, deadline: Instant, run_log: &mut EvidenceLog) {
        while !self.stop.is_raised() {
            let now = Instant::now();
            if now >= deadline {
                self.info("time budget elapsed");
                return;
            }
            match events.recv_timeout((deadline - now).min(SUPERVISE_TICK)) {
                Ok(event) => self.note_event(&event, run_log),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    self.warn("all workers exited before the deadline");
                    return;
                }
            }
        }
        self.info("stop requested before the deadline");
    }

    fn note_event(&self, event: &WorkerEvent, run_log: &mut EvidenceLog) {
        match (&event.state, &event.detail) {
            (WorkerState::Stopping, Some(detail)) => {
                run_log.error(&format!("Channel {} stopping: {}", event.channel, detail))
            }
            (state, _) => run_log.info(&format!("Channel {} {:?}", event.channel, state)),
        }
        if let Some(observer) = &self.observer {
            observer(event);
        }
    }
}

impl ComponentLogger for Orchestrator {
    fn log_context(&self) -> LogContext {
        LogContext::new(
            "Orchestrator",
            &format!("{}:{}", self.settings.address, self.settings.port),
        )
    }
}
