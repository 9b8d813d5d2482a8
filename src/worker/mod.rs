// src/worker/mod.rs
use std::sync::Mutex;
use std::time::Duration;

use crossbeam::channel::Sender;
use serde::Serialize;

use crate::core::{
    lock_mutex, ComponentLogger, ErrorEntry, EvidenceLog, LogContext, Result, SoakError,
    StopSignal,
};
use crate::device::JpegParams;
use crate::session::Session;
use crate::storage::{CapturedFrame, RetentionStore};

/// Pause between two capture iterations.
pub const DEFAULT_CAPTURE_INTERVAL: Duration = Duration::from_millis(180);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkerState {
    Starting,
    Looping,
    Stopping,
    Stopped,
}

/// Lifecycle notification sent to the orchestrator.
#[derive(Debug, Clone)]
pub struct WorkerEvent {
    pub channel: u32,
    pub state: WorkerState,
    pub detail: Option<String>,
}

/// Everything one channel worker needs, handed over at spawn time.
pub struct WorkerParams<'a> {
    pub session: &'a Session,
    pub store: &'a RetentionStore,
    pub channel: u32,
    pub jpeg: JpegParams,
    pub interval: Duration,
    pub stop: StopSignal,
    /// Set when the device client cannot take concurrent captures.
    pub capture_gate: Option<&'a Mutex<()>>,
    pub events: Sender<WorkerEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerReport {
    pub channel: u32,
    pub state: WorkerState,
    pub iterations: u64,
    pub captures: u64,
    pub capture_failures: u64,
    pub prune_failures: u64,
    pub persist_failure: Option<String>,
}

impl WorkerReport {
    fn new(channel: u32) -> Self {
        Self {
            channel,
            state: WorkerState::Starting,
            iterations: 0,
            captures: 0,
            capture_failures: 0,
            prune_failures: 0,
            persist_failure: None,
        }
    }

    /// Report for a worker whose thread died without returning one.
    pub fn aborted(channel: u32, reason: &str) -> Self {
        Self {
            state: WorkerState::Stopped,
            persist_failure: Some(reason.to_string()),
            ..Self::new(channel)
        }
    }
}

pub struct CaptureWorker<'a> {
    params: WorkerParams<'a>,
    log: EvidenceLog,
    sequence: u64,
    report: WorkerReport,
}

impl<'a> CaptureWorker<'a> {
    /// `Starting`: opens the channel log for appending.
    pub fn new(params: WorkerParams<'a>) -> Result<Self> {
        let mut log = EvidenceLog::append(params.store.channel_log_path(params.channel))?;
        log.info(&format!("Thread started for {}", params.channel));
        let report = WorkerReport::new(params.channel);
        Ok(Self {
            params,
            log,
            sequence: 0,
            report,
        })
    }

    pub fn state(&self) -> WorkerState {
        self.report.state
    }

    /// Runs until the stop signal is seen at an iteration boundary or the
    /// store fails to persist a frame.
    pub fn run(mut self) -> WorkerReport {
        self.transition(WorkerState::Looping, None);

        while self.report.state == WorkerState::Looping {
            if self.params.stop.is_raised() {
                self.transition(WorkerState::Stopping, None);
                break;
            }

            if let Err(e) = self.iterate() {
                let message = e.to_string();
                self.log.error(&format!("Stopping capture: {}", message));
                self.error(&message);
                self.report.persist_failure = Some(message.clone());
                self.transition(WorkerState::Stopping, Some(message));
                break;
            }

            // Video status evaluation of the retained frames hooks in here.

            self.params.stop.wait_timeout(self.params.interval);
        }

        self.log
            .info(&format!("Thread stopped for {}", self.params.channel));
        self.transition(WorkerState::Stopped, None);
        self.report
    }

    fn iterate(&mut self) -> Result<()> {
        self.sequence += 1;
        self.report.iterations += 1;
        let channel = self.params.channel;

        match self.capture() {
            Ok(payload) => {
                let frame = CapturedFrame::new(self.sequence, payload);
                let path = self.params.store.persist(channel, &frame)?;
                self.report.captures += 1;
                self.log.info(&format!(
                    "Picture captured successfully at {}",
                    path.display()
                ));
            }
            Err(entry) => {
                self.report.capture_failures += 1;
                self.log.error(&format!(
                    "Picture capture failed. Error message: {}",
                    entry
                ));
                let failure = SoakError::CaptureFailure { channel, entry };
                self.debug(&format!("iteration {}: {}", self.sequence, failure));
            }
        }

        // Runs after failed captures too, so the on-disk window stays bounded.
        if let Err(e) = self.params.store.prune(channel, self.sequence) {
            self.report.prune_failures += 1;
            self.log.warn(&format!("Prune failed: {}", e));
        }
        Ok(())
    }

    fn capture(&self) -> std::result::Result<Vec<u8>, ErrorEntry> {
        let _serialized = self
            .params
            .capture_gate
            .map(|gate| lock_mutex(gate, "CaptureWorker::capture"));
        self.params.session.capture(self.params.channel, &self.params.jpeg)
    }

    fn transition(&mut self, state: WorkerState, detail: Option<String>) {
        self.report.state = state;
        self.debug(&format!("state {:?}", state));
        // Orchestrator may already be past listening; the report still carries the state.
        let _ = self.params.events.send(WorkerEvent {
            channel: self.params.channel,
            state,
            detail,
        });
    }
}

impl ComponentLogger for CaptureWorker<'_> {
    fn log_context(&self) -> LogContext {
        LogContext::new("CaptureWorker", &format!("chan-{}", self.params.channel))
            .with_channel(self.params.channel)
    }
}
