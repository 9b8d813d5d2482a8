// src/lib.rs
pub mod config;
pub mod core;
pub mod device;
pub mod orchestrator;
pub mod session;
pub mod storage;
pub mod testing;
pub mod worker;

// Re-export die wichtigsten Typen
pub use crate::core::{
    translate, ComponentLogger, ErrorCode, ErrorEntry, EvidenceLog, LogContext, SoakError,
    StopSignal,
};
pub use device::{Credentials, DeviceClient, DeviceInfo, JpegParams, ReconnectPolicy, TimeoutPolicy};
pub use orchestrator::{EventObserver, Orchestrator, RunReport, RunSettings};
pub use session::{ConnectionPolicy, Session, SessionManager};
pub use storage::{CapturedFrame, RetentionStore};
pub use worker::{CaptureWorker, WorkerEvent, WorkerReport, WorkerState};
