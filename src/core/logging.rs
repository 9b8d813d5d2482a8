// src/core/logging.rs
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

// Globale Sequenznummer für Korrelation
static LOG_SEQUENCE: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
pub struct LogContext {
    pub component: String,
    pub instance_id: String,
    pub channel: Option<u32>,
    pub sequence: u64,
    pub timestamp_ns: u64,
}

impl LogContext {
    pub fn new(component: &str, instance_id: &str) -> Self {
        Self {
            component: component.to_string(),
            instance_id: instance_id.to_string(),
            channel: None,
            sequence: LOG_SEQUENCE.fetch_add(1, Ordering::Relaxed),
            timestamp_ns: utc_ns_now(),
        }
    }

    pub fn with_channel(mut self, channel: u32) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn format(&self, level: &str, message: &str) -> String {
        let channel_info = match self.channel {
            Some(channel) => format!(" chan={}", channel),
            None => String::new(),
        };

        format!(
            "[{}][seq={:06}][{}:{}{}] {}",
            level, self.sequence, self.component, self.instance_id, channel_info, message
        )
    }
}

// Helper Trait für einheitliches Logging
pub trait ComponentLogger {
    fn log_context(&self) -> LogContext;

    fn debug(&self, message: &str) {
        log::debug!("{}", self.log_context().format("DEBUG", message));
    }

    fn info(&self, message: &str) {
        log::info!("{}", self.log_context().format("INFO", message));
    }

    fn warn(&self, message: &str) {
        log::warn!("{}", self.log_context().format("WARN", message));
    }

    fn error(&self, message: &str) {
        log::error!("{}", self.log_context().format("ERROR", message));
    }
}

/// On-disk evidence log (`<timestamp>|<LEVEL>|<message>` per line).
///
/// The run log and every `<channel>chan.log` are written through this type.
/// Write failures are reported through the `log` facade and otherwise
/// ignored: losing a diagnostic line must never stop a capture loop.
pub struct EvidenceLog {
    path: PathBuf,
    file: File,
}

impl EvidenceLog {
    /// Creates (or truncates) the file at `path`.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self { path, file })
    }

    /// Opens `path` for appending, creating it if missing.
    pub fn append(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&mut self, message: &str) {
        self.line("INFO", message);
    }

    pub fn warn(&mut self, message: &str) {
        self.line("WARN", message);
    }

    pub fn error(&mut self, message: &str) {
        self.line("ERROR", message);
    }

    fn line(&mut self, level: &str, message: &str) {
        let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.6f");
        if let Err(e) = writeln!(self.file, "{}|{}|{}", stamp, level, message) {
            log::warn!("[evidence] write to {:?} failed: {}", self.path, e);
        }
    }
}

// Utils
pub fn utc_ns_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
