// src/storage/mod.rs
use std::fs::{self, File};
use std::io::{self, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::core::{EvidenceLog, Result, SoakError};

/// Frames kept per channel: the current one plus the two before it.
pub const DEFAULT_RETENTION_WINDOW: u64 = 3;

/// One snapshot as handed from a worker to the store.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub sequence: u64,
    pub captured_at: DateTime<Local>,
    pub payload: Vec<u8>,
}

impl CapturedFrame {
    pub fn new(sequence: u64, payload: Vec<u8>) -> Self {
        Self {
            sequence,
            captured_at: Local::now(),
            payload,
        }
    }
}

/// Per-channel bounded snapshot directories under one capture root.
///
/// Layout: `<capture_dir>/<channel>/<channel>_<sequence>.jpeg` and
/// `<log_dir>/<channel>chan.log`. Each channel directory is only ever
/// touched by that channel's worker.
#[derive(Debug, Clone)]
pub struct RetentionStore {
    capture_dir: PathBuf,
    log_dir: PathBuf,
    window: u64,
}

impl RetentionStore {
    pub fn new(capture_dir: impl Into<PathBuf>, log_dir: impl Into<PathBuf>, window: u64) -> Self {
        Self {
            capture_dir: capture_dir.into(),
            log_dir: log_dir.into(),
            window: window.max(1),
        }
    }

    pub fn window(&self) -> u64 {
        self.window
    }

    /// Creates capture and log locations for every channel. Safe to repeat.
    pub fn provision(&self, channels: Range<u32>) -> Result<()> {
        fs::create_dir_all(&self.log_dir)?;
        for channel in channels {
            fs::create_dir_all(self.channel_dir(channel))?;
            let log_path = self.channel_log_path(channel);
            let mut log = EvidenceLog::append(&log_path)?;
            log.info(&format!("{} created", log_path.display()));
        }
        Ok(())
    }

    pub fn channel_dir(&self, channel: u32) -> PathBuf {
        self.capture_dir.join(channel.to_string())
    }

    pub fn channel_log_path(&self, channel: u32) -> PathBuf {
        self.log_dir.join(format!("{}chan.log", channel))
    }

    pub fn frame_path(&self, channel: u32, sequence: u64) -> PathBuf {
        // zero-padded so a plain directory listing sorts in capture order
        self.channel_dir(channel)
            .join(format!("{}_{:08}.jpeg", channel, sequence))
    }

    /// Writes and syncs the frame, returning its path.
    pub fn persist(&self, channel: u32, frame: &CapturedFrame) -> Result<PathBuf> {
        let path = self.frame_path(channel, frame.sequence);
        write_durable(&path, &frame.payload).map_err(|source| SoakError::PersistFailure {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Deletes the frame that just fell out of the window behind
    /// `current_sequence`. An already missing file is not an error.
    ///
    /// Returns the removed path, if a file was removed.
    ///
    /// With `retention_window = 2` the deleted frame is the one two
    /// sequence numbers behind, leaving only `{k, k-1}` on disk.
    pub fn prune(&self, channel: u32, current_sequence: u64) -> io::Result<Option<PathBuf>> {
        if current_sequence <= self.window {
            return Ok(None);
        }
        let path = self.frame_path(channel, current_sequence - self.window);
        match fs::remove_file(&path) {
            Ok(()) => Ok(Some(path)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn write_durable(path: &Path, payload: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(payload)?;
    file.sync_all()
}
