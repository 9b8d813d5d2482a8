use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{Result, SoakError};
use crate::device::{Credentials, JpegParams, ReconnectPolicy, TimeoutPolicy};
use crate::orchestrator::{duration_from_hours, CaptureSettings, RunSettings};
use crate::session::ConnectionPolicy;
use crate::storage::DEFAULT_RETENTION_WINDOW;

// ---------- Device ----------
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeviceBackend {
    #[default]
    Simulated,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DeviceConfig {
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub backend: DeviceBackend,
    #[serde(default)]
    pub simulated: SimulatedDeviceConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SimulatedDeviceConfig {
    #[serde(default = "default_start_channel")]
    pub start_channel: u8,
    #[serde(default = "default_channel_count")]
    pub channel_count: u8,
    #[serde(default)]
    pub capture_delay_ms: u64,
}

impl Default for SimulatedDeviceConfig {
    fn default() -> Self {
        Self {
            start_channel: default_start_channel(),
            channel_count: default_channel_count(),
            capture_delay_ms: 0,
        }
    }
}

// ---------- Run ----------
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RunConfig {
    /// Fractional hours, e.g. `0.0066` for a short smoke run.
    pub duration_hours: f64,
}

// ---------- Policy ----------
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PolicyConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u32,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u32,
    #[serde(default = "default_true")]
    pub reconnect_enabled: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            connect_attempts: default_connect_attempts(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            reconnect_enabled: true,
        }
    }
}

// ---------- Capture ----------
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CaptureConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_retention_window")]
    pub retention_window: u64,
    #[serde(default = "default_pic_param")]
    pub pic_size: u16,
    #[serde(default = "default_pic_param")]
    pub pic_quality: u16,
    #[serde(default)]
    pub serialize_calls: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            retention_window: default_retention_window(),
            pic_size: default_pic_param(),
            pic_quality: default_pic_param(),
            serialize_calls: false,
        }
    }
}

// ---------- Paths ----------
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_capture_dir")]
    pub capture_dir: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            capture_dir: default_capture_dir(),
            log_dir: default_log_dir(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub device: DeviceConfig,
    pub run: RunConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

fn default_port() -> u16 {
    8000
}
fn default_start_channel() -> u8 {
    1
}
fn default_channel_count() -> u8 {
    16
}
fn default_connect_timeout_ms() -> u32 {
    2_000
}
fn default_connect_attempts() -> u32 {
    2
}
fn default_reconnect_interval_ms() -> u32 {
    100
}
fn default_true() -> bool {
    true
}
fn default_interval_ms() -> u64 {
    180
}
fn default_retention_window() -> u64 {
    DEFAULT_RETENTION_WINDOW
}
fn default_pic_param() -> u16 {
    2
}
fn default_capture_dir() -> PathBuf {
    PathBuf::from("capture")
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

pub fn load(path: &str) -> anyhow::Result<Config> {
    let txt = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&txt)?)
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        duration_from_hours(self.run.duration_hours)?;
        TimeoutPolicy::new(self.policy.connect_timeout_ms, self.policy.connect_attempts)?;
        if self.capture.retention_window == 0 {
            return Err(SoakError::Config(
                "capture.retention_window must be at least 1".into(),
            ));
        }
        if self.device.address.trim().is_empty() {
            return Err(SoakError::Config("device.address is empty".into()));
        }
        Ok(())
    }

    pub fn run_settings(&self) -> Result<RunSettings> {
        self.validate()?;
        Ok(RunSettings {
            address: self.device.address.clone(),
            port: self.device.port,
            credentials: Credentials::new(&self.device.username, &self.device.password),
            duration: duration_from_hours(self.run.duration_hours)?,
            policy: ConnectionPolicy {
                timeout: TimeoutPolicy::new(
                    self.policy.connect_timeout_ms,
                    self.policy.connect_attempts,
                )?,
                reconnect: ReconnectPolicy {
                    interval_ms: self.policy.reconnect_interval_ms,
                    enabled: self.policy.reconnect_enabled,
                },
            },
            capture: CaptureSettings {
                interval: Duration::from_millis(self.capture.interval_ms),
                retention_window: self.capture.retention_window,
                jpeg: JpegParams {
                    pic_size: self.capture.pic_size,
                    pic_quality: self.capture.pic_quality,
                },
                serialize_calls: self.capture.serialize_calls,
            },
            capture_dir: self.paths.capture_dir.clone(),
            log_dir: self.paths.log_dir.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [device]
        address = "10.78.203.159"
        username = "admin"
        password = "12345"

        [run]
        duration_hours = 0.0066
    "#;

    #[test]
    fn test_defaults_applied() {
        let cfg: Config = toml::from_str(MINIMAL).unwrap();
        assert_eq!(cfg.device.port, 8000);
        assert_eq!(cfg.device.backend, DeviceBackend::Simulated);
        assert_eq!(cfg.device.simulated.channel_count, 16);
        assert_eq!(cfg.policy.connect_timeout_ms, 2_000);
        assert_eq!(cfg.policy.connect_attempts, 2);
        assert!(cfg.policy.reconnect_enabled);
        assert_eq!(cfg.capture.interval_ms, 180);
        assert_eq!(cfg.capture.retention_window, 3);

        let settings = cfg.run_settings().unwrap();
        assert_eq!(settings.capture.interval, Duration::from_millis(180));
        assert_eq!(settings.policy.timeout.timeout_ms(), 2_000);
        assert_eq!(settings.log_dir, PathBuf::from("logs"));
    }

    #[test]
    fn test_rejects_bad_timeout() {
        let mut cfg: Config = toml::from_str(MINIMAL).unwrap();
        cfg.policy.connect_timeout_ms = 100;
        assert!(matches!(
            cfg.validate(),
            Err(SoakError::TimeoutPolicyRejected(_))
        ));
    }

    #[test]
    fn test_rejects_zero_duration_and_window() {
        let mut cfg: Config = toml::from_str(MINIMAL).unwrap();
        cfg.run.duration_hours = 0.0;
        assert!(matches!(cfg.validate(), Err(SoakError::Config(_))));

        let mut cfg: Config = toml::from_str(MINIMAL).unwrap();
        cfg.capture.retention_window = 0;
        assert!(matches!(cfg.validate(), Err(SoakError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapsoak.toml");
        std::fs::write(&path, MINIMAL).unwrap();

        let cfg = load(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.device.address, "10.78.203.159");
        assert!(load(dir.path().join("missing.toml").to_str().unwrap()).is_err());
    }
}
