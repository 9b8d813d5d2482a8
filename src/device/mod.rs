// src/device/mod.rs
//! Capability surface of the external device client.
//!
//! The wire protocol lives behind [`DeviceClient`]; this crate only sequences
//! calls against it. Every fallible call reports the device's status code in
//! its `Err` value, which callers hand to [`crate::core::translate`].

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::core::{ErrorCode, Result, SoakError};

pub type DeviceResult<T> = std::result::Result<T, ErrorCode>;

pub const MIN_CONNECT_TIMEOUT_MS: u32 = 300;
pub const MAX_CONNECT_TIMEOUT_MS: u32 = 75_000;

pub trait DeviceClient: Send + Sync {
    /// Initializes the client library. Must precede every other call.
    fn connect(&self) -> DeviceResult<()>;

    fn sdk_version(&self) -> String;

    fn set_timeout_policy(&self, policy: &TimeoutPolicy) -> DeviceResult<()>;

    fn set_reconnect_policy(&self, policy: &ReconnectPolicy) -> DeviceResult<()>;

    fn authenticate(
        &self,
        address: &str,
        port: u16,
        credentials: &Credentials,
    ) -> DeviceResult<(SessionHandle, DeviceInfo)>;

    /// Pulls one still image. May be called concurrently for different
    /// channels on the same session.
    fn capture_snapshot(
        &self,
        session: SessionHandle,
        channel: u32,
        params: &JpegParams,
    ) -> DeviceResult<Vec<u8>>;

    fn deauthenticate(&self, session: SessionHandle) -> DeviceResult<()>;

    /// Releases the state set up by [`DeviceClient::connect`].
    fn disconnect(&self) -> DeviceResult<()>;

    /// Status of the most recent call made through this client.
    fn last_error_code(&self) -> ErrorCode;
}

/// Opaque login handle issued by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(i64);

impl SessionHandle {
    pub fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> i64 {
        self.0
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Connection timeout and attempt count, validated on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeoutPolicy {
    timeout_ms: u32,
    attempts: u32,
}

impl TimeoutPolicy {
    pub fn new(timeout_ms: u32, attempts: u32) -> Result<Self> {
        if !(MIN_CONNECT_TIMEOUT_MS..=MAX_CONNECT_TIMEOUT_MS).contains(&timeout_ms) {
            return Err(SoakError::TimeoutPolicyRejected(format!(
                "timeout {}ms outside [{}, {}]",
                timeout_ms, MIN_CONNECT_TIMEOUT_MS, MAX_CONNECT_TIMEOUT_MS
            )));
        }
        if attempts == 0 {
            return Err(SoakError::TimeoutPolicyRejected(
                "attempt count must be at least 1".into(),
            ));
        }
        Ok(Self {
            timeout_ms,
            attempts,
        })
    }

    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: 2_000,
            attempts: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    pub interval_ms: u32,
    pub enabled: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            enabled: true,
        }
    }
}

/// Picture size and quality indices passed with every capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JpegParams {
    pub pic_size: u16,
    pub pic_quality: u16,
}

impl Default for JpegParams {
    fn default() -> Self {
        Self {
            pic_size: 2,
            pic_quality: 2,
        }
    }
}

/// Device descriptor returned by a successful login. Read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub serial_number: String,
    pub alarm_in_ports: u8,
    pub alarm_out_ports: u8,
    pub disk_count: u8,
    pub device_type: u8,
    pub channel_count: u8,
    pub start_channel: u8,
    pub audio_channel_count: u8,
    pub ip_channel_count: u8,
    pub zero_channel_count: u8,
    pub main_protocol: u8,
    pub sub_protocol: u8,
    pub support_flags: [u8; 5],
    pub device_model: u16,
    pub multi_stream_protocol: u8,
    pub start_digital_channel: u8,
    pub start_talk_channel: u8,
    pub high_digital_channel_count: u8,
}

impl DeviceInfo {
    /// Analog channel indices `[start_channel, start_channel + channel_count)`.
    pub fn channels(&self) -> Range<u32> {
        let start = u32::from(self.start_channel);
        start..start + u32::from(self.channel_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_policy_accepts_range_bounds() {
        for timeout in [300, 301, 2_000, 74_999, 75_000] {
            for attempts in [1, 2, 10] {
                let policy = TimeoutPolicy::new(timeout, attempts).unwrap();
                assert_eq!(policy.timeout_ms(), timeout);
                assert_eq!(policy.attempts(), attempts);
            }
        }
    }

    #[test]
    fn test_timeout_policy_rejects_out_of_range() {
        for timeout in [0, 299, 75_001, u32::MAX] {
            let err = TimeoutPolicy::new(timeout, 1).unwrap_err();
            assert!(matches!(err, SoakError::TimeoutPolicyRejected(_)));
        }
        assert!(matches!(
            TimeoutPolicy::new(2_000, 0),
            Err(SoakError::TimeoutPolicyRejected(_))
        ));
    }

    #[test]
    fn test_channel_range() {
        let info = DeviceInfo {
            start_channel: 1,
            channel_count: 4,
            ..Default::default()
        };
        assert_eq!(info.channels().collect::<Vec<_>>(), vec![1, 2, 3, 4]);

        let empty = DeviceInfo::default();
        assert_eq!(empty.channels().count(), 0);
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = Credentials::new("admin", "12345");
        let text = format!("{:?}", creds);
        assert!(text.contains("admin"));
        assert!(!text.contains("12345"));
    }
}
