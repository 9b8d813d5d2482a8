// src/session/mod.rs
use std::sync::Arc;

use crate::core::{
    ComponentLogger, ErrorCode, ErrorEntry, EvidenceLog, LogContext, Result, SoakError, translate,
};
use crate::device::{
    Credentials, DeviceClient, DeviceInfo, DeviceResult, JpegParams, ReconnectPolicy,
    SessionHandle, TimeoutPolicy,
};

/// Connection policy applied before login. Fixed for the session lifetime.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionPolicy {
    pub timeout: TimeoutPolicy,
    pub reconnect: ReconnectPolicy,
}

/// Sequences initialize → policies → login, all-or-nothing.
pub struct SessionManager {
    client: Arc<dyn DeviceClient>,
}

impl SessionManager {
    pub fn new(client: Arc<dyn DeviceClient>) -> Self {
        Self { client }
    }

    /// Opens the single authenticated session.
    ///
    /// On any failure the client is released again before returning, so no
    /// half-initialized session is ever observable.
    pub fn open(
        &self,
        address: &str,
        port: u16,
        credentials: &Credentials,
        policy: ConnectionPolicy,
        run_log: &mut EvidenceLog,
    ) -> Result<Session> {
        if let Err(code) = self.client.connect() {
            let entry = self.entry_for(code);
            run_log.error(&format!(
                "SDK initialization failed. Error message: {}",
                entry
            ));
            return Err(SoakError::SessionInitFailure(entry));
        }
        run_log.info("SDK initialized successfully");
        run_log.info(&format!("SDK version {}", self.client.sdk_version()));

        match self.configure_and_login(address, port, credentials, policy, run_log) {
            Ok((handle, info)) => {
                let session = Session {
                    client: self.client.clone(),
                    handle,
                    device: info,
                    policy,
                    address: format!("{}:{}", address, port),
                    closed: false,
                };
                session.info(&format!(
                    "logged in, channels {:?}",
                    session.device.channels()
                ));
                Ok(session)
            }
            Err(err) => {
                match self.client.disconnect() {
                    Ok(()) => run_log.info("SDK released after failed session setup"),
                    Err(code) => run_log.error(&format!(
                        "SDK release failed. Error message: {}",
                        self.entry_for(code)
                    )),
                }
                Err(err)
            }
        }
    }

    fn configure_and_login(
        &self,
        address: &str,
        port: u16,
        credentials: &Credentials,
        policy: ConnectionPolicy,
        run_log: &mut EvidenceLog,
    ) -> Result<(SessionHandle, DeviceInfo)> {
        let timeout = policy.timeout;
        if let Err(code) = self.client.set_timeout_policy(&timeout) {
            let entry = self.entry_for(code);
            run_log.error(&format!("Set connect time failed. Error message: {}", entry));
            return Err(SoakError::TimeoutPolicyRejected(entry.to_string()));
        }
        run_log.info(&format!(
            "Set connect time-{}:{}",
            timeout.timeout_ms(),
            timeout.attempts()
        ));

        let reconnect = policy.reconnect;
        if let Err(code) = self.client.set_reconnect_policy(&reconnect) {
            let entry = self.entry_for(code);
            run_log.error(&format!("Set reconnect time failed. Error message: {}", entry));
            return Err(SoakError::ReconnectPolicyRejected(entry.to_string()));
        }
        run_log.info(&format!(
            "Set reconnect time-{}:{}",
            reconnect.interval_ms, reconnect.enabled
        ));

        match self.client.authenticate(address, port, credentials) {
            Ok((handle, info)) => {
                run_log.info("Logged in successfully");
                if let Ok(json) = serde_json::to_string(&info) {
                    run_log.info(&format!("Device info {}", json));
                }
                Ok((handle, info))
            }
            Err(code) => {
                let entry = self.entry_for(code);
                run_log.error(&format!("Login failed. Error message: {}", entry));
                Err(SoakError::AuthenticationFailure(entry))
            }
        }
    }

    fn entry_for(&self, reported: ErrorCode) -> ErrorEntry {
        translate(resolve_code(self.client.as_ref(), reported))
    }
}

/// Clients that fail without a code leave the real one in `last_error_code`.
fn resolve_code(client: &dyn DeviceClient, reported: ErrorCode) -> ErrorCode {
    if reported == ErrorCode::NO_ERROR {
        client.last_error_code()
    } else {
        reported
    }
}

/// One authenticated connection. The handle never leaves this type.
///
/// Teardown happens exactly once: through [`Session::close`], or from `Drop`
/// if the owner unwinds before reaching it.
pub struct Session {
    client: Arc<dyn DeviceClient>,
    handle: SessionHandle,
    device: DeviceInfo,
    policy: ConnectionPolicy,
    address: String,
    closed: bool,
}

impl Session {
    pub fn device_info(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn policy(&self) -> ConnectionPolicy {
        self.policy
    }

    /// Capture call shared read-only by all channel workers.
    pub fn capture(&self, channel: u32, params: &JpegParams) -> std::result::Result<Vec<u8>, ErrorEntry> {
        self.client
            .capture_snapshot(self.handle, channel, params)
            .map_err(|code| translate(resolve_code(self.client.as_ref(), code)))
    }

    /// Logs out, then releases the client. Both steps always run; the first
    /// failure is returned.
    pub fn close(mut self, run_log: &mut EvidenceLog) -> Result<()> {
        let (logout, release) = self.teardown();

        match logout {
            Ok(()) => run_log.info("Logged out successfully"),
            Err(entry) => run_log.error(&format!("Logout failed. Error message: {}", entry)),
        }
        match release {
            Ok(()) => run_log.info("SDK released successfully"),
            Err(entry) => run_log.error(&format!("SDK release failed. Error message: {}", entry)),
        }

        logout.and(release).map_err(SoakError::TeardownFailure)
    }

    fn teardown(&mut self) -> (std::result::Result<(), ErrorEntry>, std::result::Result<(), ErrorEntry>) {
        assert!(!self.closed, "session {} torn down twice", self.address);
        self.closed = true;

        let translate_err = |r: DeviceResult<()>| {
            r.map_err(|code| translate(resolve_code(self.client.as_ref(), code)))
        };
        let logout = translate_err(self.client.deauthenticate(self.handle));
        let release = translate_err(self.client.disconnect());
        self.info("session closed");
        (logout, release)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.warn("session dropped without close, tearing down");
        let (logout, release) = self.teardown();
        if let Err(entry) = logout.and(release) {
            self.error(&format!("teardown on drop failed: {}", entry));
        }
    }
}

impl ComponentLogger for Session {
    fn log_context(&self) -> LogContext {
        LogContext::new("Session", &self.address)
    }
}
