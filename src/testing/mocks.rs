use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::core::{lock_mutex, ErrorCode};
use crate::device::{
    Credentials, DeviceClient, DeviceInfo, DeviceResult, JpegParams, ReconnectPolicy,
    SessionHandle, TimeoutPolicy,
};

/// In-process device with scriptable failures and call accounting.
///
/// Backs the `simulated` device backend of the binary as well as the tests.
pub struct MockDevice {
    info: DeviceInfo,
    capture_delay: Duration,
    fail_connect: Option<ErrorCode>,
    fail_authenticate: Option<ErrorCode>,
    reject_timeout: Option<ErrorCode>,
    reject_reconnect: Option<ErrorCode>,
    fail_logout: Option<ErrorCode>,
    codes_via_last_error: bool,
    capture_failures: HashMap<u32, ErrorCode>,

    initialized: AtomicBool,
    next_handle: AtomicI64,
    active_handle: Mutex<Option<SessionHandle>>,
    last_error: AtomicU32,

    connects: AtomicU64,
    logins: AtomicU64,
    logouts: AtomicU64,
    disconnects: AtomicU64,
    captures: Mutex<HashMap<u32, u64>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockDevice {
    pub fn new(info: DeviceInfo) -> Self {
        Self {
            info,
            capture_delay: Duration::ZERO,
            fail_connect: None,
            fail_authenticate: None,
            reject_timeout: None,
            reject_reconnect: None,
            fail_logout: None,
            codes_via_last_error: false,
            capture_failures: HashMap::new(),
            initialized: AtomicBool::new(false),
            next_handle: AtomicI64::new(0),
            active_handle: Mutex::new(None),
            last_error: AtomicU32::new(0),
            connects: AtomicU64::new(0),
            logins: AtomicU64::new(0),
            logouts: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
            captures: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_channels(start_channel: u8, channel_count: u8) -> Self {
        Self::new(DeviceInfo {
            serial_number: "MOCK0000000000".into(),
            start_channel,
            channel_count,
            ..Default::default()
        })
    }

    pub fn with_capture_delay(mut self, delay: Duration) -> Self {
        self.capture_delay = delay;
        self
    }

    pub fn fail_connect(mut self, code: ErrorCode) -> Self {
        self.fail_connect = Some(code);
        self
    }

    pub fn fail_authenticate(mut self, code: ErrorCode) -> Self {
        self.fail_authenticate = Some(code);
        self
    }

    pub fn reject_timeout_policy(mut self, code: ErrorCode) -> Self {
        self.reject_timeout = Some(code);
        self
    }

    pub fn reject_reconnect_policy(mut self, code: ErrorCode) -> Self {
        self.reject_reconnect = Some(code);
        self
    }

    pub fn fail_logout(mut self, code: ErrorCode) -> Self {
        self.fail_logout = Some(code);
        self
    }

    /// Failing calls return code 0 and leave the real code for
    /// `last_error_code`, like SDKs that only report a boolean.
    pub fn codes_via_last_error(mut self) -> Self {
        self.codes_via_last_error = true;
        self
    }

    /// Every capture on `channel` fails with `code`.
    pub fn fail_capture(mut self, channel: u32, code: ErrorCode) -> Self {
        self.capture_failures.insert(channel, code);
        self
    }

    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn logins(&self) -> u64 {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn logouts(&self) -> u64 {
        self.logouts.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> u64 {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn captures(&self, channel: u32) -> u64 {
        lock_mutex(&self.captures, "MockDevice::captures")
            .get(&channel)
            .copied()
            .unwrap_or(0)
    }

    /// Highest number of capture calls observed running at the same time.
    pub fn max_concurrent_captures(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, result: DeviceResult<()>) -> DeviceResult<()> {
        let code = match result {
            Ok(()) => ErrorCode::NO_ERROR,
            Err(code) => code,
        };
        self.last_error.store(code.0, Ordering::SeqCst);
        match result {
            Err(_) if self.codes_via_last_error => Err(ErrorCode::NO_ERROR),
            result => result,
        }
    }

    fn require_initialized(&self) -> DeviceResult<()> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ErrorCode::NOT_INITIALIZED)
        }
    }

    fn require_session(&self, session: SessionHandle) -> DeviceResult<()> {
        self.require_initialized()?;
        match *lock_mutex(&self.active_handle, "MockDevice::session") {
            Some(active) if active == session => Ok(()),
            _ => Err(ErrorCode::ORDER_ERROR),
        }
    }

    fn fake_jpeg(channel: u32, count: u64) -> Vec<u8> {
        let mut payload = vec![0xFF, 0xD8];
        payload.extend_from_slice(&channel.to_be_bytes());
        payload.extend_from_slice(&count.to_be_bytes());
        payload.extend_from_slice(&[0xFF, 0xD9]);
        payload
    }
}

impl DeviceClient for MockDevice {
    fn connect(&self) -> DeviceResult<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let result = match self.fail_connect {
            Some(code) => Err(code),
            None => {
                self.initialized.store(true, Ordering::SeqCst);
                Ok(())
            }
        };
        self.record(result)
    }

    fn sdk_version(&self) -> String {
        "mock-5.3.0".to_string()
    }

    fn set_timeout_policy(&self, _policy: &TimeoutPolicy) -> DeviceResult<()> {
        let result = self.require_initialized().and_then(|()| match self.reject_timeout {
            Some(code) => Err(code),
            None => Ok(()),
        });
        self.record(result)
    }

    fn set_reconnect_policy(&self, _policy: &ReconnectPolicy) -> DeviceResult<()> {
        let result = self.require_initialized().and_then(|()| match self.reject_reconnect {
            Some(code) => Err(code),
            None => Ok(()),
        });
        self.record(result)
    }

    fn authenticate(
        &self,
        _address: &str,
        _port: u16,
        _credentials: &Credentials,
    ) -> DeviceResult<(SessionHandle, DeviceInfo)> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        let result = self.require_initialized().and_then(|()| match self.fail_authenticate {
            Some(code) => Err(code),
            None => Ok(()),
        });
        self.record(result)?;

        let handle = SessionHandle::new(self.next_handle.fetch_add(1, Ordering::SeqCst));
        *lock_mutex(&self.active_handle, "MockDevice::session") = Some(handle);
        Ok((handle, self.info.clone()))
    }

    fn capture_snapshot(
        &self,
        session: SessionHandle,
        channel: u32,
        _params: &JpegParams,
    ) -> DeviceResult<Vec<u8>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.capture_delay.is_zero() {
            std::thread::sleep(self.capture_delay);
        }

        let result = self.require_session(session).and_then(|()| {
            match self.capture_failures.get(&channel) {
                Some(code) => Err(*code),
                None => Ok(()),
            }
        });
        let count = {
            let mut captures = lock_mutex(&self.captures, "MockDevice::captures");
            let count = captures.entry(channel).or_insert(0);
            *count += 1;
            *count
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.record(result)?;
        Ok(Self::fake_jpeg(channel, count))
    }

    fn deauthenticate(&self, session: SessionHandle) -> DeviceResult<()> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        let result = self.require_session(session).and_then(|()| match self.fail_logout {
            Some(code) => Err(code),
            None => Ok(()),
        });
        if result.is_ok() {
            *lock_mutex(&self.active_handle, "MockDevice::session") = None;
        }
        self.record(result)
    }

    fn disconnect(&self) -> DeviceResult<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        let result = self.require_initialized();
        self.initialized.store(false, Ordering::SeqCst);
        self.record(result)
    }

    fn last_error_code(&self) -> ErrorCode {
        ErrorCode(self.last_error.load(Ordering::SeqCst))
    }
}
