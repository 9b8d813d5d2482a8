// src/core/error.rs
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// Raw status code reported by the device client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ErrorCode(pub u32);

impl ErrorCode {
    pub const NO_ERROR: ErrorCode = ErrorCode(0);
    pub const NOT_INITIALIZED: ErrorCode = ErrorCode(3);
    pub const NETWORK_FAIL_CONNECT: ErrorCode = ErrorCode(7);
    pub const NETWORK_RECV_TIMEOUT: ErrorCode = ErrorCode(10);
    pub const ORDER_ERROR: ErrorCode = ErrorCode(12);
    pub const CREATE_FILE_ERROR: ErrorCode = ErrorCode(34);
    pub const LOAD_DEPENDENCY_FAILED: ErrorCode = ErrorCode(84);
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

const ERROR_TABLE: &[(u32, &str)] = &[
    (0, "No error"),
    (3, "SDK is not initialized"),
    (
        7,
        "Failed to connect to the device. The device is off-line, or connection timeout caused by network",
    ),
    (10, "Timeout when receiving the data from the device"),
    (12, "API calling order error"),
    (
        34,
        "Failed to create a file, during local recording, saving picture, getting configuration file or downloading record file",
    ),
    (84, "Load StreamTransClient.dll failed"),
];

/// Entry of the closed error taxonomy.
///
/// Codes outside the table are not a lookup fault: they map to
/// [`ErrorEntry::Unknown`], which keeps the raw code for diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorEntry {
    Known { code: u32, message: &'static str },
    Unknown { code: u32 },
}

impl ErrorEntry {
    pub fn code(&self) -> ErrorCode {
        match self {
            ErrorEntry::Known { code, .. } | ErrorEntry::Unknown { code } => ErrorCode(*code),
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ErrorEntry::Known { message, .. } => *message,
            ErrorEntry::Unknown { .. } => "Unknown error code",
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, ErrorEntry::Unknown { .. })
    }
}

impl fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message(), self.code())
    }
}

/// Error Translator: device status code to taxonomy entry.
pub fn translate(code: ErrorCode) -> ErrorEntry {
    ERROR_TABLE
        .iter()
        .find(|(known, _)| *known == code.0)
        .map(|(code, message)| ErrorEntry::Known {
            code: *code,
            message: *message,
        })
        .unwrap_or(ErrorEntry::Unknown { code: code.0 })
}

#[derive(Debug, thiserror::Error)]
pub enum SoakError {
    #[error("device initialization failed: {0}")]
    SessionInitFailure(ErrorEntry),

    #[error("authentication failed: {0}")]
    AuthenticationFailure(ErrorEntry),

    #[error("timeout policy rejected: {0}")]
    TimeoutPolicyRejected(String),

    #[error("reconnect policy rejected: {0}")]
    ReconnectPolicyRejected(String),

    #[error("capture failed on channel {channel}: {entry}")]
    CaptureFailure { channel: u32, entry: ErrorEntry },

    #[error("failed to persist {}: {source}", path.display())]
    PersistFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("session teardown failed: {0}")]
    TeardownFailure(ErrorEntry),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SoakError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes_translate() {
        let entry = translate(ErrorCode::NETWORK_FAIL_CONNECT);
        assert_eq!(entry.code(), ErrorCode(7));
        assert!(entry.message().starts_with("Failed to connect to the device"));
        assert!(!entry.is_unknown());

        for code in [0, 3, 7, 10, 12, 34, 84] {
            assert!(!translate(ErrorCode(code)).is_unknown(), "code {}", code);
        }
    }

    #[test]
    fn test_unknown_code_is_distinct_entry() {
        let entry = translate(ErrorCode(999));
        assert_eq!(entry, ErrorEntry::Unknown { code: 999 });
        assert_eq!(entry.code(), ErrorCode(999));
        assert!(entry.to_string().contains("999"));
        assert!(entry.to_string().contains("Unknown error code"));
    }

    #[test]
    fn test_fatal_errors_carry_translated_message() {
        let err = SoakError::AuthenticationFailure(translate(ErrorCode(7)));
        let text = err.to_string();
        assert!(text.contains("Failed to connect to the device"));
        assert!(text.contains("code 7"));
    }
}
