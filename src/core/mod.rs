pub mod error;
pub mod lock;
pub mod logging;
pub mod stop;

pub use error::{translate, ErrorCode, ErrorEntry, Result, SoakError};
pub use lock::lock_mutex;
pub use logging::{utc_ns_now, ComponentLogger, EvidenceLog, LogContext};
pub use stop::{RaiseOnDrop, StopSignal};
