//! Session configuration.
//!
//! Defaults match the reference firmware: a 50 ms read poll and the fixed
//! diagnostic text. A supervisor may load overrides from JSON:
//!
//! ```
//! use iotwire::SessionConfig;
//!
//! let config = SessionConfig::from_json(r#"{"poll_timeout_ms": 20}"#).unwrap();
//! assert_eq!(config.poll_timeout().as_millis(), 20);
//! assert_eq!(config.request_capacity, 4);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{IotwireError, Result};
use crate::protocol::{encode_error_report, ERROR_MESSAGE};
use crate::writer::SendBuffer;

/// Default read poll timeout in milliseconds.
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 50;

/// Default capacity of the telemetry request queue.
pub const DEFAULT_REQUEST_CAPACITY: usize = 4;

/// Default telemetry period used by the ticker.
pub const DEFAULT_TELEMETRY_PERIOD: Duration = Duration::from_millis(1000);

/// Configuration for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// How long one transport read waits before the loop checks the stop
    /// flag and pending requests again.
    pub poll_timeout_ms: u64,
    /// Telemetry requests that may wait for the session task.
    pub request_capacity: usize,
    /// Text of the `message` member in the error report.
    pub error_message: String,
}

impl SessionConfig {
    /// Parse and validate a JSON configuration. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns `Json` for malformed input and `Config` for values that
    /// fail [`SessionConfig::validate`].
    pub fn from_json(text: &str) -> Result<Self> {
        let config: SessionConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges, and that the error report fits the send buffer.
    pub fn validate(&self) -> Result<()> {
        if self.poll_timeout_ms == 0 {
            return Err(IotwireError::Config(
                "poll_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.request_capacity == 0 {
            return Err(IotwireError::Config(
                "request_capacity must be greater than 0".to_string(),
            ));
        }
        // The whole report, escapes and the widest code included, must fit
        // the send buffer.
        if encode_error_report(&mut SendBuffer::new(), &self.error_message, i32::MIN).is_err() {
            return Err(IotwireError::Config(format!(
                "error_message ({} bytes) does not fit the error report",
                self.error_message.len()
            )));
        }
        Ok(())
    }

    /// Read poll timeout.
    #[inline]
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            request_capacity: DEFAULT_REQUEST_CAPACITY,
            error_message: ERROR_MESSAGE.to_string(),
        }
    }
}
