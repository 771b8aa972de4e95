//! Outbound object encoder.
//!
//! Builds one compact JSON object into a [`SendBuffer`]:
//!
//! ```text
//! begin_object ─► (set_name ─► set_<value>)* ─► end_object ─► commit
//! ```
//!
//! Names and scalar values are formatted with `serde_json`, so strings are
//! escaped exactly as any JSON peer expects. The encoder performs no I/O.
//!
//! Errors are sticky: the first failure (overflow, a value without a name,
//! an unclosed object) is kept, later calls are ignored, and `commit`
//! reports it and empties the buffer.
//!
//! # Example
//!
//! ```
//! use iotwire::protocol::ObjectEncoder;
//! use iotwire::writer::SendBuffer;
//!
//! let mut buffer = SendBuffer::new();
//! let mut encoder = ObjectEncoder::new(&mut buffer);
//! encoder.begin_object().set_name("led").set_bool(true).end_object();
//! encoder.commit().unwrap();
//!
//! assert_eq!(buffer.as_bytes(), br#"{"led":true}"#);
//! ```

use serde::Serialize;

use super::decoder::COMMAND_FIELD;
use crate::error::EncodeError;
use crate::writer::SendBuffer;

/// Text of the diagnostic sent before a session ends on a protocol error.
pub const ERROR_MESSAGE: &str = "Server does not follow strict API rules.";

/// Member carrying the diagnostic text.
pub const ERROR_MESSAGE_FIELD: &str = "message";

/// Member carrying the numeric error code.
pub const ERROR_CODE_FIELD: &str = "error";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    NotStarted,
    /// Inside the object, expecting a name or the end.
    Members,
    /// Name written, expecting its value.
    Value,
    Closed,
}

/// Builder for one outbound object.
pub struct ObjectEncoder<'a> {
    out: &'a mut SendBuffer,
    phase: Phase,
    members: usize,
    error: Option<EncodeError>,
}

impl<'a> ObjectEncoder<'a> {
    /// Start encoding into `out`, which should be empty.
    pub fn new(out: &'a mut SendBuffer) -> Self {
        Self {
            out,
            phase: Phase::NotStarted,
            members: 0,
            error: None,
        }
    }

    /// First error recorded, if any.
    #[inline]
    pub fn error(&self) -> Option<EncodeError> {
        self.error
    }

    /// Open the object.
    pub fn begin_object(&mut self) -> &mut Self {
        if self.expect(Phase::NotStarted, EncodeError::Unbalanced) {
            self.raw(b"{");
            self.phase = Phase::Members;
        }
        self
    }

    /// Write a member name; a value must follow.
    pub fn set_name(&mut self, name: &str) -> &mut Self {
        if self.expect(Phase::Members, EncodeError::OutOfOrder) {
            if self.members > 0 {
                self.raw(b",");
            }
            self.json(name);
            self.raw(b":");
            self.phase = Phase::Value;
        }
        self
    }

    /// Write a boolean value.
    pub fn set_bool(&mut self, value: bool) -> &mut Self {
        self.set_value(&value)
    }

    /// Write an integer value.
    pub fn set_int(&mut self, value: i64) -> &mut Self {
        self.set_value(&value)
    }

    /// Write a string value.
    pub fn set_str(&mut self, value: &str) -> &mut Self {
        self.set_value(value)
    }

    /// Close the object.
    pub fn end_object(&mut self) -> &mut Self {
        if self.expect(Phase::Members, EncodeError::Unbalanced) {
            self.raw(b"}");
            self.phase = Phase::Closed;
        }
        self
    }

    /// Finalize the object text in the buffer.
    ///
    /// # Errors
    ///
    /// Returns the first recorded error, or `Unbalanced` if the object was
    /// never closed. The buffer is emptied on error.
    pub fn commit(self) -> Result<(), EncodeError> {
        let outcome = match (self.error, self.phase) {
            (Some(err), _) => Err(err),
            (None, Phase::Closed) => Ok(()),
            (None, _) => Err(EncodeError::Unbalanced),
        };
        if outcome.is_err() {
            self.out.clear();
        }
        outcome
    }

    fn set_value<T: Serialize + ?Sized>(&mut self, value: &T) -> &mut Self {
        if self.expect(Phase::Value, EncodeError::OutOfOrder) {
            self.json(value);
            self.members += 1;
            self.phase = Phase::Members;
        }
        self
    }

    /// True if no error is recorded and the phase matches; records `err`
    /// otherwise.
    fn expect(&mut self, phase: Phase, err: EncodeError) -> bool {
        if self.error.is_some() {
            return false;
        }
        if self.phase != phase {
            self.error = Some(err);
            return false;
        }
        true
    }

    fn raw(&mut self, text: &[u8]) {
        if self.error.is_none() && !self.out.try_extend(text) {
            self.error = Some(EncodeError::Overflow);
        }
    }

    fn json<T: Serialize + ?Sized>(&mut self, value: &T) {
        if self.error.is_none() && serde_json::to_writer(&mut *self.out, value).is_err() {
            self.error = Some(EncodeError::Overflow);
        }
    }
}

/// Build the telemetry object `{"led": <bool>}`.
pub fn encode_telemetry(out: &mut SendBuffer, led: bool) -> Result<(), EncodeError> {
    let mut encoder = ObjectEncoder::new(out);
    encoder
        .begin_object()
        .set_name(COMMAND_FIELD)
        .set_bool(led)
        .end_object();
    encoder.commit()
}

/// Build the error report `{"message": <text>, "error": <code>}`.
pub fn encode_error_report(
    out: &mut SendBuffer,
    message: &str,
    code: i32,
) -> Result<(), EncodeError> {
    let mut encoder = ObjectEncoder::new(out);
    encoder
        .begin_object()
        .set_name(ERROR_MESSAGE_FIELD)
        .set_str(message)
        .set_name(ERROR_CODE_FIELD)
        .set_int(i64::from(code))
        .end_object();
    encoder.commit()
}
