//! Error types for iotwire.

use thiserror::Error;

/// Wire code reported for malformed input and exhausted decoder resources.
pub const SYNTAX_ERROR_CODE: i32 = -1;

/// Wire code reported for well-formed JSON outside the command schema.
pub const SCHEMA_ERROR_CODE: i32 = -2;

/// Main error type for all iotwire operations.
#[derive(Debug, Error)]
pub enum IotwireError {
    /// I/O error on the transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error (configuration only; the decoder never uses serde_json).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Inbound stream violated the protocol.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Outbound object could not be built.
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Session is gone.
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Terminal decoder failure.
///
/// Resource exhaustion is reported with the same wire code as malformed
/// input; only [`DecodeError::Schema`] has a code of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Malformed JSON token stream.
    #[error("malformed JSON")]
    Syntax,

    /// Well-formed JSON that does not match the command schema.
    #[error("value does not match the command schema")]
    Schema,

    /// String or member name larger than the scratch buffer.
    #[error("string exceeds scratch buffer")]
    Oversized,

    /// Nesting deeper than the tokenizer can track.
    #[error("nesting too deep")]
    TooDeep,
}

impl DecodeError {
    /// Numeric code sent in the `error` member of the error report.
    pub fn code(&self) -> i32 {
        match self {
            DecodeError::Schema => SCHEMA_ERROR_CODE,
            DecodeError::Syntax | DecodeError::Oversized | DecodeError::TooDeep => {
                SYNTAX_ERROR_CODE
            }
        }
    }
}

/// Encoder failure. The first one sticks until the next `commit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// Object text does not fit the send buffer.
    #[error("send buffer overflow")]
    Overflow,

    /// Name set where a value was expected, or the other way around.
    #[error("member name and value out of order")]
    OutOfOrder,

    /// Commit with an unclosed object, or an end without a begin.
    #[error("unbalanced object")]
    Unbalanced,
}

/// Result type alias using IotwireError.
pub type Result<T> = std::result::Result<T, IotwireError>;
