//! Protocol module - JSON stream framing, command binding and encoding.
//!
//! This module implements the text protocol spoken with the peer:
//! - Single-slot scratch arena bounding every transient string
//! - Streaming tokenizer for concatenated JSON values
//! - Command decoder binding `{"led": <bool>}` objects
//! - Object encoder for telemetry and error reports

mod decoder;
mod encoder;
mod scratch;
mod tokenizer;

pub use decoder::{Command, CommandDecoder, ParserStatus, COMMAND_FIELD};
pub use encoder::{
    encode_error_report, encode_telemetry, ObjectEncoder, ERROR_CODE_FIELD, ERROR_MESSAGE,
    ERROR_MESSAGE_FIELD,
};
pub use scratch::{ScratchArena, MAX_STRING_LEN};
pub use tokenizer::{Token, Tokenizer, MAX_DEPTH};
