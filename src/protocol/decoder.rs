//! Command decoder: framing plus schema binding.
//!
//! Bytes from each transport read are pushed through the [`Tokenizer`];
//! tokens drive a small binding state machine for the one accepted shape:
//!
//! ```text
//! {"led": <bool>}
//! ```
//!
//! State machine for binding:
//! - `Idle`: between top-level values, only `{` is accepted
//! - `Members`: inside the command object, collecting the single field
//! - `AwaitValue`: member name seen, need a boolean
//!
//! A command is handed to the caller only when the closing brace of the
//! top-level object is consumed, so a rejected value never partially
//! applies. Every error is terminal for the decoder.
//!
//! # Example
//!
//! ```
//! use iotwire::protocol::{Command, CommandDecoder};
//!
//! let mut decoder = CommandDecoder::new();
//! let mut applied = Vec::new();
//!
//! // Data arrives in chunks from the socket
//! decoder.push(br#"{"led": tr"#, |cmd| applied.push(cmd)).unwrap();
//! decoder.push(br#"ue}{"led":false}"#, |cmd| applied.push(cmd)).unwrap();
//!
//! assert_eq!(applied, vec![Command { led: true }, Command { led: false }]);
//! ```

use super::tokenizer::{Token, Tokenizer};
use crate::error::DecodeError;

/// Member name of the one recognized command field.
pub const COMMAND_FIELD: &str = "led";

/// A validated inbound command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    /// Requested state of the boolean output.
    pub led: bool,
}

/// Decoder progress as seen by the send guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserStatus {
    /// Between top-level values.
    Ready,
    /// A value is partially consumed; more bytes are needed.
    InProgress,
    /// Terminal failure.
    Error(DecodeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bind {
    Idle,
    Members { value: Option<bool> },
    AwaitValue,
}

impl Bind {
    fn on_token(&mut self, token: Token<'_>) -> Result<Option<Command>, DecodeError> {
        match (*self, token) {
            (Bind::Idle, Token::BeginObject) => {
                *self = Bind::Members { value: None };
                Ok(None)
            }
            (Bind::Members { value: None }, Token::Name(name)) if name == COMMAND_FIELD => {
                *self = Bind::AwaitValue;
                Ok(None)
            }
            (Bind::Members { value: Some(led) }, Token::EndObject) => {
                *self = Bind::Idle;
                Ok(Some(Command { led }))
            }
            (Bind::AwaitValue, Token::Bool(led)) => {
                *self = Bind::Members { value: Some(led) };
                Ok(None)
            }
            _ => Err(DecodeError::Schema),
        }
    }
}

/// Streaming decoder turning chunks into [`Command`]s.
///
/// Memory use is fixed: one tokenizer with its scratch arena and a
/// few bytes of binding state. Nothing is buffered between calls except
/// that state.
pub struct CommandDecoder {
    tokenizer: Tokenizer,
    bind: Bind,
    status: ParserStatus,
}

impl CommandDecoder {
    /// Create a decoder in the `Ready` state.
    pub fn new() -> Self {
        Self {
            tokenizer: Tokenizer::new(),
            bind: Bind::Idle,
            status: ParserStatus::Ready,
        }
    }

    /// Current parser status.
    #[inline]
    pub fn status(&self) -> ParserStatus {
        self.status
    }

    /// True while a value is partially consumed.
    #[inline]
    pub fn is_in_progress(&self) -> bool {
        self.status == ParserStatus::InProgress
    }

    /// Push one chunk and apply every command it completes.
    ///
    /// This is the main API for processing incoming data from the socket.
    /// `apply` runs synchronously for each complete top-level value, in
    /// arrival order, before the next value is examined. Partial data is
    /// kept internally for the next push.
    ///
    /// # Returns
    ///
    /// Number of commands applied from this chunk.
    ///
    /// # Errors
    ///
    /// Returns the first [`DecodeError`]. Remaining bytes of the chunk are
    /// discarded, commands completed earlier in the chunk stay applied, and
    /// every later push fails with the same error.
    pub fn push<F>(&mut self, data: &[u8], mut apply: F) -> Result<usize, DecodeError>
    where
        F: FnMut(Command),
    {
        if let ParserStatus::Error(err) = self.status {
            return Err(err);
        }

        let mut applied = 0;
        let bind = &mut self.bind;
        let mut sink = |token: Token<'_>| -> Result<(), DecodeError> {
            if let Some(command) = bind.on_token(token)? {
                apply(command);
                applied += 1;
            }
            Ok(())
        };

        for &byte in data {
            if let Err(err) = self.tokenizer.feed(byte, &mut sink) {
                tracing::debug!("Decoder rejected input: {}", err);
                self.status = ParserStatus::Error(err);
                return Err(err);
            }
        }

        self.status = if self.tokenizer.is_between_values() {
            ParserStatus::Ready
        } else {
            ParserStatus::InProgress
        };
        Ok(applied)
    }

    /// Get the binding state name for debugging.
    #[cfg(test)]
    fn bind_name(&self) -> &'static str {
        match self.bind {
            Bind::Idle => "Idle",
            Bind::Members { .. } => "Members",
            Bind::AwaitValue => "AwaitValue",
        }
    }
}

impl Default for CommandDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::scratch::MAX_STRING_LEN;

    /// Push one chunk and return the commands it applied.
    fn push_all(decoder: &mut CommandDecoder, data: &[u8]) -> Result<Vec<bool>, DecodeError> {
        let mut out = Vec::new();
        decoder.push(data, |cmd| out.push(cmd.led))?;
        Ok(out)
    }

    #[test]
    fn test_single_complete_command() {
        let mut decoder = CommandDecoder::new();
        let out = push_all(&mut decoder, br#"{"led": true}"#).unwrap();

        assert_eq!(out, vec![true]);
        assert_eq!(decoder.status(), ParserStatus::Ready);
    }

    #[test]
    fn test_multiple_commands_in_one_push() {
        let mut decoder = CommandDecoder::new();
        let out = push_all(&mut decoder, br#"{"led": true}{"led": false} {"led":true}"#).unwrap();

        assert_eq!(out, vec![true, false, true]);
        assert_eq!(decoder.status(), ParserStatus::Ready);
    }

    #[test]
    fn test_fragmented_command() {
        let mut decoder = CommandDecoder::new();
        let bytes = br#"{"led": false}"#;

        let out = push_all(&mut decoder, &bytes[..5]).unwrap();
        assert!(out.is_empty());
        assert_eq!(decoder.status(), ParserStatus::InProgress);
        assert_eq!(decoder.bind_name(), "Members");

        let out = push_all(&mut decoder, &bytes[5..]).unwrap();
        assert_eq!(out, vec![false]);
        assert_eq!(decoder.status(), ParserStatus::Ready);
        assert_eq!(decoder.bind_name(), "Idle");
    }

    #[test]
    fn test_mixed_complete_and_partial() {
        let mut decoder = CommandDecoder::new();

        let out = push_all(&mut decoder, br#"{"led":true}{"le"#).unwrap();
        assert_eq!(out, vec![true]);
        assert!(decoder.is_in_progress());

        let out = push_all(&mut decoder, br#"d":false}"#).unwrap();
        assert_eq!(out, vec![false]);
        assert!(!decoder.is_in_progress());
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut decoder = CommandDecoder::new();
        let bytes = br#" {"led" : true} {"led":false} "#;

        let mut all = Vec::new();
        for byte in bytes.iter() {
            all.extend(push_all(&mut decoder, std::slice::from_ref(byte)).unwrap());
        }

        assert_eq!(all, vec![true, false]);
    }

    #[test]
    fn test_whitespace_only_stays_ready() {
        let mut decoder = CommandDecoder::new();
        assert_eq!(push_all(&mut decoder, b" \r\n\t").unwrap(), Vec::<bool>::new());
        assert_eq!(decoder.status(), ParserStatus::Ready);
    }

    #[test]
    fn test_wrong_type_is_schema_error() {
        let mut decoder = CommandDecoder::new();
        let result = push_all(&mut decoder, br#"{"led": "yes"}"#);

        assert_eq!(result, Err(DecodeError::Schema));
        assert_eq!(decoder.status(), ParserStatus::Error(DecodeError::Schema));
    }

    #[test]
    fn test_schema_violations() {
        let cases: [&[u8]; 8] = [
            br#"{"other": true}"#,
            br#"{"led": true, "other": true}"#,
            br#"{"led": true, "led": false}"#,
            br#"{}"#,
            br#"{"led": 1}"#,
            br#"{"led": null}"#,
            br#"[true]"#,
            br#""led""#,
        ];

        for case in cases {
            let mut decoder = CommandDecoder::new();
            assert_eq!(
                push_all(&mut decoder, case),
                Err(DecodeError::Schema),
                "input: {}",
                String::from_utf8_lossy(case)
            );
        }
    }

    #[test]
    fn test_nested_value_is_schema_error() {
        let mut decoder = CommandDecoder::new();
        let result = push_all(&mut decoder, br#"{"led": {"on": true}}"#);
        assert_eq!(result, Err(DecodeError::Schema));
    }

    #[test]
    fn test_malformed_json_is_syntax_error() {
        let mut decoder = CommandDecoder::new();
        let result = push_all(&mut decoder, br#"{"led" true}"#);
        assert_eq!(result, Err(DecodeError::Syntax));
    }

    #[test]
    fn test_error_is_terminal() {
        let mut decoder = CommandDecoder::new();
        push_all(&mut decoder, b"{]").unwrap_err();

        let result = push_all(&mut decoder, br#"{"led": true}"#);
        assert_eq!(result, Err(DecodeError::Syntax));
    }

    #[test]
    fn test_commands_before_error_stay_applied() {
        let mut decoder = CommandDecoder::new();
        let mut applied = Vec::new();

        let result = decoder.push(br#"{"led":true}{"led":"x"}{"led":false}"#, |cmd| {
            applied.push(cmd.led)
        });

        assert_eq!(result, Err(DecodeError::Schema));
        assert_eq!(applied, vec![true]);
    }

    #[test]
    fn test_oversized_member_name_applies_nothing() {
        let mut decoder = CommandDecoder::new();
        let mut input = b"{\"".to_vec();
        input.extend(std::iter::repeat(b'x').take(MAX_STRING_LEN + 1));
        input.extend_from_slice(b"\": true}");

        let mut applied = 0;
        let result = decoder.push(&input, |_| applied += 1);

        assert_eq!(result, Err(DecodeError::Oversized));
        assert_eq!(applied, 0);
        assert_eq!(result.unwrap_err().code(), DecodeError::Syntax.code());
    }

    #[test]
    fn test_oversized_string_value_applies_nothing() {
        let mut decoder = CommandDecoder::new();
        let mut input = b"{\"led\": \"".to_vec();
        input.extend(std::iter::repeat(b'y').take(MAX_STRING_LEN + 1));

        let mut applied = 0;
        let result = decoder.push(&input, |_| applied += 1);

        // The wrong type is caught as soon as the string completes, so an
        // unterminated oversized string only trips the arena.
        assert_eq!(result, Err(DecodeError::Oversized));
        assert_eq!(applied, 0);
    }

    #[test]
    fn test_push_returns_applied_count() {
        let mut decoder = CommandDecoder::new();
        let count = decoder
            .push(br#"{"led":true}{"led":true}"#, |_| {})
            .unwrap();
        assert_eq!(count, 2);
    }
}
