//! Byte-at-a-time JSON tokenizer.
//!
//! Accepts a stream of concatenated JSON values delivered in arbitrary
//! chunks and emits [`Token`]s through a caller-supplied sink. State survives
//! between calls, so a value split across reads reassembles correctly.
//!
//! Memory is fixed:
//! - strings, member names and number literals are assembled in a
//!   [`ScratchArena`], one at a time
//! - container nesting is tracked in a 32-bit stack (1 = object, 0 = array)
//!
//! Borrowed text in a token is only valid for the duration of the sink call.

use super::scratch::ScratchArena;
use crate::error::DecodeError;

/// Maximum container nesting depth.
pub const MAX_DEPTH: u8 = 32;

/// A lexical event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token<'a> {
    BeginObject,
    EndObject,
    BeginArray,
    EndArray,
    /// Member name inside an object.
    Name(&'a str),
    /// String value, escapes decoded.
    Str(&'a str),
    /// Number literal text, already validated.
    Number(&'a str),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Num {
    Minus,
    Zero,
    Int,
    Dot,
    Frac,
    Exp,
    ExpSign,
    ExpDigits,
}

impl Num {
    fn is_terminal(self) -> bool {
        matches!(self, Num::Zero | Num::Int | Num::Frac | Num::ExpDigits)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lex {
    /// Expecting a value (top level, after `:` or after `,` in an array).
    Value,
    /// After `[`.
    ValueOrEnd,
    /// After `{`.
    NameOrEnd,
    /// After `,` in an object.
    Name,
    Colon,
    /// Value finished inside a container.
    AfterValue,
    Str { name: bool },
    Escape { name: bool },
    Unicode { name: bool, code: u32, digits: u8 },
    Literal { word: &'static [u8], pos: u8 },
    Number(Num),
}

#[derive(Clone, Copy)]
enum TextKind {
    Name,
    Str,
    Number,
}

enum Step {
    Consumed,
    Reprocess,
}

/// Streaming JSON tokenizer.
pub struct Tokenizer {
    state: Lex,
    /// Container kinds, bit `i` set when level `i` is an object.
    stack: u32,
    depth: u8,
    arena: ScratchArena,
    /// Bytes written into the live arena slot.
    len: usize,
    /// High half of a `\uD800`-`\uDBFF` escape awaiting its low half.
    high_surrogate: Option<u32>,
}

impl Tokenizer {
    /// Create a tokenizer positioned between top-level values.
    pub fn new() -> Self {
        Self {
            state: Lex::Value,
            stack: 0,
            depth: 0,
            arena: ScratchArena::new(),
            len: 0,
            high_surrogate: None,
        }
    }

    /// Current container depth.
    #[inline]
    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// True when no value is partially consumed.
    ///
    /// A top-level number counts as partial until its delimiter arrives.
    #[inline]
    pub fn is_between_values(&self) -> bool {
        self.depth == 0 && self.state == Lex::Value
    }

    /// Feed one byte, emitting zero or more tokens into `sink`.
    ///
    /// An error returned by `sink` is passed through unchanged.
    pub fn feed<F>(&mut self, byte: u8, sink: &mut F) -> Result<(), DecodeError>
    where
        F: FnMut(Token<'_>) -> Result<(), DecodeError>,
    {
        loop {
            match self.step(byte, sink)? {
                Step::Consumed => return Ok(()),
                Step::Reprocess => continue,
            }
        }
    }

    fn step<F>(&mut self, b: u8, sink: &mut F) -> Result<Step, DecodeError>
    where
        F: FnMut(Token<'_>) -> Result<(), DecodeError>,
    {
        match self.state {
            Lex::Value | Lex::ValueOrEnd => {
                if is_whitespace(b) {
                    return Ok(Step::Consumed);
                }
                if b == b']' && self.state == Lex::ValueOrEnd {
                    self.pop();
                    sink(Token::EndArray)?;
                    self.after_value();
                    return Ok(Step::Consumed);
                }
                self.begin_value(b, sink)?;
            }
            Lex::NameOrEnd | Lex::Name => match b {
                _ if is_whitespace(b) => {}
                b'"' => {
                    self.begin_text();
                    self.state = Lex::Str { name: true };
                }
                b'}' if self.state == Lex::NameOrEnd => {
                    self.pop();
                    sink(Token::EndObject)?;
                    self.after_value();
                }
                _ => return Err(DecodeError::Syntax),
            },
            Lex::Colon => match b {
                _ if is_whitespace(b) => {}
                b':' => self.state = Lex::Value,
                _ => return Err(DecodeError::Syntax),
            },
            Lex::AfterValue => match b {
                _ if is_whitespace(b) => {}
                b',' => {
                    self.state = if self.in_object() {
                        Lex::Name
                    } else {
                        Lex::Value
                    };
                }
                b'}' if self.in_object() => {
                    self.pop();
                    sink(Token::EndObject)?;
                    self.after_value();
                }
                b']' if !self.in_object() => {
                    self.pop();
                    sink(Token::EndArray)?;
                    self.after_value();
                }
                _ => return Err(DecodeError::Syntax),
            },
            Lex::Str { name } => {
                if self.high_surrogate.is_some() && b != b'\\' {
                    return Err(DecodeError::Syntax);
                }
                match b {
                    b'"' => {
                        if name {
                            self.emit_text(TextKind::Name, sink)?;
                            self.state = Lex::Colon;
                        } else {
                            self.emit_text(TextKind::Str, sink)?;
                            self.after_value();
                        }
                    }
                    b'\\' => self.state = Lex::Escape { name },
                    0x00..=0x1F => return Err(DecodeError::Syntax),
                    _ => self.push_text(b)?,
                }
            }
            Lex::Escape { name } => {
                if self.high_surrogate.is_some() && b != b'u' {
                    return Err(DecodeError::Syntax);
                }
                let decoded = match b {
                    b'"' => b'"',
                    b'\\' => b'\\',
                    b'/' => b'/',
                    b'b' => 0x08,
                    b'f' => 0x0C,
                    b'n' => b'\n',
                    b'r' => b'\r',
                    b't' => b'\t',
                    b'u' => {
                        self.state = Lex::Unicode {
                            name,
                            code: 0,
                            digits: 0,
                        };
                        return Ok(Step::Consumed);
                    }
                    _ => return Err(DecodeError::Syntax),
                };
                self.push_text(decoded)?;
                self.state = Lex::Str { name };
            }
            Lex::Unicode { name, code, digits } => {
                let nibble = (b as char).to_digit(16).ok_or(DecodeError::Syntax)?;
                let code = code << 4 | nibble;
                if digits + 1 < 4 {
                    self.state = Lex::Unicode {
                        name,
                        code,
                        digits: digits + 1,
                    };
                } else {
                    self.push_escaped_unit(code)?;
                    self.state = Lex::Str { name };
                }
            }
            Lex::Literal { word, pos } => {
                let pos = pos as usize;
                if word.get(pos) != Some(&b) {
                    return Err(DecodeError::Syntax);
                }
                if pos + 1 < word.len() {
                    self.state = Lex::Literal {
                        word,
                        pos: (pos + 1) as u8,
                    };
                } else {
                    let token = match word[0] {
                        b't' => Token::Bool(true),
                        b'f' => Token::Bool(false),
                        _ => Token::Null,
                    };
                    sink(token)?;
                    self.after_value();
                }
            }
            Lex::Number(num) => {
                let next = match (num, b) {
                    (Num::Minus, b'0') => Some(Num::Zero),
                    (Num::Minus, b'1'..=b'9') => Some(Num::Int),
                    (Num::Int, b'0'..=b'9') => Some(Num::Int),
                    (Num::Zero | Num::Int, b'.') => Some(Num::Dot),
                    (Num::Dot | Num::Frac, b'0'..=b'9') => Some(Num::Frac),
                    (Num::Zero | Num::Int | Num::Frac, b'e' | b'E') => Some(Num::Exp),
                    (Num::Exp, b'+' | b'-') => Some(Num::ExpSign),
                    (Num::Exp | Num::ExpSign | Num::ExpDigits, b'0'..=b'9') => {
                        Some(Num::ExpDigits)
                    }
                    _ => None,
                };
                match next {
                    Some(next) => {
                        self.push_text(b)?;
                        self.state = Lex::Number(next);
                    }
                    None if num.is_terminal() => {
                        self.emit_text(TextKind::Number, sink)?;
                        self.after_value();
                        return Ok(Step::Reprocess);
                    }
                    None => return Err(DecodeError::Syntax),
                }
            }
        }
        Ok(Step::Consumed)
    }

    /// First byte of a value.
    fn begin_value<F>(&mut self, b: u8, sink: &mut F) -> Result<(), DecodeError>
    where
        F: FnMut(Token<'_>) -> Result<(), DecodeError>,
    {
        match b {
            b'{' => {
                self.push(true)?;
                sink(Token::BeginObject)?;
                self.state = Lex::NameOrEnd;
            }
            b'[' => {
                self.push(false)?;
                sink(Token::BeginArray)?;
                self.state = Lex::ValueOrEnd;
            }
            b'"' => {
                self.begin_text();
                self.state = Lex::Str { name: false };
            }
            b't' => self.state = Lex::Literal { word: b"true", pos: 1 },
            b'f' => self.state = Lex::Literal { word: b"false", pos: 1 },
            b'n' => self.state = Lex::Literal { word: b"null", pos: 1 },
            b'-' | b'0'..=b'9' => {
                self.begin_text();
                self.push_text(b)?;
                self.state = Lex::Number(match b {
                    b'-' => Num::Minus,
                    b'0' => Num::Zero,
                    _ => Num::Int,
                });
            }
            _ => return Err(DecodeError::Syntax),
        }
        Ok(())
    }

    fn push(&mut self, object: bool) -> Result<(), DecodeError> {
        if self.depth >= MAX_DEPTH {
            return Err(DecodeError::TooDeep);
        }
        if object {
            self.stack |= 1 << self.depth;
        } else {
            self.stack &= !(1 << self.depth);
        }
        self.depth += 1;
        Ok(())
    }

    fn pop(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn in_object(&self) -> bool {
        self.depth > 0 && self.stack >> (self.depth - 1) & 1 == 1
    }

    fn after_value(&mut self) {
        self.state = if self.depth == 0 {
            Lex::Value
        } else {
            Lex::AfterValue
        };
    }

    fn begin_text(&mut self) {
        self.len = 0;
        self.high_surrogate = None;
        // A zero-sized grant always fits.
        let _ = self.arena.request(0);
    }

    fn push_text(&mut self, b: u8) -> Result<(), DecodeError> {
        let slot = self
            .arena
            .grow(self.len + 1)
            .ok_or(DecodeError::Oversized)?;
        slot[self.len] = b;
        self.len += 1;
        Ok(())
    }

    /// Resolve one `\uXXXX` unit, pairing surrogates.
    fn push_escaped_unit(&mut self, unit: u32) -> Result<(), DecodeError> {
        let code_point = match (self.high_surrogate.take(), unit) {
            (Some(high), 0xDC00..=0xDFFF) => 0x10000 + ((high - 0xD800) << 10) + (unit - 0xDC00),
            (Some(_), _) => return Err(DecodeError::Syntax),
            (None, 0xD800..=0xDBFF) => {
                self.high_surrogate = Some(unit);
                return Ok(());
            }
            (None, 0xDC00..=0xDFFF) => return Err(DecodeError::Syntax),
            (None, unit) => unit,
        };
        let ch = char::from_u32(code_point).ok_or(DecodeError::Syntax)?;
        let mut utf8 = [0u8; 4];
        for &b in ch.encode_utf8(&mut utf8).as_bytes() {
            self.push_text(b)?;
        }
        Ok(())
    }

    fn emit_text<F>(&mut self, kind: TextKind, sink: &mut F) -> Result<(), DecodeError>
    where
        F: FnMut(Token<'_>) -> Result<(), DecodeError>,
    {
        let text =
            std::str::from_utf8(self.arena.slot(self.len)).map_err(|_| DecodeError::Syntax)?;
        let token = match kind {
            TextKind::Name => Token::Name(text),
            TextKind::Str => Token::Str(text),
            TextKind::Number => Token::Number(text),
        };
        let result = sink(token);
        self.arena.release();
        self.len = 0;
        result
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::scratch::MAX_STRING_LEN;

    /// Feed every byte and collect tokens as debug strings.
    fn tokens(input: &[u8]) -> Result<Vec<String>, DecodeError> {
        let mut tok = Tokenizer::new();
        let mut out = Vec::new();
        let mut sink = |t: Token<'_>| -> Result<(), DecodeError> {
            out.push(format!("{:?}", t));
            Ok(())
        };
        for &b in input {
            tok.feed(b, &mut sink)?;
        }
        Ok(out)
    }

    #[test]
    fn test_simple_object() {
        let out = tokens(br#"{"led": true}"#).unwrap();
        assert_eq!(
            out,
            vec!["BeginObject", "Name(\"led\")", "Bool(true)", "EndObject"]
        );
    }

    #[test]
    fn test_nested_containers() {
        let out = tokens(br#"{"a":[1,{"b":null}],"c":"x"}"#).unwrap();
        assert_eq!(
            out,
            vec![
                "BeginObject",
                "Name(\"a\")",
                "BeginArray",
                "Number(\"1\")",
                "BeginObject",
                "Name(\"b\")",
                "Null",
                "EndObject",
                "EndArray",
                "Name(\"c\")",
                "Str(\"x\")",
                "EndObject",
            ]
        );
    }

    #[test]
    fn test_empty_containers() {
        let out = tokens(b"{} []").unwrap();
        assert_eq!(out, vec!["BeginObject", "EndObject", "BeginArray", "EndArray"]);
    }

    #[test]
    fn test_adjacent_top_level_values() {
        let out = tokens(br#"{"a":true}{"a":false}"#).unwrap();
        assert_eq!(out.len(), 8);
        assert_eq!(out[2], "Bool(true)");
        assert_eq!(out[6], "Bool(false)");
    }

    #[test]
    fn test_escapes_decoded() {
        let out = tokens(br#"["a\"b\\c\/d\n\t"]"#).unwrap();
        assert_eq!(out[1], format!("{:?}", Token::Str("a\"b\\c/d\n\t")));
    }

    #[test]
    fn test_unicode_escape_and_surrogate_pair() {
        let out = tokens(br#"["\u00e9\ud83d\ude00"]"#).unwrap();
        assert_eq!(out[1], format!("{:?}", Token::Str("\u{e9}\u{1F600}")));
    }

    #[test]
    fn test_lone_low_surrogate_rejected() {
        assert_eq!(tokens(br#"["\udc00"]"#), Err(DecodeError::Syntax));
    }

    #[test]
    fn test_unpaired_high_surrogate_rejected() {
        assert_eq!(tokens(br#"["\ud83dx"]"#), Err(DecodeError::Syntax));
    }

    #[test]
    fn test_numbers() {
        let out = tokens(b"[0,-12,3.25,1e9,-0.5E-3]").unwrap();
        assert_eq!(
            &out[1..6],
            &[
                "Number(\"0\")",
                "Number(\"-12\")",
                "Number(\"3.25\")",
                "Number(\"1e9\")",
                "Number(\"-0.5E-3\")",
            ]
        );
    }

    #[test]
    fn test_bad_numbers_rejected() {
        assert_eq!(tokens(b"[-]"), Err(DecodeError::Syntax));
        assert_eq!(tokens(b"[1.]"), Err(DecodeError::Syntax));
        assert_eq!(tokens(b"[1e]"), Err(DecodeError::Syntax));
        assert_eq!(tokens(b"[01]"), Err(DecodeError::Syntax));
    }

    #[test]
    fn test_top_level_number_needs_delimiter() {
        let mut tok = Tokenizer::new();
        let mut count = 0;
        let mut sink = |_t: Token<'_>| -> Result<(), DecodeError> {
            count += 1;
            Ok(())
        };
        for &b in b"42" {
            tok.feed(b, &mut sink).unwrap();
        }
        assert!(!tok.is_between_values());
        tok.feed(b' ', &mut sink).unwrap();
        assert!(tok.is_between_values());
        assert_eq!(count, 1);
    }

    #[test]
    fn test_syntax_errors() {
        assert_eq!(tokens(b"{,}"), Err(DecodeError::Syntax));
        assert_eq!(tokens(br#"{"a" true}"#), Err(DecodeError::Syntax));
        assert_eq!(tokens(br#"{"a":1,}"#), Err(DecodeError::Syntax));
        assert_eq!(tokens(b"[1}"), Err(DecodeError::Syntax));
        assert_eq!(tokens(b"tru "), Err(DecodeError::Syntax));
        assert_eq!(tokens(b"}"), Err(DecodeError::Syntax));
        assert_eq!(tokens(b"[\"a\x01\"]"), Err(DecodeError::Syntax));
        assert_eq!(tokens(br#"["\x"]"#), Err(DecodeError::Syntax));
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        assert_eq!(tokens(b"[\"\xff\"]"), Err(DecodeError::Syntax));
    }

    #[test]
    fn test_string_at_capacity_accepted() {
        let mut input = b"[\"".to_vec();
        input.extend(std::iter::repeat(b'a').take(MAX_STRING_LEN));
        input.extend_from_slice(b"\"]");
        assert!(tokens(&input).is_ok());
    }

    #[test]
    fn test_oversized_string_rejected() {
        let mut input = b"[\"".to_vec();
        input.extend(std::iter::repeat(b'a').take(MAX_STRING_LEN + 1));
        input.extend_from_slice(b"\"]");
        assert_eq!(tokens(&input), Err(DecodeError::Oversized));
    }

    #[test]
    fn test_oversized_member_name_rejected() {
        let mut input = b"{\"".to_vec();
        input.extend(std::iter::repeat(b'k').take(MAX_STRING_LEN + 1));
        assert_eq!(tokens(&input), Err(DecodeError::Oversized));
    }

    #[test]
    fn test_depth_limit() {
        let ok = vec![b'['; MAX_DEPTH as usize];
        assert!(tokens(&ok).is_ok());

        let too_deep = vec![b'['; MAX_DEPTH as usize + 1];
        assert_eq!(tokens(&too_deep), Err(DecodeError::TooDeep));
    }

    #[test]
    fn test_sink_error_propagates() {
        let mut tok = Tokenizer::new();
        let mut sink = |_t: Token<'_>| -> Result<(), DecodeError> { Err(DecodeError::Schema) };
        assert_eq!(tok.feed(b'{', &mut sink), Err(DecodeError::Schema));
    }

    #[test]
    fn test_depth_tracking() {
        let mut tok = Tokenizer::new();
        let mut sink = |_t: Token<'_>| -> Result<(), DecodeError> { Ok(()) };
        for &b in b"{\"a\":[" {
            tok.feed(b, &mut sink).unwrap();
        }
        assert_eq!(tok.depth(), 2);
        assert!(!tok.is_between_values());
        for &b in b"]}" {
            tok.feed(b, &mut sink).unwrap();
        }
        assert_eq!(tok.depth(), 0);
        assert!(tok.is_between_values());
    }
}
