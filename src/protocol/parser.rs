//! Incremental RESP Reply Parser
//!
//! Replies arrive over TCP in arbitrary fragments: a single read can hold
//! half a bulk string or several pipelined replies. The parser is therefore
//! incremental. It looks at the front of a buffer and returns either:
//!
//! - `Ok(Some((value, consumed)))` - a complete reply, `consumed` bytes used
//! - `Ok(None)` - the reply is incomplete, read more and retry
//! - `Err(ParseError)` - the stream is corrupt and the connection must be dropped
//!
//! Unlike a server-side parser there is no inline-command fallback: a store
//! never sends inline text, so an unknown prefix byte is a protocol error.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use std::num::ParseIntError;
use thiserror::Error;

/// Errors that can occur during RESP parsing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Unknown type prefix byte
    #[error("unknown type prefix: {0:#04x}")]
    UnknownPrefix(u8),

    /// Invalid integer format
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Invalid UTF-8 in a simple string or error message
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Bulk string length is negative (but not -1 for null)
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Array length is negative (but not -1 for null)
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// Protocol violation (missing CRLF, etc.)
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// The reply exceeds maximum allowed size
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as the store)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array nesting depth (prevent stack overflow)
pub const MAX_NESTING_DEPTH: usize = 32;

/// Returns `Ok(None)` from the enclosing function when more input is needed.
macro_rules! need {
    ($e:expr) => {
        match $e {
            Some(v) => v,
            None => return Ok(None),
        }
    };
}

/// An incremental RESP reply parser.
///
/// # Example
///
/// ```
/// use redisgk::protocol::{RespParser, RespValue};
///
/// let mut parser = RespParser::new();
/// let buf = b"+OK\r\n:1\r\n";
///
/// let (first, consumed) = parser.parse(buf).unwrap().unwrap();
/// assert_eq!(first, RespValue::ok());
///
/// let (second, _) = parser.parse(&buf[consumed..]).unwrap().unwrap();
/// assert_eq!(second, RespValue::Integer(1));
/// ```
#[derive(Debug, Clone)]
pub struct RespParser {
    max_bulk: usize,
    max_depth: usize,
}

impl Default for RespParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RespParser {
    pub fn new() -> Self {
        Self {
            max_bulk: MAX_BULK_SIZE,
            max_depth: MAX_NESTING_DEPTH,
        }
    }

    /// Attempts to parse one reply from the front of `buf`.
    ///
    /// Nothing is retained between calls, so an incomplete reply is simply
    /// parsed again from the start once more bytes are buffered.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let mut cursor = Cursor { buf, pos: 0 };
        let value = need!(self.value(&mut cursor, 0)?);
        Ok(Some((value, cursor.pos)))
    }

    fn value(&self, cur: &mut Cursor<'_>, depth: usize) -> ParseResult<Option<RespValue>> {
        if depth > self.max_depth {
            return Err(ParseError::ProtocolError(format!(
                "maximum nesting depth exceeded: {}",
                self.max_depth
            )));
        }

        let tag = need!(cur.byte());
        let value = match tag {
            prefix::SIMPLE_STRING => RespValue::SimpleString(utf8(need!(cur.line()))?),
            prefix::ERROR => RespValue::Error(utf8(need!(cur.line()))?),
            prefix::INTEGER => RespValue::Integer(integer(need!(cur.line()))?),
            prefix::BULK_STRING => {
                let len = integer(need!(cur.line()))?;
                match len {
                    -1 => RespValue::Null,
                    n if n < 0 => return Err(ParseError::InvalidBulkLength(n)),
                    n => RespValue::BulkString(need!(self.payload(cur, n as usize)?)),
                }
            }
            prefix::ARRAY => {
                let count = integer(need!(cur.line()))?;
                match count {
                    -1 => RespValue::Null,
                    n if n < 0 => return Err(ParseError::InvalidArrayLength(n)),
                    n => {
                        // The count comes off the wire; cap the pre-allocation.
                        let mut items = Vec::with_capacity((n as usize).min(1024));
                        for _ in 0..n {
                            items.push(need!(self.value(cur, depth + 1)?));
                        }
                        RespValue::Array(items)
                    }
                }
            }
            other => return Err(ParseError::UnknownPrefix(other)),
        };
        Ok(Some(value))
    }

    fn payload(&self, cur: &mut Cursor<'_>, len: usize) -> ParseResult<Option<Bytes>> {
        if len > self.max_bulk {
            return Err(ParseError::MessageTooLarge {
                size: len,
                max: self.max_bulk,
            });
        }
        let data = need!(cur.take(len));
        if need!(cur.take(2)) != CRLF {
            return Err(ParseError::ProtocolError(
                "bulk string missing trailing CRLF".to_string(),
            ));
        }
        Ok(Some(Bytes::copy_from_slice(data)))
    }
}

/// Read position within the caller's buffer.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn byte(&mut self) -> Option<u8> {
        let b = *self.buf.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let slice = self.buf.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    /// Everything up to the next CRLF, which is consumed but not returned.
    fn line(&mut self) -> Option<&'a [u8]> {
        let buf: &'a [u8] = self.buf;
        let rest = &buf[self.pos..];
        let at = rest.windows(2).position(|w| w == CRLF)?;
        self.pos += at + 2;
        Some(&rest[..at])
    }
}

fn utf8(raw: &[u8]) -> ParseResult<String> {
    std::str::from_utf8(raw)
        .map(str::to_owned)
        .map_err(|e| ParseError::InvalidUtf8(e.to_string()))
}

fn integer(raw: &[u8]) -> ParseResult<i64> {
    utf8(raw)?
        .parse()
        .map_err(|e: ParseIntError| ParseError::InvalidInteger(e.to_string()))
}

/// Parses a single reply from bytes with a fresh parser.
pub fn parse_message(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    RespParser::new().parse(buf)
}
