//! Reply and Command Values
//!
//! Everything the client writes is a command: an array of bulk strings.
//! Everything it reads back is one of the five RESP2 reply kinds below,
//! possibly nested inside arrays (pub/sub pushes are three-element arrays).
//!
//! | tag | kind          | wire form                  |
//! |-----|---------------|----------------------------|
//! | `+` | status        | `+OK\r\n`                  |
//! | `-` | error         | `-WRONGPASS ...\r\n`       |
//! | `:` | integer       | `:-2\r\n`                  |
//! | `$` | bulk / nil    | `$3\r\nfoo\r\n`, `$-1\r\n` |
//! | `*` | array         | `*3\r\n...`                |

use bytes::{BufMut, Bytes};
use std::fmt;

/// Line terminator shared by every frame
pub const CRLF: &[u8] = b"\r\n";

/// Leading tag byte of each frame kind
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A single RESP2 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Status reply such as `OK` or `PONG`
    SimpleString(String),

    /// Error reply; the first word is the error code (`ERR`, `NOAUTH`, ...)
    Error(String),

    Integer(i64),

    /// Binary-safe payload
    BulkString(Bytes),

    /// `$-1` or `*-1`
    Null,

    Array(Vec<RespValue>),
}

impl RespValue {
    /// Encodes a command line as an array of bulk strings.
    ///
    /// ```
    /// use redisgk::protocol::types::RespValue;
    /// let cmd = RespValue::command(["GET", "user:1"]);
    /// assert_eq!(cmd.serialize(), b"*2\r\n$3\r\nGET\r\n$6\r\nuser:1\r\n");
    /// ```
    pub fn command<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let parts = args
            .into_iter()
            .map(|arg| Self::BulkString(Bytes::copy_from_slice(arg.as_ref())))
            .collect();
        Self::Array(parts)
    }

    pub fn simple_string(s: impl Into<String>) -> Self {
        Self::SimpleString(s.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    pub fn integer(n: i64) -> Self {
        Self::Integer(n)
    }

    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        Self::BulkString(data.into())
    }

    pub fn null() -> Self {
        Self::Null
    }

    pub fn array(items: Vec<RespValue>) -> Self {
        Self::Array(items)
    }

    /// `+OK`
    pub fn ok() -> Self {
        Self::SimpleString("OK".into())
    }

    /// Encodes this frame into a fresh buffer.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len_hint());
        self.serialize_into(&mut out);
        out
    }

    /// Appends the wire form of this frame to `out`.
    pub fn serialize_into<B: BufMut>(&self, out: &mut B) {
        match self {
            Self::SimpleString(text) => put_line(out, prefix::SIMPLE_STRING, text.as_bytes()),
            Self::Error(text) => put_line(out, prefix::ERROR, text.as_bytes()),
            Self::Integer(n) => put_line(out, prefix::INTEGER, n.to_string().as_bytes()),
            Self::BulkString(data) => {
                put_line(out, prefix::BULK_STRING, data.len().to_string().as_bytes());
                out.put_slice(data);
                out.put_slice(CRLF);
            }
            Self::Null => put_line(out, prefix::BULK_STRING, b"-1"),
            Self::Array(items) => {
                put_line(out, prefix::ARRAY, items.len().to_string().as_bytes());
                for item in items {
                    item.serialize_into(out);
                }
            }
        }
    }

    // Rough upper bound for commands; replies just grow the Vec.
    fn encoded_len_hint(&self) -> usize {
        match self {
            Self::BulkString(data) => data.len() + 16,
            Self::Array(items) => 16 + items.iter().map(Self::encoded_len_hint).sum::<usize>(),
            _ => 32,
        }
    }

    /// Borrows a status or UTF-8 bulk payload as text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::SimpleString(text) => Some(text),
            Self::BulkString(data) => std::str::from_utf8(data).ok(),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        if let Self::Integer(n) = self {
            Some(*n)
        } else {
            None
        }
    }

    pub fn into_array(self) -> Option<Vec<RespValue>> {
        if let Self::Array(items) = self {
            Some(items)
        } else {
            None
        }
    }

    /// Takes a status or bulk payload as an owned `String`.
    ///
    /// Non-UTF-8 bytes are replaced rather than failing the call, since
    /// stored values are surfaced as text anyway.
    pub fn into_string(self) -> Option<String> {
        match self {
            Self::SimpleString(text) => Some(text),
            Self::BulkString(data) => Some(String::from_utf8_lossy(&data).into_owned()),
            _ => None,
        }
    }
}

fn put_line<B: BufMut>(out: &mut B, tag: u8, body: &[u8]) {
    out.put_u8(tag);
    out.put_slice(body);
    out.put_slice(CRLF);
}

impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SimpleString(text) => write!(f, "\"{}\"", text),
            Self::Error(text) => write!(f, "(error) {}", text),
            Self::Integer(n) => write!(f, "(integer) {}", n),
            Self::BulkString(data) => match std::str::from_utf8(data) {
                Ok(text) => write!(f, "\"{}\"", text),
                Err(_) => write!(f, "({} bytes)", data.len()),
            },
            Self::Null => f.write_str("(nil)"),
            Self::Array(items) if items.is_empty() => f.write_str("(empty array)"),
            Self::Array(items) => {
                f.write_str("[")?;
                let mut first = true;
                for item in items {
                    if !first {
                        f.write_str(", ")?;
                    }
                    first = false;
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}
