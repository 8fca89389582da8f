//! RESP Protocol Implementation
//!
//! The client side of the Redis Serialization Protocol (RESP2): commands are
//! encoded as arrays of bulk strings and replies are decoded incrementally
//! from the connection's read buffer.
//!
//! ## Modules
//!
//! - `types`: Defines the `RespValue` enum and serialization
//! - `parser`: Incremental parser for replies and pub/sub frames
//!
//! ## Example
//!
//! ```
//! use redisgk::protocol::{parse_message, RespValue};
//!
//! let request = RespValue::command(["TTL", "session:42"]).serialize();
//! assert!(request.starts_with(b"*2\r\n"));
//!
//! let (reply, _) = parse_message(b":-2\r\n").unwrap().unwrap();
//! assert_eq!(reply.as_integer(), Some(-2));
//! ```

pub mod parser;
pub mod types;

pub use parser::{parse_message, ParseError, ParseResult, RespParser};
pub use types::RespValue;
