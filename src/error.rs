//! Crate-level error type.

use crate::config::ConfigError;
use crate::connection::ConnectionError;
use std::time::Duration;
use thiserror::Error;

/// Result type for every public `redisgk` operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the client, the facade and the notification manager.
///
/// Per-message failures inside the notification listener never show up here:
/// they are absorbed and logged, and the event stream only carries events.
#[derive(Debug, Error)]
pub enum Error {
    /// The connection descriptor violates a validation rule.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(#[from] ConfigError),

    /// The store could not be reached, authenticated against or pinged.
    #[error("connection failed: {0}")]
    ConnectionFailed(#[source] ConnectionError),

    /// Keyspace notifications could not be configured or subscribed to.
    #[error("notification startup failed: {reason}")]
    StartupFailed {
        reason: String,
        #[source]
        source: Option<Box<Error>>,
    },

    /// The key path is empty, has an empty segment or normalizes to nothing.
    #[error("invalid key path: {0}")]
    InvalidKeyPath(String),

    /// The normalized key is larger than the store accepts.
    #[error("key size ({size} bytes) exceeds limit ({max} bytes)")]
    KeySizeExceeded { size: usize, max: usize },

    /// The value is larger than the store accepts.
    #[error("value size ({size} bytes) exceeds limit ({max} bytes)")]
    ValueSizeExceeded { size: usize, max: usize },

    /// A point read found no value (missing key or empty list).
    #[error("key not found: {0}")]
    NotFound(String),

    /// The instance was closed; no further operations are accepted.
    #[error("instance is closed")]
    InstanceClosed,

    /// Arguments rejected before reaching the store.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Transport failure after construction.
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// The store answered with an error reply.
    #[error("server error: {0}")]
    Server(String),

    /// The store answered with a reply of the wrong shape.
    #[error("unexpected reply to {command}: {reply}")]
    UnexpectedReply { command: &'static str, reply: String },

    /// The operation did not finish within its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

impl Error {
    pub(crate) fn startup(reason: impl Into<String>, source: Error) -> Self {
        Error::StartupFailed {
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns true for the "no value" outcome of point reads.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Returns true if the error was a deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_) | Error::Connection(ConnectionError::Timeout(_))
        )
    }
}
