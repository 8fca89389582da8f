//! Event types delivered to consumers.

use chrono::{DateTime, Utc};
use std::fmt;

/// What happened to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// The key was written.
    Created,
    /// Reserved; writes currently always report [`EventType::Created`].
    Updated,
    /// The key was deleted.
    Deleted,
    /// The key was removed because its TTL elapsed.
    Expired,
    /// A TTL was assigned and removal is imminent but not yet observed.
    ExpiredNotice,
    /// Not a recognized notification. Never emitted.
    Unknown,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Created => "created",
            EventType::Updated => "updated",
            EventType::Deleted => "deleted",
            EventType::Expired => "expired",
            EventType::ExpiredNotice => "expired_notice",
            EventType::Unknown => "unknown",
        }
    }

    /// Whether the key is gone (or about to be), so its value is unlikely
    /// to still be readable.
    pub fn is_removal(&self) -> bool {
        matches!(
            self,
            EventType::Deleted | EventType::Expired | EventType::ExpiredNotice
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One key lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    /// The store key the event refers to
    pub key: String,
    /// Value at processing time; empty when it could not be read
    pub value: String,
    pub event_type: EventType,
    /// When the notification was received
    pub timestamp: DateTime<Utc>,
    /// Raw channel the notification arrived on
    pub source_channel: Option<String>,
}

impl fmt::Display for KeyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {}",
            self.timestamp.to_rfc3339(),
            self.event_type,
            self.key
        )?;
        if !self.value.is_empty() {
            write!(f, " = {:?}", self.value)?;
        }
        Ok(())
    }
}
