//! Which notifications to listen for, and how long to spend on each.

use std::fmt;
use std::time::Duration;

/// Default deadline for the TTL probe that follows an `expire` notification
pub const DEFAULT_EXPIRY_PROBE_TIMEOUT: Duration = Duration::from_millis(100);

/// Default deadline for reading a value on removal paths
pub const DEFAULT_EXPIRY_READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Default deadline for reading a value on write paths
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// The keyevent channels the store can publish on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventClass {
    /// `set`: a string value was written
    Set,
    /// `del`: a key was deleted
    Del,
    /// `expire`: a TTL was assigned (expiry intent)
    Expire,
    /// `expired`: a key was removed by its TTL (expiry actual)
    Expired,
}

impl EventClass {
    pub const ALL: [EventClass; 4] = [
        EventClass::Set,
        EventClass::Del,
        EventClass::Expire,
        EventClass::Expired,
    ];

    /// The event name as it appears after `__keyevent@<db>__:`.
    pub fn event_name(&self) -> &'static str {
        match self {
            EventClass::Set => "set",
            EventClass::Del => "del",
            EventClass::Expire => "expire",
            EventClass::Expired => "expired",
        }
    }

    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            "set" => Some(EventClass::Set),
            "del" => Some(EventClass::Del),
            "expire" => Some(EventClass::Expire),
            "expired" => Some(EventClass::Expired),
            _ => None,
        }
    }

    /// The `notify-keyspace-events` flag that enables this class.
    pub fn notify_flag(&self) -> char {
        match self {
            EventClass::Set => '$',
            EventClass::Del | EventClass::Expire => 'g',
            EventClass::Expired => 'x',
        }
    }

    /// Full channel name for `db`.
    pub fn channel(&self, db: i64) -> String {
        format!("__keyevent@{}__:{}", db, self.event_name())
    }
}

impl fmt::Display for EventClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_name())
    }
}

/// Notification listener settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationOptions {
    /// Event classes to subscribe to
    pub classes: Vec<EventClass>,
    /// Deadline for the TTL probe after an `expire` notification
    pub expiry_probe_timeout: Duration,
    /// Deadline for the value read on delete and expiry events
    pub expiry_read_timeout: Duration,
    /// Deadline for the value read on write events
    pub read_timeout: Duration,
}

impl Default for NotificationOptions {
    fn default() -> Self {
        Self {
            classes: EventClass::ALL.to_vec(),
            expiry_probe_timeout: DEFAULT_EXPIRY_PROBE_TIMEOUT,
            expiry_read_timeout: DEFAULT_EXPIRY_READ_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl NotificationOptions {
    /// Listens for expiry notifications only.
    pub fn expirations_only() -> Self {
        Self {
            classes: vec![EventClass::Expire, EventClass::Expired],
            ..Self::default()
        }
    }

    /// The `notify-keyspace-events` value enabling keyevent notifications
    /// for the selected classes, e.g. `Eg$x` for all of them.
    pub fn notify_flags(&self) -> String {
        let mut flags = String::from("E");
        for flag in ['g', '$', 'x'] {
            if self.classes.iter().any(|c| c.notify_flag() == flag) {
                flags.push(flag);
            }
        }
        flags
    }

    /// Channel names to subscribe to, in a stable order without duplicates.
    pub fn channels(&self, db: i64) -> Vec<String> {
        let mut classes = self.classes.clone();
        classes.sort();
        classes.dedup();
        classes.iter().map(|c| c.channel(db)).collect()
    }
}
