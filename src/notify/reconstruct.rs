//! Best-effort value lookup for events.
//!
//! Notifications carry only the key. The value is read back afterwards, so
//! it reflects the store at processing time, not at event time. Removal
//! events get a short deadline since the key is usually gone already.

use super::backend::KeyspaceBackend;
use super::event::EventType;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueReconstructor {
    removal_timeout: Duration,
    read_timeout: Duration,
}

impl ValueReconstructor {
    pub fn new(removal_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            removal_timeout,
            read_timeout,
        }
    }

    /// Deadline used for events of `event_type`.
    pub fn timeout_for(&self, event_type: EventType) -> Duration {
        if event_type.is_removal() {
            self.removal_timeout
        } else {
            self.read_timeout
        }
    }

    /// Reads the current value of `key`; empty when it cannot be read.
    pub async fn value_for<B: KeyspaceBackend>(
        &self,
        backend: &B,
        key: &str,
        event_type: EventType,
    ) -> String {
        let timeout = self.timeout_for(event_type);
        match backend.get_value(key, timeout).await {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!(key = %key, event = %event_type, "No value for event key");
                String::new()
            }
            Err(e) => {
                debug!(key = %key, event = %event_type, error = %e, "Value lookup failed");
                String::new()
            }
        }
    }
}
