//! Turns raw keyevent messages into [`EventType`]s.
//!
//! Channel names are parsed once into an [`EventClass`]. Only the expiry
//! intent channel (`expire`) needs a follow-up: the store sends it when a TTL
//! is assigned, which may be long before the key actually goes away, so a
//! TTL probe decides what the event really means.

use super::backend::KeyspaceBackend;
use super::event::EventType;
use super::options::EventClass;
use crate::error::Result;
use crate::store::{PubSubMessage, TtlStatus};
use std::time::Duration;
use tracing::debug;

/// Result of looking at a channel name alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The channel fully determines the event type.
    Known(EventType),
    /// An `expire` notification; the key's TTL decides.
    ProbeTtl,
    /// Not a keyevent channel for our db, or an event we do not handle.
    Unknown,
}

/// Classifies keyevent messages for one db.
#[derive(Debug, Clone)]
pub struct EventClassifier {
    prefix: String,
    probe_timeout: Duration,
}

impl EventClassifier {
    pub fn new(db: i64, probe_timeout: Duration) -> Self {
        Self {
            prefix: format!("__keyevent@{}__:", db),
            probe_timeout,
        }
    }

    /// Parses `channel` into the event class it carries.
    pub fn event_class(&self, channel: &str) -> Option<EventClass> {
        channel
            .strip_prefix(&self.prefix)
            .and_then(EventClass::from_event_name)
    }

    /// Classifies by channel name only.
    pub fn classify(&self, channel: &str) -> Verdict {
        match self.event_class(channel) {
            Some(EventClass::Set) => Verdict::Known(EventType::Created),
            Some(EventClass::Del) => Verdict::Known(EventType::Deleted),
            Some(EventClass::Expired) => Verdict::Known(EventType::Expired),
            Some(EventClass::Expire) => Verdict::ProbeTtl,
            None => Verdict::Unknown,
        }
    }

    /// Classifies a message, probing the key's TTL for `expire` notifications.
    ///
    /// Never fails: a probe that errors or times out resolves to
    /// [`EventType::Created`].
    pub async fn resolve<B: KeyspaceBackend>(
        &self,
        backend: &B,
        message: &PubSubMessage,
    ) -> EventType {
        match self.classify(&message.channel) {
            Verdict::Known(event_type) => event_type,
            Verdict::Unknown => EventType::Unknown,
            Verdict::ProbeTtl => {
                let probe = backend
                    .ttl_status(&message.payload, self.probe_timeout)
                    .await;
                if let Err(e) = &probe {
                    debug!(key = %message.payload, error = %e, "TTL probe failed, assuming key is live");
                }
                expiry_from_ttl(probe)
            }
        }
    }
}

/// Maps the TTL probe after an `expire` notification to an event type.
pub fn expiry_from_ttl(probe: Result<TtlStatus>) -> EventType {
    match probe {
        Ok(TtlStatus::DoesNotExist) => EventType::Expired,
        Ok(TtlStatus::Zero) => EventType::ExpiredNotice,
        Ok(TtlStatus::Remaining(_)) | Ok(TtlStatus::NoExpiry) => EventType::Created,
        Err(_) => EventType::Created,
    }
}
