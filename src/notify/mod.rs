//! Keyspace Notifications
//!
//! Turns the store's keyevent pub/sub feed into a stream of [`KeyEvent`]s.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  message   ┌─────────────────┐  EventType  ┌────────────────────┐
//! │ Subscription │──────────> │ EventClassifier │───────────> │ ValueReconstructor │
//! │ (dedicated   │            │ (+ TTL probe on │             │ (bounded GET)      │
//! │  connection) │            │  `expire`)      │             └─────────┬──────────┘
//! └──────────────┘            └─────────────────┘                       │ KeyEvent
//!                                                                       ▼
//!                                                      ┌──────────────────────────────┐
//!                                                      │ hand-off channel (cap. 1)    │
//!                                                      │  -> EventReceiver (consumer) │
//!                                                      └──────────────────────────────┘
//! ```
//!
//! [`NotificationManager`] owns the subscription and the task running this
//! pipeline. It talks to the store only through [`KeyspaceBackend`], so the
//! whole pipeline can be exercised with in-memory fakes.

pub mod backend;
pub mod classifier;
pub mod event;
pub mod manager;
pub mod options;
pub mod reconstruct;

pub use backend::{KeyspaceBackend, MessageStream};
pub use classifier::{expiry_from_ttl, EventClassifier, Verdict};
pub use event::{EventType, KeyEvent};
pub use manager::{EventReceiver, NotificationManager};
pub use options::{EventClass, NotificationOptions};
pub use reconstruct::ValueReconstructor;
