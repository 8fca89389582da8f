//! Store Client
//!
//! Typed commands on top of the connection pool, plus push-mode
//! subscriptions on dedicated connections.
//!
//! Every request/reply command takes an explicit deadline. Error replies
//! from the store surface as [`Error::Server`](crate::Error::Server); replies
//! of an unexpected shape as
//! [`Error::UnexpectedReply`](crate::Error::UnexpectedReply).

pub mod client;
pub mod pubsub;

pub use client::{StoreClient, TtlStatus, PING_TIMEOUT};
pub use pubsub::{PubSubMessage, Subscription};
