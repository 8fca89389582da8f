//! # redisgk - Hierarchical Keys and Typed Key Events for Redis
//!
//! redisgk is an async client for a Redis-compatible store. It addresses
//! values with hierarchical key paths and turns the store's keyspace
//! notifications into a typed stream of key lifecycle events.
//!
//! ## Features
//!
//! - **Key Paths**: `["User Profile", "Name!"]` becomes `user_profile:name`
//! - **Key Events**: created / deleted / expired events with the key's value
//! - **Expiry Disambiguation**: TTL assignment is told apart from real expiry
//! - **Clean Shutdown**: closing stops the listener before the stream ends
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                RedisGk                                  │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌──────────────────────────────┐ │
//! │  │ ConnConfig  │───>│ StoreClient │<───│ NotificationManager          │ │
//! │  │ (validate)  │    │ (pool)      │    │  Subscription -> Classifier  │ │
//! │  └─────────────┘    └──────┬──────┘    │  -> Reconstructor -> channel │ │
//! │                            │           └───────────────┬──────────────┘ │
//! │                            ▼                           ▼                │
//! │                   ┌─────────────────┐          ┌───────────────┐        │
//! │                   │ RESP connection │          │ EventReceiver │        │
//! │                   └─────────────────┘          └───────────────┘        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use redisgk::{ConnectionConfig, RedisGk};
//!
//! #[tokio::main]
//! async fn main() -> redisgk::Result<()> {
//!     let config = ConnectionConfig::new("localhost", 6379, "secret");
//!     let gk = RedisGk::connect(&config).await?;
//!
//!     let events = gk.events();
//!     tokio::spawn(async move {
//!         while let Some(event) = events.recv().await {
//!             println!("{}", event);
//!         }
//!     });
//!
//!     gk.set_string(&["users", "42", "name"], "Ariz", None).await?;
//!     gk.close().await
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`config`]: connection descriptor, validation and defaults
//! - [`keys`]: key path normalization
//! - [`protocol`]: RESP types and the incremental reply parser
//! - [`connection`]: TCP connections and the connection pool
//! - [`store`]: typed commands and subscriptions
//! - [`notify`]: the notification listener and its event types
//! - [`client`]: the [`RedisGk`] facade
//!
//! ## Event Semantics
//!
//! Events are delivered in the order the store published them, one per
//! recognized notification. The value is read after the notification
//! arrives, so it is best effort: it may be empty (key already gone, read
//! timed out) or newer than the event.

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod keys;
pub mod notify;
pub mod protocol;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types for convenience
pub use client::RedisGk;
pub use config::{ConfigError, ConnectionConfig, ConnectionOptions, ConnectionSettings};
pub use connection::{ConnectionError, ConnectionStats};
pub use error::{Error, Result};
pub use keys::{normalize_key, normalize_key_path};
pub use notify::{EventClass, EventReceiver, EventType, KeyEvent, NotificationOptions};
pub use protocol::{ParseError, RespParser, RespValue};
pub use store::{StoreClient, TtlStatus};

/// The default store port
pub const DEFAULT_PORT: u32 = 6379;

/// The default store host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of redisgk
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
