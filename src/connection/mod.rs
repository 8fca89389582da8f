//! Store Connections
//!
//! This module manages the TCP connections the client holds to the store.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    StoreClient                              │
//! └──────────────┬──────────────────────────────┬───────────────┘
//!                │ get()                        │ open_dedicated()
//!                ▼                              ▼
//! ┌──────────────────────────────┐   ┌──────────────────────────┐
//! │ ConnectionPool               │   │ Subscription             │
//! │  semaphore (pool_size)       │   │  one connection in       │
//! │  idle stack of Connection    │   │  push mode               │
//! └──────────────┬───────────────┘   └────────────┬─────────────┘
//!                ▼                                ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │ Connection: TcpStream + BytesMut + RespParser               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Async I/O**: Tokio streams with dial/read/write deadlines
//! - **Buffer Management**: `BytesMut` read buffer with incremental parsing
//! - **Handshake**: AUTH and SELECT on every new connection
//! - **Statistics**: Connection and traffic counters shared by the pool

pub mod conn;
pub mod pool;

pub use conn::{Connection, ConnectionError, ConnectionStats};
pub use pool::{ConnectionPool, PooledConnection};
