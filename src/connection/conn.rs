//! Single Store Connection
//!
//! A [`Connection`] owns one TCP stream to the store and speaks RESP over it.
//! It is used in two modes:
//!
//! - **request/reply** through the pool: write a command, read one reply
//! - **push** by a subscription: read frames as the store publishes them
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. TCP connect (bounded by dial_timeout)
//!        │
//!        ▼
//! 2. Handshake: AUTH [user] password, SELECT db
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │  Write command               │
//!    │        │                     │
//!    │        ▼                     │
//!    │  Parse reply from buffer ◄─┐ │
//!    │        │ incomplete        │ │
//!    │        ▼                   │ │
//!    │  Read more bytes ──────────┘ │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. Dropped: returned to the pool or closed
//! ```
//!
//! ## Buffer Management
//!
//! TCP is a stream protocol, so a read may deliver part of a reply or several
//! replies at once. Incoming bytes accumulate in a `BytesMut` and complete
//! replies are split off the front.

use crate::config::ConnectionSettings;
use crate::protocol::{ParseError, RespParser, RespValue};
use bytes::{Buf, BytesMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics shared by every connection a client opens
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of TCP connections opened
    pub connections_opened: AtomicU64,
    /// Connections discarded after an error or at shutdown
    pub connections_closed: AtomicU64,
    /// Total commands written
    pub commands_sent: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn command_sent(&self) {
        self.commands_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Connections currently open (pooled, checked out or subscribed)
    pub fn open_connections(&self) -> u64 {
        self.connections_opened
            .load(Ordering::Relaxed)
            .saturating_sub(self.connections_closed.load(Ordering::Relaxed))
    }
}

/// Errors that can occur on a store connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The store sent bytes that are not valid RESP
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// The store closed the connection between replies
    #[error("Connection closed by server")]
    ServerClosed,

    /// The store closed the connection in the middle of a reply
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// A dial, read or write did not finish in time
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// AUTH or SELECT was refused
    #[error("Handshake rejected: {0}")]
    HandshakeRejected(String),

    /// No pooled connection became free within the pool timeout
    #[error("Timed out waiting for a pooled connection after {0:?}")]
    PoolTimeout(Duration),

    /// The pool was closed
    #[error("Connection pool is closed")]
    PoolClosed,
}

/// One RESP connection to the store.
pub struct Connection {
    /// The TCP stream for this connection
    stream: BufWriter<TcpStream>,

    /// Store address (for logging)
    addr: String,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// RESP parser
    parser: RespParser,

    read_timeout: Duration,
    write_timeout: Duration,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl Connection {
    /// Dials the store and performs the AUTH/SELECT handshake.
    pub async fn establish(
        settings: &ConnectionSettings,
        stats: Arc<ConnectionStats>,
    ) -> Result<Self, ConnectionError> {
        let stream = tokio::time::timeout(
            settings.dial_timeout,
            TcpStream::connect(settings.addr.as_str()),
        )
        .await
        .map_err(|_| ConnectionError::Timeout(settings.dial_timeout))??;
        stream.set_nodelay(true)?;

        let mut conn = Self {
            stream: BufWriter::new(stream),
            addr: settings.addr.clone(),
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            parser: RespParser::new(),
            read_timeout: settings.read_timeout,
            write_timeout: settings.write_timeout,
            stats,
        };
        conn.stats.connection_opened();

        conn.handshake(settings).await?;
        debug!(server = %conn.addr, db = settings.db, "Connection established");
        Ok(conn)
    }

    async fn handshake(&mut self, settings: &ConnectionSettings) -> Result<(), ConnectionError> {
        let auth = match &settings.user {
            Some(user) => RespValue::command(["AUTH", user.as_str(), settings.password.as_str()]),
            None => RespValue::command(["AUTH", settings.password.as_str()]),
        };
        if let RespValue::Error(e) = self.request(&auth).await? {
            return Err(ConnectionError::HandshakeRejected(e));
        }
        trace!(server = %self.addr, "Authenticated");

        if settings.db != 0 {
            let select = RespValue::command(["SELECT".to_string(), settings.db.to_string()]);
            if let RespValue::Error(e) = self.request(&select).await? {
                return Err(ConnectionError::HandshakeRejected(e));
            }
        }

        Ok(())
    }

    /// Address of the store this connection talks to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Writes one command and reads its reply.
    ///
    /// Error replies are returned as `RespValue::Error`; only transport and
    /// protocol failures are `Err`.
    pub async fn request(&mut self, command: &RespValue) -> Result<RespValue, ConnectionError> {
        self.write_command(command).await?;
        self.read_reply().await
    }

    /// Reads one frame under the read timeout.
    pub async fn read_reply(&mut self) -> Result<RespValue, ConnectionError> {
        let read_timeout = self.read_timeout;
        tokio::time::timeout(read_timeout, self.read_frame())
            .await
            .map_err(|_| ConnectionError::Timeout(read_timeout))?
    }

    /// Writes one command without waiting for a reply.
    pub async fn write_command(&mut self, command: &RespValue) -> Result<(), ConnectionError> {
        let bytes = command.serialize();
        let write_timeout = self.write_timeout;
        tokio::time::timeout(write_timeout, async {
            self.stream.write_all(&bytes).await?;
            self.stream.flush().await
        })
        .await
        .map_err(|_| ConnectionError::Timeout(write_timeout))??;

        self.stats.command_sent();
        self.stats.bytes_written(bytes.len());
        trace!(server = %self.addr, bytes = bytes.len(), "Sent command");
        Ok(())
    }

    /// Reads the next complete frame, waiting as long as it takes.
    ///
    /// Subscriptions call this directly; there is no deadline because a
    /// quiet channel is not an error.
    pub async fn read_frame(&mut self) -> Result<RespValue, ConnectionError> {
        loop {
            if let Some(frame) = self.try_parse_frame()? {
                return Ok(frame);
            }
            self.read_more_data().await?;
        }
    }

    /// Attempts to parse a frame from the buffer.
    fn try_parse_frame(&mut self) -> Result<Option<RespValue>, ConnectionError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        match self.parser.parse(&self.buffer) {
            Ok(Some((value, consumed))) => {
                self.buffer.advance(consumed);
                trace!(
                    server = %self.addr,
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Parsed frame"
                );
                Ok(Some(value))
            }
            Ok(None) => {
                trace!(
                    server = %self.addr,
                    buffered = self.buffer.len(),
                    "Incomplete frame, need more data"
                );
                Ok(None)
            }
            Err(e) => {
                warn!(server = %self.addr, error = %e, "Parse error");
                Err(ConnectionError::ParseError(e))
            }
        }
    }

    /// Reads more data from the socket into the buffer.
    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            return if self.buffer.is_empty() {
                Err(ConnectionError::ServerClosed)
            } else {
                Err(ConnectionError::UnexpectedEof)
            };
        }

        self.stats.bytes_read(n);
        trace!(server = %self.addr, bytes = n, "Read data");
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.stats.connection_closed();
    }
}
