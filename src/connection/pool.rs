//! Connection Pool
//!
//! Request/reply commands borrow a connection from a bounded pool. A
//! semaphore caps how many connections are checked out at once; idle
//! connections are kept on a stack and reused. A connection goes back to the
//! stack only if its last request completed: one abandoned mid-request (error
//! or caller timeout) may still have a reply in flight and is discarded.
//!
//! Subscriptions do not use the pool. Once a connection has sent SUBSCRIBE it
//! can no longer serve ordinary commands, so [`ConnectionPool::open_dedicated`]
//! hands out a fresh connection outside the pool limits.

use super::conn::{Connection, ConnectionError, ConnectionStats};
use crate::config::ConnectionSettings;
use crate::protocol::RespValue;
use std::sync::{Arc, Mutex};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, trace};

/// A bounded pool of store connections.
pub struct ConnectionPool {
    settings: ConnectionSettings,
    idle: Mutex<Vec<Connection>>,
    permits: Semaphore,
    stats: Arc<ConnectionStats>,
}

impl ConnectionPool {
    /// Creates an empty pool; connections are dialed lazily.
    pub fn new(settings: ConnectionSettings) -> Self {
        Self {
            permits: Semaphore::new(settings.pool_size),
            idle: Mutex::new(Vec::with_capacity(settings.pool_size)),
            stats: Arc::new(ConnectionStats::new()),
            settings,
        }
    }

    /// Checks out a connection, dialing a new one if none is idle.
    ///
    /// Waits at most `pool_timeout` for a free slot.
    pub async fn get(&self) -> Result<PooledConnection<'_>, ConnectionError> {
        let permit =
            match tokio::time::timeout(self.settings.pool_timeout, self.permits.acquire()).await {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => return Err(ConnectionError::PoolClosed),
                Err(_) => return Err(ConnectionError::PoolTimeout(self.settings.pool_timeout)),
            };

        let idle = self.idle.lock().unwrap().pop();
        let conn = match idle {
            Some(conn) => {
                trace!(server = %conn.addr(), "Reusing pooled connection");
                conn
            }
            None => Connection::establish(&self.settings, Arc::clone(&self.stats)).await?,
        };

        Ok(PooledConnection {
            conn: Some(conn),
            reusable: true,
            pool: self,
            _permit: permit,
        })
    }

    /// Opens a connection that is not counted against the pool.
    pub async fn open_dedicated(&self) -> Result<Connection, ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::PoolClosed);
        }
        Connection::establish(&self.settings, Arc::clone(&self.stats)).await
    }

    /// Refuses new checkouts and drops every idle connection.
    ///
    /// Connections still checked out are dropped when their guard is.
    pub fn close(&self) {
        self.permits.close();
        let drained = std::mem::take(&mut *self.idle.lock().unwrap());
        debug!(
            server = %self.settings.addr,
            idle = drained.len(),
            "Connection pool closed"
        );
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// Number of connections waiting on the idle stack.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().unwrap().len()
    }

    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    fn check_in(&self, conn: Connection) {
        if self.is_closed() {
            return;
        }
        self.idle.lock().unwrap().push(conn);
    }
}

/// A connection checked out of the pool.
///
/// Dropping the guard returns the connection to the pool when it is still in
/// a known state and releases the slot.
pub struct PooledConnection<'a> {
    conn: Option<Connection>,
    reusable: bool,
    pool: &'a ConnectionPool,
    _permit: SemaphorePermit<'a>,
}

impl PooledConnection<'_> {
    /// Sends one command and reads its reply.
    pub async fn request(&mut self, command: &RespValue) -> Result<RespValue, ConnectionError> {
        let conn = self.conn.as_mut().ok_or(ConnectionError::PoolClosed)?;

        // Cleared until the reply is fully read, so a cancelled or failed
        // request never returns a desynchronized connection to the pool.
        self.reusable = false;
        let reply = conn.request(command).await?;
        self.reusable = true;
        Ok(reply)
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if self.reusable {
                self.pool.check_in(conn);
            } else {
                debug!(server = %conn.addr(), "Discarding connection after incomplete request");
            }
        }
    }
}
