//! Typed request/reply commands over the connection pool.

use super::pubsub::Subscription;
use crate::config::ConnectionSettings;
use crate::connection::{ConnectionError, ConnectionPool, ConnectionStats};
use crate::error::{Error, Result};
use crate::protocol::RespValue;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Deadline for the liveness check performed at connect time
pub const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of a TTL query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlStatus {
    /// The key exists and never expires (`-1`)
    NoExpiry,
    /// The key does not exist (`-2`)
    DoesNotExist,
    /// The key expires in this many whole seconds
    Remaining(Duration),
    /// The key expires in under one second
    Zero,
}

impl TtlStatus {
    /// Decodes the integer reply of `TTL`.
    pub fn from_reply(seconds: i64) -> Option<Self> {
        match seconds {
            -2 => Some(TtlStatus::DoesNotExist),
            -1 => Some(TtlStatus::NoExpiry),
            0 => Some(TtlStatus::Zero),
            n if n > 0 => Some(TtlStatus::Remaining(Duration::from_secs(n as u64))),
            _ => None,
        }
    }
}

/// A cloneable handle to the store.
///
/// All clones share one connection pool; the handle is safe to use from any
/// number of tasks at once.
#[derive(Clone)]
pub struct StoreClient {
    pool: Arc<ConnectionPool>,
}

impl StoreClient {
    /// Builds the pool and verifies the store answers `PING`.
    ///
    /// Never returns a handle that has not been liveness-checked.
    pub async fn connect(settings: ConnectionSettings) -> Result<Self> {
        let addr = settings.addr.clone();
        let client = Self {
            pool: Arc::new(ConnectionPool::new(settings)),
        };

        client.ping(PING_TIMEOUT).await.map_err(|e| match e {
            Error::Connection(source) => Error::ConnectionFailed(source),
            Error::Timeout(after) => Error::ConnectionFailed(ConnectionError::Timeout(after)),
            other => other,
        })?;

        info!(server = %addr, "Connected to store");
        Ok(client)
    }

    pub fn settings(&self) -> &ConnectionSettings {
        self.pool.settings()
    }

    pub fn stats(&self) -> &ConnectionStats {
        self.pool.stats()
    }

    /// Closes the pool; later commands fail with a `PoolClosed` error.
    pub fn close(&self) {
        self.pool.close();
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Sends one command and returns its reply.
    ///
    /// Error replies become [`Error::Server`]. The deadline covers waiting for
    /// a pooled connection, writing and reading.
    pub async fn execute(&self, command: RespValue, timeout: Duration) -> Result<RespValue> {
        let reply = tokio::time::timeout(timeout, async {
            let mut conn = self.pool.get().await?;
            conn.request(&command).await
        })
        .await
        .map_err(|_| Error::Timeout(timeout))??;

        match reply {
            RespValue::Error(message) => Err(Error::Server(message)),
            reply => Ok(reply),
        }
    }

    pub async fn ping(&self, timeout: Duration) -> Result<()> {
        match self.execute(RespValue::command(["PING"]), timeout).await? {
            RespValue::SimpleString(s) if s == "PONG" => Ok(()),
            other => Err(unexpected("PING", other)),
        }
    }

    /// Point read. `Ok(None)` is the "not found" outcome.
    pub async fn get(&self, key: &str, timeout: Duration) -> Result<Option<String>> {
        let reply = self.execute(RespValue::command(["GET", key]), timeout).await?;
        optional_string("GET", reply)
    }

    /// `SET key value`, with `EX` for whole seconds and `PX` otherwise.
    pub async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
        timeout: Duration,
    ) -> Result<()> {
        let mut args = vec!["SET".to_string(), key.to_string(), value.to_string()];
        match ttl {
            Some(ttl) if ttl.is_zero() => {}
            Some(ttl) if ttl.subsec_millis() == 0 => {
                args.push("EX".to_string());
                args.push(ttl.as_secs().to_string());
            }
            Some(ttl) => {
                args.push("PX".to_string());
                args.push(ttl.as_millis().to_string());
            }
            None => {}
        }

        expect_ok("SET", self.execute(RespValue::command(&args), timeout).await?)
    }

    /// Deletes keys; returns how many existed.
    pub async fn del(&self, keys: &[String], timeout: Duration) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let command = RespValue::command(std::iter::once("DEL").chain(keys.iter().map(String::as_str)));
        let removed = integer("DEL", self.execute(command, timeout).await?)?;
        Ok(removed.max(0) as u64)
    }

    pub async fn exists(&self, key: &str, timeout: Duration) -> Result<bool> {
        let count = integer("EXISTS", self.execute(RespValue::command(["EXISTS", key]), timeout).await?)?;
        Ok(count > 0)
    }

    pub async fn ttl(&self, key: &str, timeout: Duration) -> Result<TtlStatus> {
        let seconds = integer("TTL", self.execute(RespValue::command(["TTL", key]), timeout).await?)?;
        TtlStatus::from_reply(seconds).ok_or_else(|| Error::UnexpectedReply {
            command: "TTL",
            reply: seconds.to_string(),
        })
    }

    pub async fn config_set(&self, parameter: &str, value: &str, timeout: Duration) -> Result<()> {
        let reply = self
            .execute(RespValue::command(["CONFIG", "SET", parameter, value]), timeout)
            .await?;
        expect_ok("CONFIG SET", reply)
    }

    /// `CONFIG GET pattern` as (name, value) pairs.
    pub async fn config_get(&self, pattern: &str, timeout: Duration) -> Result<Vec<(String, String)>> {
        let reply = self
            .execute(RespValue::command(["CONFIG", "GET", pattern]), timeout)
            .await?;
        let items = string_array("CONFIG GET", reply)?;
        if items.len() % 2 != 0 {
            return Err(Error::UnexpectedReply {
                command: "CONFIG GET",
                reply: format!("odd number of elements ({})", items.len()),
            });
        }

        let mut pairs = Vec::with_capacity(items.len() / 2);
        let mut items = items.into_iter();
        while let (Some(name), Some(value)) = (items.next(), items.next()) {
            pairs.push((name, value));
        }
        Ok(pairs)
    }

    pub async fn lpush(&self, key: &str, values: &[&str], timeout: Duration) -> Result<i64> {
        self.push("LPUSH", key, values, timeout).await
    }

    pub async fn rpush(&self, key: &str, values: &[&str], timeout: Duration) -> Result<i64> {
        self.push("RPUSH", key, values, timeout).await
    }

    async fn push(
        &self,
        command: &'static str,
        key: &str,
        values: &[&str],
        timeout: Duration,
    ) -> Result<i64> {
        let args = [command, key].into_iter().chain(values.iter().copied());
        integer(command, self.execute(RespValue::command(args), timeout).await?)
    }

    /// `Ok(None)` when the list is empty or missing.
    pub async fn lpop(&self, key: &str, timeout: Duration) -> Result<Option<String>> {
        optional_string("LPOP", self.execute(RespValue::command(["LPOP", key]), timeout).await?)
    }

    /// `Ok(None)` when the list is empty or missing.
    pub async fn rpop(&self, key: &str, timeout: Duration) -> Result<Option<String>> {
        optional_string("RPOP", self.execute(RespValue::command(["RPOP", key]), timeout).await?)
    }

    pub async fn lrange(&self, key: &str, start: i64, stop: i64, timeout: Duration) -> Result<Vec<String>> {
        let command = RespValue::command([
            "LRANGE".to_string(),
            key.to_string(),
            start.to_string(),
            stop.to_string(),
        ]);
        string_array("LRANGE", self.execute(command, timeout).await?)
    }

    pub async fn llen(&self, key: &str, timeout: Duration) -> Result<i64> {
        integer("LLEN", self.execute(RespValue::command(["LLEN", key]), timeout).await?)
    }

    /// Opens a dedicated connection and subscribes it to `channels`.
    pub async fn subscribe(&self, channels: &[String]) -> Result<Subscription> {
        let conn = self.pool.open_dedicated().await?;
        let subscription = Subscription::open(conn, channels).await?;
        debug!(channels = ?channels, "Subscription opened");
        Ok(subscription)
    }
}

fn unexpected(command: &'static str, reply: RespValue) -> Error {
    Error::UnexpectedReply {
        command,
        reply: reply.to_string(),
    }
}

fn expect_ok(command: &'static str, reply: RespValue) -> Result<()> {
    match reply {
        RespValue::SimpleString(s) if s == "OK" => Ok(()),
        other => Err(unexpected(command, other)),
    }
}

fn integer(command: &'static str, reply: RespValue) -> Result<i64> {
    reply.as_integer().ok_or_else(|| unexpected(command, reply))
}

fn optional_string(command: &'static str, reply: RespValue) -> Result<Option<String>> {
    match reply {
        RespValue::Null => Ok(None),
        reply @ (RespValue::BulkString(_) | RespValue::SimpleString(_)) => Ok(reply.into_string()),
        other => Err(unexpected(command, other)),
    }
}

fn string_array(command: &'static str, reply: RespValue) -> Result<Vec<String>> {
    let items = match reply {
        RespValue::Array(items) => items,
        RespValue::Null => return Ok(Vec::new()),
        other => return Err(unexpected(command, other)),
    };

    items
        .into_iter()
        .map(|item| match item {
            RespValue::Null => Ok(String::new()),
            item => item.into_string().ok_or_else(|| Error::UnexpectedReply {
                command,
                reply: "non-string array element".to_string(),
            }),
        })
        .collect()
}
