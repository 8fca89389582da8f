//! The `RedisGk` facade.
//!
//! Construction validates the configuration, connects, enables keyevent
//! notifications on the store and starts the notification listener. From
//! then on the instance serves key-path based operations and delivers
//! events until [`RedisGk::close`].

use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::keys::{check_key_size, normalize_key, normalize_key_path};
use crate::notify::{EventReceiver, NotificationManager, NotificationOptions};
use crate::store::StoreClient;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Largest value the store accepts (512 MiB)
pub const MAX_VALUE_SIZE: usize = 512 * 1024 * 1024;

/// Store parameter controlling keyspace notifications
pub const NOTIFY_KEYSPACE_EVENTS: &str = "notify-keyspace-events";

/// A connected store handle with a live key event stream.
///
/// Several instances can coexist; each owns its connections and its
/// listener.
pub struct RedisGk {
    store: StoreClient,
    manager: NotificationManager<StoreClient>,
    operation_timeout: Duration,
    closed: AtomicBool,
}

impl RedisGk {
    /// Connects and starts listening for every event class.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        Self::connect_with(config, NotificationOptions::default()).await
    }

    /// Connects and starts listening for the classes in `notifications`.
    ///
    /// Fails with [`Error::ConfigInvalid`] before any I/O when the descriptor
    /// is invalid, [`Error::ConnectionFailed`] when the store cannot be
    /// reached or authenticated against, and [`Error::StartupFailed`] when
    /// notifications cannot be enabled or subscribed to.
    pub async fn connect_with(
        config: &ConnectionConfig,
        notifications: NotificationOptions,
    ) -> Result<Self> {
        let settings = config.resolve()?;
        let db = settings.db;
        let operation_timeout = settings.operation_timeout;

        let store = StoreClient::connect(settings).await?;

        if let Err(e) = configure_notifications(&store, &notifications, operation_timeout).await {
            store.close();
            return Err(e);
        }

        let manager = NotificationManager::new(store.clone(), db, &notifications);
        if let Err(e) = manager.start().await {
            store.close();
            return Err(e);
        }

        info!(server = %store.settings().addr, db, "RedisGk ready");
        Ok(Self {
            store,
            manager,
            operation_timeout,
            closed: AtomicBool::new(false),
        })
    }

    /// The key event stream.
    ///
    /// Clones share the stream. After [`close`](Self::close) it yields `None`.
    pub fn events(&self) -> EventReceiver {
        self.manager.events()
    }

    /// The underlying store client, for commands the facade does not wrap.
    pub fn store(&self) -> &StoreClient {
        &self.store
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stops the listener, closes the event stream and the connections.
    ///
    /// Closing again is a no-op.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("Close on already closed instance");
            return Ok(());
        }

        self.manager.stop().await;
        self.store.close();
        info!(server = %self.store.settings().addr, "RedisGk closed");
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::InstanceClosed)
        } else {
            Ok(())
        }
    }

    /// Stores `value` under `path`, optionally expiring after `ttl`.
    pub async fn set_string<S: AsRef<str>>(
        &self,
        path: &[S],
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<()> {
        self.ensure_open()?;
        let key = normalize_key_path(path)?;
        check_value_size(value)?;
        self.store
            .set(&key, value, ttl, self.operation_timeout)
            .await
    }

    /// Reads the string under `path`; [`Error::NotFound`] when absent.
    pub async fn get_string<S: AsRef<str>>(&self, path: &[S]) -> Result<String> {
        self.ensure_open()?;
        let key = normalize_key_path(path)?;
        self.store
            .get(&key, self.operation_timeout)
            .await?
            .ok_or(Error::NotFound(key))
    }

    /// Deletes every path; returns how many keys existed.
    pub async fn del<P, S>(&self, paths: &[P]) -> Result<u64>
    where
        P: AsRef<[S]>,
        S: AsRef<str>,
    {
        self.ensure_open()?;
        let keys = paths
            .iter()
            .map(|path| normalize_key_path(path.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        self.store.del(&keys, self.operation_timeout).await
    }

    /// Whether `key` exists. The key is canonicalized first.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        self.ensure_open()?;
        let key = normalize_key(key);
        if key.is_empty() {
            return Err(Error::InvalidKeyPath(
                "key is empty after normalization".to_string(),
            ));
        }
        check_key_size(&key)?;
        self.store.exists(&key, self.operation_timeout).await
    }

    /// Prepends `values` to the list at `path`; returns the new length.
    pub async fn lpush<S, V>(&self, path: &[S], values: &[V]) -> Result<i64>
    where
        S: AsRef<str>,
        V: AsRef<str>,
    {
        self.ensure_open()?;
        let key = normalize_key_path(path)?;
        let values = check_list_values(values)?;
        self.store
            .lpush(&key, &values, self.operation_timeout)
            .await
    }

    /// Appends `values` to the list at `path`; returns the new length.
    pub async fn rpush<S, V>(&self, path: &[S], values: &[V]) -> Result<i64>
    where
        S: AsRef<str>,
        V: AsRef<str>,
    {
        self.ensure_open()?;
        let key = normalize_key_path(path)?;
        let values = check_list_values(values)?;
        self.store
            .rpush(&key, &values, self.operation_timeout)
            .await
    }

    /// Removes and returns the first element; [`Error::NotFound`] when empty.
    pub async fn lpop<S: AsRef<str>>(&self, path: &[S]) -> Result<String> {
        self.ensure_open()?;
        let key = normalize_key_path(path)?;
        self.store
            .lpop(&key, self.operation_timeout)
            .await?
            .ok_or(Error::NotFound(key))
    }

    /// Removes and returns the last element; [`Error::NotFound`] when empty.
    pub async fn rpop<S: AsRef<str>>(&self, path: &[S]) -> Result<String> {
        self.ensure_open()?;
        let key = normalize_key_path(path)?;
        self.store
            .rpop(&key, self.operation_timeout)
            .await?
            .ok_or(Error::NotFound(key))
    }

    /// Elements `start..=stop` (negative indexes count from the end).
    pub async fn lrange<S: AsRef<str>>(&self, path: &[S], start: i64, stop: i64) -> Result<Vec<String>> {
        self.ensure_open()?;
        let key = normalize_key_path(path)?;
        self.store
            .lrange(&key, start, stop, self.operation_timeout)
            .await
    }

    pub async fn llen<S: AsRef<str>>(&self, path: &[S]) -> Result<i64> {
        self.ensure_open()?;
        let key = normalize_key_path(path)?;
        self.store.llen(&key, self.operation_timeout).await
    }
}

/// Enables keyevent notifications for the selected classes and logs the
/// setting the store ended up with.
async fn configure_notifications(
    store: &StoreClient,
    options: &NotificationOptions,
    timeout: Duration,
) -> Result<()> {
    let flags = options.notify_flags();
    store
        .config_set(NOTIFY_KEYSPACE_EVENTS, &flags, timeout)
        .await
        .map_err(|e| Error::startup(format!("failed to set {} to {:?}", NOTIFY_KEYSPACE_EVENTS, flags), e))?;

    match store.config_get(NOTIFY_KEYSPACE_EVENTS, timeout).await {
        Ok(pairs) => {
            let effective = pairs
                .into_iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(NOTIFY_KEYSPACE_EVENTS))
                .map(|(_, value)| value);
            debug!(requested = %flags, effective = ?effective, "Keyspace notifications configured");
        }
        Err(e) => debug!(error = %e, "Could not read back keyspace notification setting"),
    }
    Ok(())
}

fn check_value_size(value: &str) -> Result<()> {
    if value.len() > MAX_VALUE_SIZE {
        return Err(Error::ValueSizeExceeded {
            size: value.len(),
            max: MAX_VALUE_SIZE,
        });
    }
    Ok(())
}

fn check_list_values<V: AsRef<str>>(values: &[V]) -> Result<Vec<&str>> {
    if values.is_empty() {
        return Err(Error::InvalidArgument(
            "at least one value is required".to_string(),
        ));
    }
    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let v = v.as_ref();
            if v.is_empty() {
                return Err(Error::InvalidArgument(format!("empty value at index {}", i)));
            }
            check_value_size(v)?;
            Ok(v)
        })
        .collect()
}
