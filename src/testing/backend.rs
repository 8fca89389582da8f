//! In-memory [`KeyspaceBackend`] for driving the listener without a store.

use crate::error::{Error, Result};
use crate::notify::KeyspaceBackend;
use crate::store::{PubSubMessage, TtlStatus};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Default)]
struct Inner {
    values: Mutex<HashMap<String, String>>,
    ttls: Mutex<HashMap<String, TtlStatus>>,
    read_delay: Mutex<Option<Duration>>,
    ttl_delay: Mutex<Option<Duration>>,
    stream: Mutex<Option<mpsc::Receiver<PubSubMessage>>>,
    subscriptions: Mutex<Vec<Vec<String>>>,
    fail_subscribe: AtomicBool,
    fail_reads: AtomicBool,
    ttl_probes: AtomicUsize,
}

#[derive(Clone, Default)]
pub(crate) struct FakeBackend {
    inner: Arc<Inner>,
}

impl FakeBackend {
    /// Returns the backend and the sender feeding its subscription stream.
    pub fn new() -> (Self, mpsc::Sender<PubSubMessage>) {
        let (tx, rx) = mpsc::channel(64);
        let backend = Self::default();
        *backend.inner.stream.lock().unwrap() = Some(rx);
        (backend, tx)
    }

    pub fn set_value(&self, key: &str, value: &str) {
        self.inner
            .values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    pub fn set_ttl(&self, key: &str, status: TtlStatus) {
        self.inner
            .ttls
            .lock()
            .unwrap()
            .insert(key.to_string(), status);
    }

    pub fn set_read_delay(&self, delay: Duration) {
        *self.inner.read_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_ttl_delay(&self, delay: Duration) {
        *self.inner.ttl_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_subscribe(&self) {
        self.inner.fail_subscribe.store(true, Ordering::SeqCst);
    }

    pub fn fail_reads(&self) {
        self.inner.fail_reads.store(true, Ordering::SeqCst);
    }

    /// Channel lists passed to every `subscribe` call so far.
    pub fn subscriptions(&self) -> Vec<Vec<String>> {
        self.inner.subscriptions.lock().unwrap().clone()
    }

    pub fn ttl_probes(&self) -> usize {
        self.inner.ttl_probes.load(Ordering::SeqCst)
    }
}

/// Sleeps for the configured delay, failing with a timeout when the delay
/// is longer than the caller's deadline.
async fn simulate_latency(delay: Option<Duration>, timeout: Duration) -> Result<()> {
    match delay {
        Some(delay) if delay > timeout => {
            tokio::time::sleep(timeout).await;
            Err(Error::Timeout(timeout))
        }
        Some(delay) => {
            tokio::time::sleep(delay).await;
            Ok(())
        }
        None => Ok(()),
    }
}

impl KeyspaceBackend for FakeBackend {
    type Stream = mpsc::Receiver<PubSubMessage>;

    async fn subscribe(&self, channels: &[String]) -> Result<Self::Stream> {
        if self.inner.fail_subscribe.load(Ordering::SeqCst) {
            return Err(Error::Server("ERR subscriptions refused".to_string()));
        }
        self.inner
            .subscriptions
            .lock()
            .unwrap()
            .push(channels.to_vec());
        let stream = self.inner.stream.lock().unwrap().take();
        stream.ok_or_else(|| Error::Server("ERR stream already taken".to_string()))
    }

    async fn get_value(&self, key: &str, timeout: Duration) -> Result<Option<String>> {
        let delay = *self.inner.read_delay.lock().unwrap();
        simulate_latency(delay, timeout).await?;
        if self.inner.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::Server("ERR read failed".to_string()));
        }
        let value = self.inner.values.lock().unwrap().get(key).cloned();
        Ok(value)
    }

    async fn ttl_status(&self, key: &str, timeout: Duration) -> Result<TtlStatus> {
        self.inner.ttl_probes.fetch_add(1, Ordering::SeqCst);
        let delay = *self.inner.ttl_delay.lock().unwrap();
        simulate_latency(delay, timeout).await?;

        let status = self.inner.ttls.lock().unwrap().get(key).copied();
        Ok(match status {
            Some(status) => status,
            None if self.inner.values.lock().unwrap().contains_key(key) => TtlStatus::NoExpiry,
            None => TtlStatus::DoesNotExist,
        })
    }
}
