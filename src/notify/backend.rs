//! The store primitives the listener depends on.
//!
//! [`StoreClient`] and [`Subscription`] are the production implementations.
//! Any `mpsc::Receiver<PubSubMessage>` is also a [`MessageStream`], which is
//! how tests feed the listener without a store.

use crate::error::Result;
use crate::store::{PubSubMessage, StoreClient, Subscription, TtlStatus};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;

/// Store access used by the notification listener.
pub trait KeyspaceBackend: Clone + Send + Sync + 'static {
    type Stream: MessageStream;

    /// Subscribes to `channels` on a connection of its own.
    fn subscribe(&self, channels: &[String]) -> impl Future<Output = Result<Self::Stream>> + Send;

    /// Point read bounded by `timeout`; `Ok(None)` when the key is absent.
    fn get_value(
        &self,
        key: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Option<String>>> + Send;

    /// TTL query bounded by `timeout`.
    fn ttl_status(
        &self,
        key: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<TtlStatus>> + Send;
}

/// A live sequence of pub/sub messages.
pub trait MessageStream: Send + 'static {
    /// Waits for the next message; `None` once the feed has ended.
    fn next_message(&mut self) -> impl Future<Output = Option<PubSubMessage>> + Send;
}

impl KeyspaceBackend for StoreClient {
    type Stream = Subscription;

    async fn subscribe(&self, channels: &[String]) -> Result<Subscription> {
        StoreClient::subscribe(self, channels).await
    }

    async fn get_value(&self, key: &str, timeout: Duration) -> Result<Option<String>> {
        self.get(key, timeout).await
    }

    async fn ttl_status(&self, key: &str, timeout: Duration) -> Result<TtlStatus> {
        self.ttl(key, timeout).await
    }
}

impl MessageStream for Subscription {
    async fn next_message(&mut self) -> Option<PubSubMessage> {
        Subscription::next_message(self).await
    }
}

impl MessageStream for mpsc::Receiver<PubSubMessage> {
    async fn next_message(&mut self) -> Option<PubSubMessage> {
        self.recv().await
    }
}
