//! The notification listener.
//!
//! ## Lifecycle
//!
//! ```text
//!            start()                 stop()
//!   Idle ─────────────────> Running ─────────> Stopped
//!    │  (subscribe + spawn)    │ (cancel, join,
//!    │                         │  close channel)
//!    └── start() fails: stays Idle
//! ```
//!
//! `start` on a running manager and `stop` on anything but a running manager
//! are no-ops. A stopped manager cannot be restarted: its channel is closed.
//!
//! ## Receive loop
//!
//! One task per manager. For every subscription message it classifies,
//! reads the value and hands the event to the consumer through a capacity-1
//! channel, so the loop waits for the consumer before taking the next
//! message. Cancellation is observed while waiting for a message, while
//! processing one, and while waiting for the consumer.

use super::backend::{KeyspaceBackend, MessageStream};
use super::classifier::EventClassifier;
use super::event::{EventType, KeyEvent};
use super::options::NotificationOptions;
use super::reconstruct::ValueReconstructor;
use crate::error::{Error, Result};
use crate::store::PubSubMessage;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Capacity of the hand-off channel
const HANDOFF_CAPACITY: usize = 1;

/// Consumer side of the event channel.
///
/// Clones share one underlying receiver: each event goes to exactly one of
/// them. After the manager stops, `recv` returns `None`.
#[derive(Clone)]
pub struct EventReceiver {
    inner: Arc<Mutex<mpsc::Receiver<KeyEvent>>>,
}

impl EventReceiver {
    fn new(rx: mpsc::Receiver<KeyEvent>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(rx)),
        }
    }

    /// Waits for the next event; `None` once the channel is closed.
    pub async fn recv(&self) -> Option<KeyEvent> {
        self.inner.lock().await.recv().await
    }

    /// Returns an event if one is ready, without waiting.
    pub fn try_recv(&self) -> Option<KeyEvent> {
        self.inner.try_lock().ok()?.try_recv().ok()
    }

    /// Closes the channel and discards anything still buffered.
    async fn close_and_drain(&self) -> usize {
        let mut rx = self.inner.lock().await;
        rx.close();

        let mut discarded = 0;
        while let Ok(event) = rx.try_recv() {
            debug!(key = %event.key, event = %event.event_type, "Discarding undelivered event");
            discarded += 1;
        }
        discarded
    }
}

enum Lifecycle {
    /// Holds the sender until the receive loop takes it over.
    Idle { sender: mpsc::Sender<KeyEvent> },
    Running { task: JoinHandle<()> },
    Stopped,
}

impl Lifecycle {
    fn name(&self) -> &'static str {
        match self {
            Lifecycle::Idle { .. } => "idle",
            Lifecycle::Running { .. } => "running",
            Lifecycle::Stopped => "stopped",
        }
    }
}

/// Subscribes to keyevent notifications and forwards them as [`KeyEvent`]s.
pub struct NotificationManager<B: KeyspaceBackend> {
    backend: B,
    channels: Vec<String>,
    classifier: Arc<EventClassifier>,
    reconstructor: ValueReconstructor,
    lifecycle: Mutex<Lifecycle>,
    cancel: CancellationToken,
    receiver: EventReceiver,
}

impl<B: KeyspaceBackend> NotificationManager<B> {
    /// Creates an idle manager for keyevents of `db`.
    pub fn new(backend: B, db: i64, options: &NotificationOptions) -> Self {
        let (sender, rx) = mpsc::channel(HANDOFF_CAPACITY);
        Self {
            backend,
            channels: options.channels(db),
            classifier: Arc::new(EventClassifier::new(db, options.expiry_probe_timeout)),
            reconstructor: ValueReconstructor::new(
                options.expiry_read_timeout,
                options.read_timeout,
            ),
            lifecycle: Mutex::new(Lifecycle::Idle { sender }),
            cancel: CancellationToken::new(),
            receiver: EventReceiver::new(rx),
        }
    }

    /// The event channel. Can be called at any time, before or after `start`.
    pub fn events(&self) -> EventReceiver {
        self.receiver.clone()
    }

    /// Channels this manager subscribes to.
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Subscribes and spawns the receive loop.
    ///
    /// A no-op when already running. Fails with [`Error::StartupFailed`] if
    /// the subscription cannot be established (the manager stays idle), and
    /// with [`Error::InstanceClosed`] once the manager has been stopped.
    pub async fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        let sender = match &*lifecycle {
            Lifecycle::Running { .. } => return Ok(()),
            Lifecycle::Stopped => return Err(Error::InstanceClosed),
            Lifecycle::Idle { sender } => sender.clone(),
        };

        let stream = self
            .backend
            .subscribe(&self.channels)
            .await
            .map_err(|e| Error::startup("failed to subscribe to keyevent channels", e))?;

        let task = tokio::spawn(receive_loop(
            self.backend.clone(),
            stream,
            Arc::clone(&self.classifier),
            self.reconstructor,
            sender,
            self.cancel.clone(),
        ));
        *lifecycle = Lifecycle::Running { task };

        info!(channels = ?self.channels, "Notification manager started");
        Ok(())
    }

    /// Stops the receive loop and closes the event channel.
    ///
    /// A no-op unless running. Returns once the loop task has finished, so
    /// no event is sent after this returns.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let task = match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            Lifecycle::Running { task } => task,
            other => {
                trace!(state = other.name(), "Stop ignored");
                *lifecycle = other;
                return;
            }
        };

        self.cancel.cancel();
        if let Err(e) = task.await {
            warn!(error = %e, "Receive loop task failed");
        }

        let discarded = self.receiver.close_and_drain().await;
        info!(discarded, "Notification manager stopped");
    }

    pub async fn is_running(&self) -> bool {
        matches!(*self.lifecycle.lock().await, Lifecycle::Running { .. })
    }
}

impl<B: KeyspaceBackend> Drop for NotificationManager<B> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn receive_loop<B: KeyspaceBackend>(
    backend: B,
    mut stream: B::Stream,
    classifier: Arc<EventClassifier>,
    reconstructor: ValueReconstructor,
    sender: mpsc::Sender<KeyEvent>,
    cancel: CancellationToken,
) {
    debug!("Receive loop started");

    loop {
        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            message = stream.next_message() => message,
        };
        let Some(message) = message else {
            warn!("Subscription ended, receive loop stopping");
            break;
        };

        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = process(&backend, &classifier, &reconstructor, message) => event,
        };
        let Some(event) = event else {
            continue;
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = sender.send(event) => {
                if sent.is_err() {
                    debug!("Event channel closed, receive loop stopping");
                    break;
                }
            }
        }
    }

    debug!("Receive loop finished");
}

/// Builds the event for one message; `None` when the message is dropped.
async fn process<B: KeyspaceBackend>(
    backend: &B,
    classifier: &EventClassifier,
    reconstructor: &ValueReconstructor,
    message: PubSubMessage,
) -> Option<KeyEvent> {
    let timestamp = Utc::now();

    let event_type = classifier.resolve(backend, &message).await;
    if event_type == EventType::Unknown {
        debug!(channel = %message.channel, key = %message.payload, "Dropping unrecognized notification");
        return None;
    }

    let PubSubMessage { channel, payload: key } = message;
    let value = reconstructor.value_for(backend, &key, event_type).await;
    trace!(key = %key, event = %event_type, "Emitting event");

    Some(KeyEvent {
        key,
        value,
        event_type,
        timestamp,
        source_channel: Some(channel),
    })
}
