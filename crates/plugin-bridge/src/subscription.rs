//! # Subscription Registry
//!
//! Named event channels with any number of independent listeners.
//!
//! - Every listener on a channel receives every event, in delivery order.
//! - A listener that panics is isolated: its siblings still get the event.
//! - A [`Subscription`] handle removes exactly its own listener, once.
//!   Dropping the handle unsubscribes.
//! - Once closed, the registry refuses new listeners and hands back an
//!   inactive handle.

use crate::envelope::EventResult;
use crate::metrics::{MetricsRecorder, NoOpMetrics};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, error};

/// Callback invoked for each event on a channel.
pub type Listener = Arc<dyn Fn(EventResult) + Send + Sync>;

/// Identifies one listener within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct ListenerEntry {
    id: ListenerId,
    listener: Listener,
}

/// Registry of event channel listeners owned by one bridge instance.
pub struct SubscriptionRegistry {
    channels: RwLock<HashMap<String, Vec<ListenerEntry>>>,
    next_id: AtomicU64,
    metrics: Arc<dyn MetricsRecorder>,
    /// Only flipped under the `channels` write lock.
    closed: AtomicBool,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::with_metrics(Arc::new(NoOpMetrics))
    }

    pub fn with_metrics(metrics: Arc<dyn MetricsRecorder>) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            metrics,
            closed: AtomicBool::new(false),
        }
    }

    /// Register `listener` on `channel`.
    ///
    /// On a closed registry the listener is dropped unregistered and the
    /// returned handle is already inactive.
    pub fn subscribe<F>(self: &Arc<Self>, channel: &str, listener: F) -> Subscription
    where
        F: Fn(EventResult) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut channels = self.channels.write();
        if self.closed.load(Ordering::Acquire) {
            drop(channels);
            debug!(channel = channel, listener = id.0, "Registry closed, subscription refused");
            return Subscription {
                registry: Weak::new(),
                channel: channel.to_string(),
                id,
                active: AtomicBool::new(false),
            };
        }
        channels
            .entry(channel.to_string())
            .or_default()
            .push(ListenerEntry {
                id,
                listener: Arc::new(listener),
            });
        drop(channels);

        debug!(channel = channel, listener = id.0, "New subscription created");

        Subscription {
            registry: Arc::downgrade(self),
            channel: channel.to_string(),
            id,
            active: AtomicBool::new(true),
        }
    }

    /// Subscribe and receive events as an async stream.
    ///
    /// On a closed registry the stream ends immediately.
    pub fn stream(self: &Arc<Self>, channel: &str) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(channel, move |item| {
            // Receiver gone means the stream was dropped; its subscription goes with it.
            let _ = tx.send(item);
        });
        EventStream {
            inner: UnboundedReceiverStream::new(rx),
            subscription,
        }
    }

    /// Deliver one event to every listener of `channel`.
    ///
    /// Listeners run outside the registry lock on a snapshot taken at entry, so
    /// they may subscribe or unsubscribe from inside the callback. Returns the
    /// number of listeners that completed without panicking.
    pub fn deliver(&self, channel: &str, item: EventResult) -> usize {
        let listeners: Vec<Listener> = match self.channels.read().get(channel) {
            Some(entries) => entries.iter().map(|e| e.listener.clone()).collect(),
            None => Vec::new(),
        };

        if listeners.is_empty() {
            debug!(channel = channel, "Event has no listeners");
            return 0;
        }

        let mut delivered = 0;
        for listener in listeners {
            let item = item.clone();
            match catch_unwind(AssertUnwindSafe(|| listener(item))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    self.metrics.record_listener_panic();
                    error!(
                        channel = channel,
                        panic = panic_message(panic.as_ref()),
                        "Event listener panicked, continuing delivery"
                    );
                }
            }
        }
        delivered
    }

    /// Remove one listener. Returns `false` if it was already gone.
    fn remove(&self, channel: &str, id: ListenerId) -> bool {
        let mut channels = self.channels.write();
        let Some(entries) = channels.get_mut(channel) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            channels.remove(channel);
        }
        removed
    }

    /// Number of listeners on `channel`.
    pub fn listener_count(&self, channel: &str) -> usize {
        self.channels.read().get(channel).map_or(0, Vec::len)
    }

    /// Number of channels with at least one listener.
    pub fn channel_count(&self) -> usize {
        self.channels.read().len()
    }

    /// Drop every listener and refuse new ones. Used on bridge teardown.
    ///
    /// Returns the number of listeners dropped.
    pub fn close(&self) -> usize {
        let drained: Vec<_> = {
            let mut channels = self.channels.write();
            self.closed.store(true, Ordering::Release);
            channels.drain().collect()
        };
        drained.iter().map(|(_, entries)| entries.len()).sum()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Handle for one listener registration.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    registry: Weak<SubscriptionRegistry>,
    channel: String,
    id: ListenerId,
    active: AtomicBool,
}

impl Subscription {
    /// Stop receiving events. Idempotent; only the first call has an effect.
    pub fn unsubscribe(&self) -> bool {
        if !self.active.swap(false, Ordering::AcqRel) {
            return false;
        }
        let removed = self
            .registry
            .upgrade()
            .is_some_and(|registry| registry.remove(&self.channel, self.id));
        debug!(channel = %self.channel, listener = self.id.0, "Subscription dropped");
        removed
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// A stream wrapper for subscriptions.
///
/// Ends when the registry is closed (bridge teardown).
pub struct EventStream {
    inner: UnboundedReceiverStream<EventResult>,
    subscription: Subscription,
}

impl EventStream {
    /// Receive the next event, or `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<EventResult> {
        self.inner.next().await
    }

    pub fn channel(&self) -> &str {
        self.subscription.channel()
    }
}

impl Stream for EventStream {
    type Item = EventResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
