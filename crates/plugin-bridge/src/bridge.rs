//! # Plugin Bridge
//!
//! UI-side facade owning one transport, one pending-call table and one
//! subscription registry. Nothing here is process-wide: every bridge instance
//! is independent, and all of its state goes away on [`PluginBridge::shutdown`]
//! or drop.
//!
//! ```ignore
//! let (ui, sandbox) = memory_pair();
//! let bridge = Arc::new(PluginBridge::new(Arc::new(ui.channel), BridgeConfig::default())?);
//! tokio::spawn({
//!     let bridge = bridge.clone();
//!     async move { bridge.run(ui.inbound).await }
//! });
//!
//! let _preview = bridge.subscribe("selectionPreview", |item| { /* ... */ });
//! bridge.announce_ready();
//! let selection: Value = bridge.call("getSelection", ()).await?;
//! ```

use crate::client::CallClient;
use crate::config::BridgeConfig;
use crate::dispatcher::Dispatcher;
use crate::envelope::EventResult;
use crate::error::{BridgeError, CallError};
use crate::metrics::{BridgeMetrics, MetricsRecorder};
use crate::pending::PendingCallStore;
use crate::subscription::{EventStream, Subscription, SubscriptionRegistry};
use crate::transport::{ChannelTransport, RawChannel};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// What teardown released.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub rejected_calls: usize,
    pub dropped_listeners: usize,
}

pub struct PluginBridge {
    transport: Arc<ChannelTransport>,
    client: CallClient,
    pending: Arc<PendingCallStore>,
    subscriptions: Arc<SubscriptionRegistry>,
    metrics: Arc<dyn MetricsRecorder>,
    config: BridgeConfig,
    closed: AtomicBool,
}

impl PluginBridge {
    /// Create a bridge over `channel` with in-process counters.
    pub fn new(channel: Arc<dyn RawChannel>, config: BridgeConfig) -> Result<Self, BridgeError> {
        Self::with_recorder(channel, config, Arc::new(BridgeMetrics::new()))
    }

    /// Create a bridge reporting to a custom metrics recorder.
    pub fn with_recorder(
        channel: Arc<dyn RawChannel>,
        config: BridgeConfig,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Result<Self, BridgeError> {
        config.validate()?;

        let transport = Arc::new(ChannelTransport::with_metrics(channel, metrics.clone()));
        let pending = Arc::new(PendingCallStore::new());
        let subscriptions = Arc::new(SubscriptionRegistry::with_metrics(metrics.clone()));

        let dispatcher = Dispatcher::new(pending.clone(), subscriptions.clone(), metrics.clone());
        transport.on_receive(move |envelope| {
            dispatcher.dispatch(envelope);
        })?;

        let client = CallClient::new(transport.clone(), pending.clone(), &config, metrics.clone());

        info!(
            correlation_scheme = ?config.correlation_scheme,
            call_timeout_ms = ?config.call_timeout_ms,
            "Plugin bridge created"
        );

        Ok(Self {
            transport,
            client,
            pending,
            subscriptions,
            metrics,
            config,
            closed: AtomicBool::new(false),
        })
    }

    /// Handle one raw inbound message. Returns `true` if it parsed.
    pub fn receive(&self, raw: Value) -> bool {
        self.transport.receive(raw)
    }

    /// Drive inbound traffic until the sandbox side closes.
    pub async fn run(&self, inbound: mpsc::UnboundedReceiver<Value>) {
        self.transport.pump(inbound).await;
    }

    /// Await-result call, decoding the payload into `R`.
    pub async fn call<R, A>(&self, name: &str, args: A) -> Result<R, CallError>
    where
        R: DeserializeOwned,
        A: Serialize,
    {
        self.ensure_open(name)?;
        self.client.call(name, args).await
    }

    /// Await-result call returning the raw payload.
    pub async fn call_value<A: Serialize>(&self, name: &str, args: A) -> Result<Value, CallError> {
        self.ensure_open(name)?;
        self.client.call_value(name, args).await
    }

    /// Await-result call with an explicit deadline.
    pub async fn call_with_timeout<A: Serialize>(
        &self,
        name: &str,
        args: A,
        timeout: Duration,
    ) -> Result<Value, CallError> {
        self.ensure_open(name)?;
        self.client.call_with_timeout(name, args, timeout).await
    }

    /// Fire-and-forget call.
    pub fn notify<A: Serialize>(&self, name: &str, args: A) {
        if self.is_closed() {
            debug!(name = name, "Bridge closed, notification skipped");
            return;
        }
        self.client.notify(name, args);
    }

    /// Tell the sandbox the UI is listening. Subscribe first, then announce.
    pub fn announce_ready(&self) {
        info!(name = %self.config.ready_notification, "Announcing UI ready");
        self.notify(&self.config.ready_notification, ());
    }

    /// Listen on an event channel until the returned handle is disposed.
    ///
    /// After shutdown the handle is inactive and the listener never runs.
    pub fn subscribe<F>(&self, channel: &str, listener: F) -> Subscription
    where
        F: Fn(EventResult) + Send + Sync + 'static,
    {
        self.subscriptions.subscribe(channel, listener)
    }

    /// Listen on an event channel as an async stream. Ends at once after
    /// shutdown.
    pub fn subscribe_stream(&self, channel: &str) -> EventStream {
        self.subscriptions.stream(channel)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.pending_count()
    }

    pub fn listener_count(&self, channel: &str) -> usize {
        self.subscriptions.listener_count(channel)
    }

    pub fn metrics(&self) -> &Arc<dyn MetricsRecorder> {
        &self.metrics
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Tear the bridge down: pending calls reject with `Closed`, listeners are
    /// dropped, later calls fail. Only the first call does anything.
    pub fn shutdown(&self) -> ShutdownReport {
        if self.closed.swap(true, Ordering::AcqRel) {
            return ShutdownReport::default();
        }
        let report = ShutdownReport {
            rejected_calls: self.pending.reject_all(),
            dropped_listeners: self.subscriptions.close(),
        };
        info!(
            rejected_calls = report.rejected_calls,
            dropped_listeners = report.dropped_listeners,
            "Plugin bridge shut down"
        );
        report
    }

    fn ensure_open(&self, name: &str) -> Result<(), CallError> {
        if self.is_closed() {
            return Err(CallError::Closed {
                name: name.to_string(),
            });
        }
        Ok(())
    }
}

impl Drop for PluginBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}
