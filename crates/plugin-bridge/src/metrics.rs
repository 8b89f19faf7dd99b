//! Metrics hooks for bridge traffic.
//!
//! The bridge reports every routing decision through a [`MetricsRecorder`].
//! [`BridgeMetrics`] keeps in-process counters; other backends (Prometheus in
//! `bridge-telemetry`) implement the same trait.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Trait for custom metrics recording implementations.
pub trait MetricsRecorder: Send + Sync {
    /// An await-result request was handed to the transport.
    fn record_call_sent(&self);

    /// A response settled a pending call.
    fn record_response_routed(&self, latency: Duration);

    /// A call gave up waiting.
    fn record_call_timed_out(&self);

    /// A fire-and-forget request was handed to the transport.
    fn record_notification_sent(&self);

    /// An event reached `listeners` listeners. Only called when at least one
    /// listener ran to completion.
    fn record_event_delivered(&self, listeners: usize);

    /// An envelope was dropped as unroutable.
    fn record_unroutable(&self);

    /// An inbound raw message failed to parse.
    fn record_malformed(&self);

    /// A listener panicked during delivery.
    fn record_listener_panic(&self);
}

/// Thread-safe counters for bridge traffic.
#[derive(Debug, Default)]
pub struct BridgeMetrics {
    pub calls_sent: AtomicU64,
    pub responses_routed: AtomicU64,
    pub calls_timed_out: AtomicU64,
    pub notifications_sent: AtomicU64,
    pub events_delivered: AtomicU64,
    pub listener_invocations: AtomicU64,
    pub unroutable_dropped: AtomicU64,
    pub malformed_dropped: AtomicU64,
    pub listener_panics: AtomicU64,
    /// Cumulative call latency in microseconds
    pub call_latency_us: AtomicU64,
}

impl BridgeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            calls_sent: self.calls_sent.load(Ordering::Relaxed),
            responses_routed: self.responses_routed.load(Ordering::Relaxed),
            calls_timed_out: self.calls_timed_out.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            listener_invocations: self.listener_invocations.load(Ordering::Relaxed),
            unroutable_dropped: self.unroutable_dropped.load(Ordering::Relaxed),
            malformed_dropped: self.malformed_dropped.load(Ordering::Relaxed),
            listener_panics: self.listener_panics.load(Ordering::Relaxed),
            avg_call_latency_us: self.avg_call_latency_us(),
        }
    }

    /// Average latency of settled calls in microseconds
    pub fn avg_call_latency_us(&self) -> u64 {
        let total = self.call_latency_us.load(Ordering::Relaxed);
        let count = self.responses_routed.load(Ordering::Relaxed);
        if count > 0 {
            total / count
        } else {
            0
        }
    }
}

impl MetricsRecorder for BridgeMetrics {
    fn record_call_sent(&self) {
        self.calls_sent.fetch_add(1, Ordering::Relaxed);
    }

    fn record_response_routed(&self, latency: Duration) {
        self.responses_routed.fetch_add(1, Ordering::Relaxed);
        self.call_latency_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    fn record_call_timed_out(&self) {
        self.calls_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    fn record_notification_sent(&self) {
        self.notifications_sent.fetch_add(1, Ordering::Relaxed);
    }

    fn record_event_delivered(&self, listeners: usize) {
        self.events_delivered.fetch_add(1, Ordering::Relaxed);
        self.listener_invocations
            .fetch_add(listeners as u64, Ordering::Relaxed);
    }

    fn record_unroutable(&self) {
        self.unroutable_dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn record_malformed(&self) {
        self.malformed_dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn record_listener_panic(&self) {
        self.listener_panics.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time metrics snapshot
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub calls_sent: u64,
    pub responses_routed: u64,
    pub calls_timed_out: u64,
    pub notifications_sent: u64,
    pub events_delivered: u64,
    pub listener_invocations: u64,
    pub unroutable_dropped: u64,
    pub malformed_dropped: u64,
    pub listener_panics: u64,
    pub avg_call_latency_us: u64,
}

/// No-op metrics recorder for when metrics are disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpMetrics;

impl MetricsRecorder for NoOpMetrics {
    fn record_call_sent(&self) {}
    fn record_response_routed(&self, _latency: Duration) {}
    fn record_call_timed_out(&self) {}
    fn record_notification_sent(&self) {}
    fn record_event_delivered(&self, _listeners: usize) {}
    fn record_unroutable(&self) {}
    fn record_malformed(&self) {}
    fn record_listener_panic(&self) {}
}
