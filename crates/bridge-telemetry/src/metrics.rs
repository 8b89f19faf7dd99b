//! Prometheus metrics for bridge traffic.
//!
//! All metrics follow the naming convention: `plugin_bridge_<metric>_<unit>`.
//! Each [`PrometheusRecorder`] owns its registry, so two bridges in one process
//! never collide on registration.

use crate::TelemetryError;
use plugin_bridge::MetricsRecorder;
use prometheus::{
    exponential_buckets, Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder,
};
use std::time::Duration;

/// [`MetricsRecorder`] backed by Prometheus collectors.
pub struct PrometheusRecorder {
    registry: Registry,
    calls_sent: IntCounter,
    responses_routed: IntCounter,
    calls_timed_out: IntCounter,
    notifications_sent: IntCounter,
    events_delivered: IntCounter,
    listener_invocations: IntCounter,
    unroutable_dropped: IntCounter,
    malformed_dropped: IntCounter,
    listener_panics: IntCounter,
    call_latency: Histogram,
}

impl PrometheusRecorder {
    /// Create the collectors and register them in a fresh registry.
    pub fn new() -> Result<Self, TelemetryError> {
        let registry = Registry::new();

        let recorder = Self {
            calls_sent: counter(&registry, "calls_sent_total", "Await-result requests sent")?,
            responses_routed: counter(
                &registry,
                "responses_routed_total",
                "Responses that settled a pending call",
            )?,
            calls_timed_out: counter(&registry, "calls_timed_out_total", "Calls that hit their deadline")?,
            notifications_sent: counter(
                &registry,
                "notifications_sent_total",
                "Fire-and-forget requests sent",
            )?,
            events_delivered: counter(&registry, "events_delivered_total", "Events that reached at least one listener")?,
            listener_invocations: counter(
                &registry,
                "listener_invocations_total",
                "Listener callbacks run for delivered events",
            )?,
            unroutable_dropped: counter(
                &registry,
                "unroutable_dropped_total",
                "Envelopes dropped with nowhere to go",
            )?,
            malformed_dropped: counter(
                &registry,
                "malformed_dropped_total",
                "Inbound messages that failed to parse",
            )?,
            listener_panics: counter(&registry, "listener_panics_total", "Listeners that panicked")?,
            call_latency: histogram(&registry)?,
            registry,
        };

        Ok(recorder)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encode all metrics as Prometheus text format.
    pub fn encode(&self) -> Result<String, TelemetryError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
    }
}

impl MetricsRecorder for PrometheusRecorder {
    fn record_call_sent(&self) {
        self.calls_sent.inc();
    }

    fn record_response_routed(&self, latency: Duration) {
        self.responses_routed.inc();
        self.call_latency.observe(latency.as_secs_f64());
    }

    fn record_call_timed_out(&self) {
        self.calls_timed_out.inc();
    }

    fn record_notification_sent(&self) {
        self.notifications_sent.inc();
    }

    fn record_event_delivered(&self, listeners: usize) {
        self.events_delivered.inc();
        self.listener_invocations.inc_by(listeners as u64);
    }

    fn record_unroutable(&self) {
        self.unroutable_dropped.inc();
    }

    fn record_malformed(&self) {
        self.malformed_dropped.inc();
    }

    fn record_listener_panic(&self) {
        self.listener_panics.inc();
    }
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, TelemetryError> {
    let counter = IntCounter::new(format!("plugin_bridge_{name}"), help)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    Ok(counter)
}

fn histogram(registry: &Registry) -> Result<Histogram, TelemetryError> {
    let buckets = exponential_buckets(0.0005, 2.0, 14)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    let histogram = Histogram::with_opts(
        HistogramOpts::new(
            "plugin_bridge_call_latency_seconds",
            "Time from sending a request to routing its response",
        )
        .buckets(buckets),
    )
    .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    registry
        .register(Box::new(histogram.clone()))
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    Ok(histogram)
}
