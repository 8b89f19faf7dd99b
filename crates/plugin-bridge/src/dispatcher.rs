//! # Dispatcher
//!
//! Routes each parsed inbound envelope to exactly one destination:
//!
//! ```text
//! Received -> Parsed -> RoutedToPendingCall
//!                    -> RoutedToSubscribers
//!                    -> DroppedUnroutable
//! ```
//!
//! Every branch is terminal. Nothing is retried here.

use crate::correlation::CorrelationId;
use crate::envelope::{Envelope, Route, UnroutableReason};
use crate::metrics::MetricsRecorder;
use crate::pending::PendingCallStore;
use crate::subscription::SubscriptionRegistry;
use std::sync::Arc;
use tracing::{debug, warn};

/// Where an inbound envelope ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    RoutedToPendingCall(CorrelationId),
    RoutedToSubscribers { channel: String, listeners: usize },
    DroppedUnroutable(UnroutableReason),
}

pub struct Dispatcher {
    pending: Arc<PendingCallStore>,
    subscriptions: Arc<SubscriptionRegistry>,
    metrics: Arc<dyn MetricsRecorder>,
}

impl Dispatcher {
    pub fn new(
        pending: Arc<PendingCallStore>,
        subscriptions: Arc<SubscriptionRegistry>,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Self {
        Self {
            pending,
            subscriptions,
            metrics,
        }
    }

    /// Route one envelope.
    pub fn dispatch(&self, envelope: Envelope) -> DispatchOutcome {
        match envelope.into_route() {
            Route::Response {
                correlation_id,
                outcome,
            } => match self.pending.complete(&correlation_id, outcome) {
                Some(completion) => {
                    self.metrics.record_response_routed(completion.latency);
                    DispatchOutcome::RoutedToPendingCall(correlation_id)
                }
                None => self.drop_unroutable(UnroutableReason::UnknownCorrelationId(correlation_id)),
            },
            Route::Event { channel, item } => {
                let listeners = self.subscriptions.deliver(&channel, item);
                if listeners > 0 {
                    self.metrics.record_event_delivered(listeners);
                    debug!(channel = %channel, listeners = listeners, "Event delivered");
                }
                DispatchOutcome::RoutedToSubscribers { channel, listeners }
            }
            Route::Unroutable(reason) => self.drop_unroutable(reason),
        }
    }

    fn drop_unroutable(&self, reason: UnroutableReason) -> DispatchOutcome {
        self.metrics.record_unroutable();
        match &reason {
            // Late replies and replies to notifications are expected traffic.
            UnroutableReason::UnknownCorrelationId(_) => {
                debug!(reason = %reason, "Dropping unroutable envelope")
            }
            _ => warn!(reason = %reason, "Dropping envelope that violates the protocol"),
        }
        DispatchOutcome::DroppedUnroutable(reason)
    }
}
