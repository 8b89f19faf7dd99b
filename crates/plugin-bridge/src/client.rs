//! # Call Client
//!
//! Issues requests from the UI side. Two modes share the envelope machinery:
//!
//! - **await-result** (`call`, `call_value`, `call_with_timeout`): registers a
//!   pending call and settles exactly once, on the matching `Response`.
//! - **fire-and-forget** (`notify`): sends a request and tracks nothing. Any
//!   reply is dropped by the dispatcher as unroutable.
//!
//! A call whose request cannot be sent fails immediately and leaves no pending
//! entry. A call future dropped before settling reclaims its entry.

use crate::config::BridgeConfig;
use crate::correlation::CorrelationIdGen;
use crate::envelope::Envelope;
use crate::error::CallError;
use crate::metrics::MetricsRecorder;
use crate::pending::{PendingCallStore, PendingGuard, RegisterError};
use crate::transport::{ChannelTransport, TransportError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct CallClient {
    transport: Arc<ChannelTransport>,
    pending: Arc<PendingCallStore>,
    ids: CorrelationIdGen,
    default_timeout: Option<Duration>,
    metrics: Arc<dyn MetricsRecorder>,
}

impl CallClient {
    pub fn new(
        transport: Arc<ChannelTransport>,
        pending: Arc<PendingCallStore>,
        config: &BridgeConfig,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Self {
        Self {
            transport,
            pending,
            ids: CorrelationIdGen::new(config.correlation_scheme),
            default_timeout: config.call_timeout(),
            metrics,
        }
    }

    /// Call `name` and decode the response payload into `R`.
    pub async fn call<R, A>(&self, name: &str, args: A) -> Result<R, CallError>
    where
        R: DeserializeOwned,
        A: Serialize,
    {
        let payload = self.call_value(name, args).await?;
        serde_json::from_value(payload).map_err(|source| CallError::Decode {
            name: name.to_string(),
            source,
        })
    }

    /// Call `name` and return the raw response payload.
    pub async fn call_value<A: Serialize>(&self, name: &str, args: A) -> Result<Value, CallError> {
        self.request(name, args, self.default_timeout).await
    }

    /// Call `name`, giving up after `timeout`.
    pub async fn call_with_timeout<A: Serialize>(
        &self,
        name: &str,
        args: A,
        timeout: Duration,
    ) -> Result<Value, CallError> {
        self.request(name, args, Some(timeout)).await
    }

    /// Send a request nobody waits on. Failures are logged, never returned.
    pub fn notify<A: Serialize>(&self, name: &str, args: A) {
        let payload = match serde_json::to_value(args) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(name = name, error = %e, "Notification arguments not serializable");
                return;
            }
        };

        let envelope = Envelope::request(name, self.ids.next_id(), payload);
        match self.transport.send(&envelope) {
            Ok(()) => {
                self.metrics.record_notification_sent();
                debug!(name = name, "Sent notification");
            }
            Err(e) => warn!(name = name, error = %e, "Notification not sent"),
        }
    }

    /// Number of calls awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.pending.pending_count()
    }

    async fn request<A: Serialize>(
        &self,
        name: &str,
        args: A,
        timeout: Option<Duration>,
    ) -> Result<Value, CallError> {
        let payload = serde_json::to_value(args).map_err(TransportError::Serialize)?;

        let correlation_id = self.ids.next_id();
        let rx = self
            .pending
            .register(correlation_id.clone(), name)
            .map_err(|e| match e {
                RegisterError::Duplicate(id) => CallError::DuplicateCorrelationId(id),
                RegisterError::Closed => CallError::Closed {
                    name: name.to_string(),
                },
            })?;
        let _guard = PendingGuard::new(&self.pending, correlation_id.clone());

        let envelope = Envelope::request(name, correlation_id.clone(), payload);
        self.transport.send(&envelope)?;
        self.metrics.record_call_sent();

        debug!(correlation_id = %correlation_id, name = name, "Sent request");

        let settled = match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(settled) => settled,
                Err(_) => {
                    self.metrics.record_call_timed_out();
                    warn!(
                        correlation_id = %correlation_id,
                        name = name,
                        timeout_ms = limit.as_millis() as u64,
                        "Call timed out"
                    );
                    return Err(CallError::Timeout {
                        name: name.to_string(),
                        after: limit,
                    });
                }
            },
            None => rx.await,
        };

        match settled {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(remote)) => Err(CallError::Remote(remote)),
            Err(_) => Err(CallError::Closed {
                name: name.to_string(),
            }),
        }
    }
}
