//! # Sandbox Endpoint
//!
//! The other end of the bridge: receives requests from the UI, answers them
//! with responses echoing the correlation id, and pushes events.
//!
//! Used by in-process hosts and by tests that play the sandbox role.

use crate::correlation::CorrelationId;
use crate::envelope::{Envelope, EnvelopeKind, MalformedEnvelope};
use crate::transport::{ChannelTransport, RawChannel, TransportError};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A request as seen by the sandbox.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingRequest {
    pub name: String,
    /// `None` only for peers that break the protocol; such requests cannot be
    /// answered.
    pub correlation_id: Option<CorrelationId>,
    pub payload: Value,
}

/// Parse failures on the sandbox side.
#[derive(Debug, thiserror::Error)]
pub enum IncomingError {
    #[error(transparent)]
    Malformed(#[from] MalformedEnvelope),

    #[error("expected a Request envelope, got {0:?}")]
    NotARequest(EnvelopeKind),
}

impl IncomingRequest {
    pub fn from_raw(raw: Value) -> Result<Self, IncomingError> {
        let envelope = Envelope::from_raw(raw)?;
        if envelope.kind != EnvelopeKind::Request {
            return Err(IncomingError::NotARequest(envelope.kind));
        }
        Ok(Self {
            name: envelope.name,
            correlation_id: envelope.correlation_id,
            payload: envelope.payload,
        })
    }
}

pub struct SandboxEndpoint {
    transport: ChannelTransport,
}

impl SandboxEndpoint {
    pub fn new(channel: Arc<dyn RawChannel>) -> Self {
        Self {
            transport: ChannelTransport::new(channel),
        }
    }

    /// Answer `request` with a payload.
    pub fn reply(&self, request: &IncomingRequest, payload: Value) -> Result<(), TransportError> {
        match &request.correlation_id {
            Some(id) => self
                .transport
                .send(&Envelope::response(&request.name, id.clone(), payload)),
            None => {
                warn!(name = %request.name, "Request carries no correlation id, reply skipped");
                Ok(())
            }
        }
    }

    /// Answer `request` with an error.
    pub fn reply_error(
        &self,
        request: &IncomingRequest,
        message: impl Into<String>,
    ) -> Result<(), TransportError> {
        match &request.correlation_id {
            Some(id) => self
                .transport
                .send(&Envelope::error_response(&request.name, id.clone(), message)),
            None => {
                warn!(name = %request.name, "Request carries no correlation id, reply skipped");
                Ok(())
            }
        }
    }

    /// Push an event on `channel`.
    pub fn emit<T: Serialize>(&self, channel: &str, payload: T) -> Result<(), TransportError> {
        let payload = serde_json::to_value(payload)?;
        self.transport.send(&Envelope::event(channel, payload))
    }

    /// Push a failure on `channel`.
    pub fn emit_error(&self, channel: &str, message: impl Into<String>) -> Result<(), TransportError> {
        self.transport.send(&Envelope::error_event(channel, message))
    }

    /// Answer every request arriving on `inbound` with `handler` until the UI
    /// side goes away. Non-request messages are skipped.
    pub async fn serve<H>(&self, mut inbound: mpsc::UnboundedReceiver<Value>, handler: H)
    where
        H: Fn(&str, Value) -> Result<Value, String>,
    {
        info!("Sandbox endpoint serving");
        while let Some(raw) = inbound.recv().await {
            let request = match IncomingRequest::from_raw(raw) {
                Ok(request) => request,
                Err(e) => {
                    warn!(error = %e, "Sandbox dropping inbound message");
                    continue;
                }
            };

            debug!(name = %request.name, correlation_id = ?request.correlation_id, "Handling request");
            let sent = match handler(&request.name, request.payload.clone()) {
                Ok(payload) => self.reply(&request, payload),
                Err(message) => self.reply_error(&request, message),
            };
            if let Err(e) = sent {
                warn!(name = %request.name, error = %e, "Sandbox reply not sent, stopping");
                break;
            }
        }
        info!("Sandbox endpoint stopped");
    }
}
