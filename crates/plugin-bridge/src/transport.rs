//! # Channel Transport
//!
//! Wraps the one raw, bidirectional message primitive between the UI and the
//! sandbox. Outbound envelopes are serialized into structured values and
//! posted; inbound values are parsed into [`Envelope`]s and handed to a single
//! registered handler (the dispatcher).
//!
//! Malformed inbound messages are dropped with a diagnostic. Each inbound
//! message is fully handled before the next one is looked at.

use crate::envelope::Envelope;
use crate::metrics::{MetricsRecorder, NoOpMetrics};
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("channel closed")]
    ChannelClosed,

    #[error("inbound handler already registered")]
    HandlerAlreadyRegistered,
}

/// The raw message primitive between the two contexts.
pub trait RawChannel: Send + Sync {
    /// Hand one structured message to the other side.
    fn post(&self, message: Value) -> Result<(), TransportError>;
}

/// Handler invoked for every parsed inbound envelope.
pub type InboundHandler = Box<dyn Fn(Envelope) + Send + Sync>;

/// Envelope-level wrapper around a [`RawChannel`].
pub struct ChannelTransport {
    channel: Arc<dyn RawChannel>,
    handler: OnceLock<InboundHandler>,
    metrics: Arc<dyn MetricsRecorder>,
}

impl ChannelTransport {
    pub fn new(channel: Arc<dyn RawChannel>) -> Self {
        Self::with_metrics(channel, Arc::new(NoOpMetrics))
    }

    pub fn with_metrics(channel: Arc<dyn RawChannel>, metrics: Arc<dyn MetricsRecorder>) -> Self {
        Self {
            channel,
            handler: OnceLock::new(),
            metrics,
        }
    }

    /// Serialize and post an envelope.
    pub fn send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let raw = envelope.to_raw().map_err(|e| {
            warn!(name = %envelope.name, kind = ?envelope.kind, error = %e, "Envelope not serializable");
            TransportError::Serialize(e)
        })?;

        self.channel.post(raw).map_err(|e| {
            warn!(name = %envelope.name, kind = ?envelope.kind, error = %e, "Raw channel rejected message");
            e
        })
    }

    /// Register the inbound handler. Only one may ever be set.
    pub fn on_receive<F>(&self, handler: F) -> Result<(), TransportError>
    where
        F: Fn(Envelope) + Send + Sync + 'static,
    {
        self.handler
            .set(Box::new(handler))
            .map_err(|_| TransportError::HandlerAlreadyRegistered)
    }

    /// Parse one inbound raw message and hand it to the handler.
    ///
    /// Returns `true` if the message reached the handler.
    pub fn receive(&self, raw: Value) -> bool {
        let envelope = match Envelope::from_raw(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.metrics.record_malformed();
                warn!(error = %e, "Dropping malformed inbound message");
                return false;
            }
        };

        let Some(handler) = self.handler.get() else {
            warn!(name = %envelope.name, kind = ?envelope.kind, "No inbound handler registered, dropping message");
            return false;
        };

        handler(envelope);
        true
    }

    /// Feed inbound messages from `inbound` until the other side goes away.
    pub async fn pump(&self, mut inbound: mpsc::UnboundedReceiver<Value>) {
        info!("Inbound pump started");
        while let Some(raw) = inbound.recv().await {
            self.receive(raw);
        }
        info!("Inbound channel closed, pump stopped");
    }
}

/// In-process [`RawChannel`] backed by an unbounded tokio channel.
#[derive(Clone)]
pub struct MemoryChannel {
    tx: mpsc::UnboundedSender<Value>,
}

impl RawChannel for MemoryChannel {
    fn post(&self, message: Value) -> Result<(), TransportError> {
        self.tx.send(message).map_err(|_| TransportError::ChannelClosed)
    }
}

/// One side of an in-process duplex channel.
pub struct MemoryPort {
    /// Posts to the opposite port.
    pub channel: MemoryChannel,
    /// Messages posted by the opposite port.
    pub inbound: mpsc::UnboundedReceiver<Value>,
}

/// Create a connected pair of ports (e.g. UI side and sandbox side).
pub fn memory_pair() -> (MemoryPort, MemoryPort) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    debug!("Created in-memory channel pair");
    (
        MemoryPort {
            channel: MemoryChannel { tx: b_tx },
            inbound: a_rx,
        },
        MemoryPort {
            channel: MemoryChannel { tx: a_tx },
            inbound: b_rx,
        },
    )
}
