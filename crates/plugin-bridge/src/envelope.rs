//! # Envelopes
//!
//! The structured unit exchanged over the raw channel between the UI and the
//! sandbox. Three kinds share one shape:
//!
//! | kind       | `name`            | `correlationId` | `error`  |
//! |------------|-------------------|-----------------|----------|
//! | `Request`  | call name         | required        | absent   |
//! | `Response` | call name (echo)  | echoed          | optional |
//! | `Event`    | channel name      | absent          | optional |
//!
//! Request names and event channel names live in separate name spaces.

use crate::correlation::CorrelationId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Discriminates the three envelope kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnvelopeKind {
    /// A call from one side into the other.
    Request,
    /// The single answer to a `Request`.
    Response,
    /// A push on a named event channel.
    Event,
}

/// Error reported by the sandbox for one request or one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct RemoteError {
    /// Human-readable description.
    pub message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// What a listener receives for each pushed event.
pub type EventResult = Result<Value, RemoteError>;

/// One message on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub kind: EnvelopeKind,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
}

/// An inbound raw message that could not be parsed into an [`Envelope`].
#[derive(Debug, Error)]
#[error("malformed envelope: {0}")]
pub struct MalformedEnvelope(#[from] serde_json::Error);

/// Why an inbound envelope has nowhere to go.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnroutableReason {
    #[error("request {name:?} sent to a side that serves no requests")]
    UnexpectedRequest { name: String },

    #[error("response {name:?} carries no correlation id")]
    MissingCorrelationId { name: String },

    #[error("event {name:?} carries correlation id {correlation_id}")]
    CorrelatedEvent {
        name: String,
        correlation_id: CorrelationId,
    },

    #[error("event has an empty channel name")]
    UnnamedEvent,

    #[error("no pending call for correlation id {0} (unknown, settled or timed out)")]
    UnknownCorrelationId(CorrelationId),
}

/// Classification of an inbound envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Candidate answer for the pending call with this id.
    Response {
        correlation_id: CorrelationId,
        outcome: Result<Value, RemoteError>,
    },
    /// A push for every listener of `channel`.
    Event { channel: String, item: EventResult },
    /// Protocol violation; dropped by the dispatcher.
    Unroutable(UnroutableReason),
}

impl Envelope {
    /// Build a request envelope.
    pub fn request(name: impl Into<String>, correlation_id: CorrelationId, payload: Value) -> Self {
        Self {
            kind: EnvelopeKind::Request,
            name: name.into(),
            correlation_id: Some(correlation_id),
            payload,
            error: None,
        }
    }

    /// Build a successful response echoing `correlation_id`.
    pub fn response(name: impl Into<String>, correlation_id: CorrelationId, payload: Value) -> Self {
        Self {
            kind: EnvelopeKind::Response,
            name: name.into(),
            correlation_id: Some(correlation_id),
            payload,
            error: None,
        }
    }

    /// Build a failed response echoing `correlation_id`.
    pub fn error_response(
        name: impl Into<String>,
        correlation_id: CorrelationId,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: EnvelopeKind::Response,
            name: name.into(),
            correlation_id: Some(correlation_id),
            payload: Value::Null,
            error: Some(RemoteError::new(message)),
        }
    }

    /// Build an event for `channel`.
    pub fn event(channel: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: EnvelopeKind::Event,
            name: channel.into(),
            correlation_id: None,
            payload,
            error: None,
        }
    }

    /// Build an event reporting a failure on `channel`.
    pub fn error_event(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: EnvelopeKind::Event,
            name: channel.into(),
            correlation_id: None,
            payload: Value::Null,
            error: Some(RemoteError::new(message)),
        }
    }

    /// Parse a raw structured message.
    pub fn from_raw(raw: Value) -> Result<Self, MalformedEnvelope> {
        Ok(serde_json::from_value(raw)?)
    }

    /// Convert to the raw structured form handed to the channel.
    pub fn to_raw(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Classify an envelope arriving on the UI side.
    ///
    /// Whether a `Response` matches a live call is decided later by the
    /// pending-call store.
    pub fn into_route(self) -> Route {
        match self.kind {
            EnvelopeKind::Request => Route::Unroutable(UnroutableReason::UnexpectedRequest {
                name: self.name,
            }),
            EnvelopeKind::Response => match self.correlation_id {
                Some(correlation_id) => Route::Response {
                    correlation_id,
                    outcome: settle(self.payload, self.error),
                },
                None => Route::Unroutable(UnroutableReason::MissingCorrelationId {
                    name: self.name,
                }),
            },
            EnvelopeKind::Event => {
                if let Some(correlation_id) = self.correlation_id {
                    return Route::Unroutable(UnroutableReason::CorrelatedEvent {
                        name: self.name,
                        correlation_id,
                    });
                }
                if self.name.is_empty() {
                    return Route::Unroutable(UnroutableReason::UnnamedEvent);
                }
                Route::Event {
                    channel: self.name,
                    item: settle(self.payload, self.error),
                }
            }
        }
    }
}

fn settle(payload: Value, error: Option<RemoteError>) -> Result<Value, RemoteError> {
    match error {
        Some(error) => Err(error),
        None => Ok(payload),
    }
}
