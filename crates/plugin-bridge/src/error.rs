//! Error types for the bridge

use crate::config::ConfigError;
use crate::correlation::CorrelationId;
use crate::envelope::RemoteError;
use crate::transport::TransportError;
use std::time::Duration;
use thiserror::Error;

/// Why an await-result call did not resolve with a payload.
#[derive(Debug, Error)]
pub enum CallError {
    /// The request never left this side.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The sandbox answered with an error.
    #[error("{0}")]
    Remote(RemoteError),

    #[error("call {name} timed out after {}ms", .after.as_millis())]
    Timeout { name: String, after: Duration },

    /// The bridge was torn down before a response arrived.
    #[error("bridge closed before call {name} settled")]
    Closed { name: String },

    #[error("correlation id {0} is already pending")]
    DuplicateCorrelationId(CorrelationId),

    #[error("failed to decode result of {name}: {source}")]
    Decode {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CallError {
    /// The sandbox-reported error, if this is an application-level failure.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Remote(e) => Some(e),
            _ => None,
        }
    }
}

/// Errors constructing a bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("transport setup failed: {0}")]
    Transport(#[from] TransportError),
}
