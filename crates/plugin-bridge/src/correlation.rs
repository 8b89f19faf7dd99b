//! Correlation IDs pairing one request with its one response.
//!
//! IDs are opaque strings on the wire. Each bridge instance owns its own
//! generator, so two bridges never share a counter.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Correlation ID carried by `Request` and `Response` envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Wrap an existing token (e.g. one echoed back by the sandbox).
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Borrow the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

impl From<String> for CorrelationId {
    fn from(token: String) -> Self {
        Self(token)
    }
}

/// How a bridge mints correlation IDs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationScheme {
    /// `c1`, `c2`, ... from a per-bridge counter. Easy to follow in logs.
    #[default]
    Monotonic,
    /// UUID v7 tokens (time-ordered, random tail).
    Random,
}

impl CorrelationScheme {
    /// Parse a scheme name as used in configuration.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "monotonic" | "counter" => Some(Self::Monotonic),
            "random" | "uuid" => Some(Self::Random),
            _ => None,
        }
    }
}

/// Generator for session-unique correlation IDs.
#[derive(Debug)]
pub struct CorrelationIdGen {
    scheme: CorrelationScheme,
    counter: AtomicU64,
}

impl CorrelationIdGen {
    /// Create a generator for the given scheme. Counters start at 1.
    pub fn new(scheme: CorrelationScheme) -> Self {
        Self {
            scheme,
            counter: AtomicU64::new(0),
        }
    }

    /// Mint the next ID.
    pub fn next_id(&self) -> CorrelationId {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        match self.scheme {
            CorrelationScheme::Monotonic => CorrelationId(format!("c{seq}")),
            CorrelationScheme::Random => CorrelationId(Uuid::now_v7().to_string()),
        }
    }

    /// Number of IDs minted so far.
    pub fn issued(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }

    /// The scheme in use.
    pub fn scheme(&self) -> CorrelationScheme {
        self.scheme
    }
}

impl Default for CorrelationIdGen {
    fn default() -> Self {
        Self::new(CorrelationScheme::default())
    }
}
