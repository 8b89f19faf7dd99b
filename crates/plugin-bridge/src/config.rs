//! Bridge configuration with validation.

use crate::correlation::CorrelationScheme;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default name of the handshake notification sent once the UI is ready.
pub const DEFAULT_READY_NOTIFICATION: &str = "notifyReady";

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("ready notification name cannot be empty")]
    EmptyReadyNotification,

    #[error("call timeout cannot be 0")]
    ZeroTimeout,

    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Per-bridge settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// How correlation IDs are minted
    pub correlation_scheme: CorrelationScheme,
    /// Deadline applied to every `call` that does not pass its own.
    /// `None` waits for the response indefinitely.
    pub call_timeout_ms: Option<u64>,
    /// Name of the fire-and-forget handshake request
    pub ready_notification: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            correlation_scheme: CorrelationScheme::Monotonic,
            call_timeout_ms: None,
            ready_notification: DEFAULT_READY_NOTIFICATION.to_string(),
        }
    }
}

impl BridgeConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ready_notification.trim().is_empty() {
            return Err(ConfigError::EmptyReadyNotification);
        }
        if self.call_timeout_ms == Some(0) {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    /// Default call deadline, if any.
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }

    /// Create configuration from environment variables.
    ///
    /// - `BRIDGE_CORRELATION_SCHEME`: `monotonic` (default) or `random`
    /// - `BRIDGE_CALL_TIMEOUT_MS`: default call deadline (unset = none)
    /// - `BRIDGE_READY_NOTIFICATION`: handshake name (default: notifyReady)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(value) = env::var("BRIDGE_CORRELATION_SCHEME") {
            config.correlation_scheme =
                CorrelationScheme::parse(&value).ok_or(ConfigError::InvalidEnv {
                    var: "BRIDGE_CORRELATION_SCHEME",
                    value,
                })?;
        }

        if let Ok(value) = env::var("BRIDGE_CALL_TIMEOUT_MS") {
            let ms = value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnv {
                var: "BRIDGE_CALL_TIMEOUT_MS",
                value: value.clone(),
            })?;
            config.call_timeout_ms = Some(ms);
        }

        if let Ok(value) = env::var("BRIDGE_READY_NOTIFICATION") {
            config.ready_notification = value;
        }

        config.validate()?;
        Ok(config)
    }
}
