//! # Bridge Telemetry
//!
//! Observability for processes hosting a plugin bridge.
//!
//! ## Components
//!
//! - **Logging**: `tracing-subscriber` with env filter, pretty or JSON output
//! - **Metrics**: [`PrometheusRecorder`], a Prometheus-backed
//!   [`plugin_bridge::MetricsRecorder`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bridge_telemetry::{init_logging, PrometheusRecorder, TelemetryConfig};
//!
//! init_logging(&TelemetryConfig::from_env())?;
//! let recorder = Arc::new(PrometheusRecorder::new()?);
//! let bridge = PluginBridge::with_recorder(channel, BridgeConfig::from_env()?, recorder.clone())?;
//! // ...
//! println!("{}", recorder.encode()?);
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `BRIDGE_SERVICE_NAME` | `plugin-bridge` | Service name in logs |
//! | `BRIDGE_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `BRIDGE_JSON_LOGS` | `false` | JSON log lines |

mod config;
mod logging;
mod metrics;

pub use config::TelemetryConfig;
pub use logging::{build_filter, init_logging};
pub use metrics::PrometheusRecorder;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}
