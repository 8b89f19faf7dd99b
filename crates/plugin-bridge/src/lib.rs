//! # Plugin Bridge - Message Bridge Between a Plugin UI and Its Sandbox
//!
//! The UI and the sandbox share exactly one raw, bidirectional message
//! channel. This crate layers three interaction patterns on top of it:
//!
//! - **Await-result calls**: request out, exactly one correlated response back.
//! - **Notifications**: request out, nothing tracked.
//! - **Event channels**: named push streams with many listeners.
//!
//! ## Message Flow
//!
//! ```text
//! ┌──────────────┐   Request (c1)    ┌──────────────┐
//! │   UI side    │ ────────────────▶ │   Sandbox    │
//! │ PluginBridge │                   │              │
//! │              │ ◀──────────────── │              │
//! └──────────────┘  Response (c1)    └──────────────┘
//!        │              Event
//!        ▼
//!  ┌────────────┐   Response ─▶ PendingCallStore
//!  │ Dispatcher │   Event    ─▶ SubscriptionRegistry
//!  └────────────┘   other    ─▶ dropped (logged)
//! ```
//!
//! ## Guarantees
//!
//! - A call settles at most once. Late and duplicate responses are dropped.
//! - Event listeners see events in arrival order. A failing listener does not
//!   affect its siblings.
//! - All state is owned by one [`PluginBridge`] instance.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod bridge;
pub mod client;
pub mod config;
pub mod correlation;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod metrics;
pub mod pending;
pub mod sandbox;
pub mod subscription;
pub mod transport;

// Re-export main types
pub use bridge::{PluginBridge, ShutdownReport};
pub use client::CallClient;
pub use config::{BridgeConfig, ConfigError, DEFAULT_READY_NOTIFICATION};
pub use correlation::{CorrelationId, CorrelationIdGen, CorrelationScheme};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use envelope::{Envelope, EnvelopeKind, EventResult, RemoteError, Route, UnroutableReason};
pub use error::{BridgeError, CallError};
pub use metrics::{BridgeMetrics, MetricsRecorder, MetricsSnapshot, NoOpMetrics};
pub use pending::{PendingCallStore, PendingStats, RegisterError};
pub use sandbox::{IncomingRequest, SandboxEndpoint};
pub use subscription::{EventStream, ListenerId, Subscription, SubscriptionRegistry};
pub use transport::{memory_pair, ChannelTransport, MemoryChannel, MemoryPort, RawChannel, TransportError};
