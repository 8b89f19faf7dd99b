//! Pending call store.
//!
//! Maps correlation IDs to callers awaiting a response.
//!
//! Flow:
//! 1. The call client mints a `CorrelationId`
//! 2. It calls `register()` to get a oneshot receiver
//! 3. It sends the `Request` envelope
//! 4. The dispatcher receives the `Response` and calls `complete()`
//! 5. The caller's future resolves from the receiver
//!
//! An entry leaves the store exactly once: on `complete()`, `cancel()` or
//! `reject_all()`. A later response for the same id finds nothing.
//!
//! `reject_all()` also closes the store. The flag is read under the same shard
//! lock `reject_all()` takes, so a registration either lands before teardown
//! and gets rejected with it, or is refused.

use crate::correlation::CorrelationId;
use crate::envelope::RemoteError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// What a pending call settles with.
pub type CallOutcome = Result<Value, RemoteError>;

/// Why a call could not be registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
    #[error("correlation id {0} is already pending")]
    Duplicate(CorrelationId),

    #[error("pending call store is closed")]
    Closed,
}

/// A call waiting for its response
struct PendingCall {
    sender: oneshot::Sender<CallOutcome>,
    created_at: Instant,
    method: String,
}

/// Counters for the pending store
#[derive(Debug, Default)]
pub struct PendingStats {
    pub total_registered: AtomicU64,
    pub total_completed: AtomicU64,
    /// Removed without a response (timeout, dropped caller, teardown)
    pub total_cancelled: AtomicU64,
    /// Completions that found no entry
    pub total_unmatched: AtomicU64,
}

/// Successful completion of a pending call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub method: String,
    pub latency: Duration,
}

/// Correlation table owned by one bridge instance.
#[derive(Default)]
pub struct PendingCallStore {
    pending: DashMap<CorrelationId, PendingCall>,
    stats: PendingStats,
    closed: AtomicBool,
}

impl PendingCallStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call and get the receiver its response will arrive on.
    pub fn register(
        &self,
        correlation_id: CorrelationId,
        method: &str,
    ) -> Result<oneshot::Receiver<CallOutcome>, RegisterError> {
        match self.pending.entry(correlation_id) {
            Entry::Occupied(entry) => {
                warn!(
                    correlation_id = %entry.key(),
                    method = method,
                    "Refusing duplicate correlation id"
                );
                Err(RegisterError::Duplicate(entry.key().clone()))
            }
            Entry::Vacant(entry) => {
                // Checked while the shard is locked.
                if self.closed.load(Ordering::SeqCst) {
                    debug!(correlation_id = %entry.key(), method = method, "Refusing call, store closed");
                    return Err(RegisterError::Closed);
                }
                let (tx, rx) = oneshot::channel();
                debug!(correlation_id = %entry.key(), method = method, "Registered pending call");
                entry.insert(PendingCall {
                    sender: tx,
                    created_at: Instant::now(),
                    method: method.to_string(),
                });
                self.stats.total_registered.fetch_add(1, Ordering::Relaxed);
                Ok(rx)
            }
        }
    }

    /// Settle a pending call.
    ///
    /// Returns `None` when no live caller was waiting for this id.
    pub fn complete(&self, correlation_id: &CorrelationId, outcome: CallOutcome) -> Option<Completion> {
        let Some((_, call)) = self.pending.remove(correlation_id) else {
            self.stats.total_unmatched.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        let latency = call.created_at.elapsed();
        if call.sender.send(outcome).is_err() {
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
            debug!(
                correlation_id = %correlation_id,
                method = %call.method,
                "Pending call receiver dropped"
            );
            return None;
        }

        self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
        debug!(
            correlation_id = %correlation_id,
            method = %call.method,
            latency_us = latency.as_micros() as u64,
            "Completed pending call"
        );
        Some(Completion {
            method: call.method,
            latency,
        })
    }

    /// Drop a pending call without answering it.
    pub fn cancel(&self, correlation_id: &CorrelationId) -> bool {
        if self.pending.remove(correlation_id).is_some() {
            self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Close the store and drop every pending call. Waiting callers observe a
    /// closed channel; later registrations are refused.
    pub fn reject_all(&self) -> usize {
        self.closed.store(true, Ordering::SeqCst);
        let mut rejected = 0;
        self.pending.retain(|id, call| {
            debug!(correlation_id = %id, method = %call.method, "Rejecting pending call on teardown");
            rejected += 1;
            false
        });
        self.stats
            .total_cancelled
            .fetch_add(rejected as u64, Ordering::Relaxed);
        rejected
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, correlation_id: &CorrelationId) -> bool {
        self.pending.contains_key(correlation_id)
    }

    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }
}

/// Cancels its correlation id when dropped.
///
/// Held by an in-flight call so an abandoned future leaves no entry behind.
/// Cancelling an already settled id is a no-op.
pub(crate) struct PendingGuard<'a> {
    store: &'a PendingCallStore,
    correlation_id: CorrelationId,
}

impl<'a> PendingGuard<'a> {
    pub(crate) fn new(store: &'a PendingCallStore, correlation_id: CorrelationId) -> Self {
        Self {
            store,
            correlation_id,
        }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.store.cancel(&self.correlation_id) {
            debug!(correlation_id = %self.correlation_id, "Reclaimed abandoned pending call");
        }
    }
}
