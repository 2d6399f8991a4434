//! Correlation registry: correlation id -> in-flight call

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use crate::domain::{CorrelationId, Message};
use crate::error::RegistryError;

/// Roughly 30 years; stands in for "never" when a timeout overflows `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `start + timeout`, saturating to a far-future instant instead of panicking
pub(crate) fn deadline_after(start: Instant, timeout: Duration) -> Instant {
    start
        .checked_add(timeout)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

/// Lifecycle of a single correlated call
///
/// `Created -> Pending -> {Resolved | TimedOut | PublishFailed | ShutdownRejected}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Created,
    Pending,
    Resolved,
    TimedOut,
    PublishFailed,
    ShutdownRejected,
}

impl CallState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CallState::Created | CallState::Pending)
    }
}

/// An in-flight request awaiting its reply
pub struct PendingCall {
    correlation_id: CorrelationId,
    reply_tx: oneshot::Sender<Message>,
    deadline: Instant,
    created_at: Instant,
}

impl PendingCall {
    /// Timeouts too large to represent as an instant wait until the far future
    pub fn new(correlation_id: CorrelationId, reply_tx: oneshot::Sender<Message>, timeout: Duration) -> Self {
        let created_at = Instant::now();
        Self {
            correlation_id,
            reply_tx,
            deadline: deadline_after(created_at, timeout),
            created_at,
        }
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    /// Hand the reply to the waiting caller
    ///
    /// Gives the message back if the caller is no longer listening.
    pub fn deliver(self, message: Message) -> Result<(), Message> {
        self.reply_tx.send(message)
    }
}

impl std::fmt::Debug for PendingCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCall")
            .field("correlation_id", &self.correlation_id)
            .field("deadline", &self.deadline)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Concurrent map of in-flight calls
///
/// Every operation takes the lock only for the map access itself, so callers
/// never hold it while waiting.
#[derive(Debug, Default)]
pub struct CorrelationRegistry {
    calls: Mutex<HashMap<CorrelationId, PendingCall>>,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call; an id can only be live once
    pub fn insert(&self, call: PendingCall) -> Result<(), RegistryError> {
        debug!(correlation_id = %call.correlation_id, "CorrelationRegistry::insert: called");
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        if calls.contains_key(&call.correlation_id) {
            return Err(RegistryError::InvalidState(format!(
                "correlation id {} is already pending",
                call.correlation_id
            )));
        }
        calls.insert(call.correlation_id.clone(), call);
        Ok(())
    }

    /// Atomically take a call out of the registry
    ///
    /// At most one caller ever gets `Some` for a given id.
    pub fn remove(&self, correlation_id: &CorrelationId) -> Option<PendingCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(correlation_id)
    }

    pub fn contains(&self, correlation_id: &CorrelationId) -> bool {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(correlation_id)
    }

    pub fn len(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids whose deadline has passed but which are still registered
    pub fn expired(&self, now: Instant) -> Vec<CorrelationId> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|c| c.is_expired(now))
            .map(|c| c.correlation_id.clone())
            .collect()
    }
}
