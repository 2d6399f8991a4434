//! CallbackManager - turns publish + inbound reply into one awaitable call

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::metrics::{CallbackMetrics, Counters};
use super::registry::{CallState, CorrelationRegistry, PendingCall, deadline_after};
use crate::dispatch::MessageHandler;
use crate::domain::{CorrelationId, Message, MessageBody};
use crate::error::RegistryError;
use crate::transport::{Destination, Publisher};

/// How often `drain` re-checks for outstanding calls
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// What happened to an inbound reply handed to [`CallbackManager::resolve`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The waiting caller received the reply
    Delivered,

    /// No pending call for this id (late, duplicate or foreign); dropped
    UnknownCorrelation,

    /// The call was claimed but its caller stopped listening; dropped
    CallerGone,
}

/// Removes the call from the registry on every exit path of a request,
/// including the caller dropping the request future.
struct PendingGuard<'a> {
    registry: &'a CorrelationRegistry,
    correlation_id: CorrelationId,
}

impl PendingGuard<'_> {
    /// Claim the call for the caller side
    fn take(&self) -> Option<PendingCall> {
        self.registry.remove(&self.correlation_id)
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.registry.remove(&self.correlation_id).is_some() {
            debug!(correlation_id = %self.correlation_id, "Pending call abandoned, purged");
        }
    }
}

/// Bridges an asynchronous transport into timeout-bounded calls
pub struct CallbackManager {
    publisher: Arc<dyn Publisher>,
    registry: CorrelationRegistry,
    hostname: String,
    reply_to: String,
    shut_down: AtomicBool,
    counters: Counters,
}

impl CallbackManager {
    /// Create a manager publishing as `hostname` and receiving replies on `reply_to`
    pub fn new(publisher: Arc<dyn Publisher>, hostname: impl Into<String>, reply_to: impl Into<String>) -> Self {
        let hostname = hostname.into();
        let reply_to = reply_to.into();
        debug!(%hostname, %reply_to, "CallbackManager::new: called");
        Self {
            publisher,
            registry: CorrelationRegistry::new(),
            hostname,
            reply_to,
            shut_down: AtomicBool::new(false),
            counters: Counters::default(),
        }
    }

    /// The reply destination stamped on outgoing requests
    pub fn reply_to(&self) -> &str {
        &self.reply_to
    }

    /// Publish a request and wait for its correlated reply
    ///
    /// Returns the reply message, or one of: `ShutdownRejected` (nothing was
    /// registered), `PublishFailure` (no wait happened), `Timeout`, or
    /// `Application` when the reply is an error payload. The pending call is
    /// gone from the registry whenever this returns.
    pub async fn submit_request(
        &self,
        destination: Destination,
        payload: MessageBody,
        timeout: Duration,
    ) -> Result<Message, RegistryError> {
        debug!(%destination, message_type = %payload.message_type(), ?timeout, "CallbackManager::submit_request: called");
        if self.is_shut_down() {
            self.counters.record(CallState::ShutdownRejected);
            error!("The client is shutting down, requests are not being accepted");
            return Err(RegistryError::ShutdownRejected);
        }

        let correlation_id = CorrelationId::new();
        let (reply_tx, mut reply_rx) = oneshot::channel();
        let call = PendingCall::new(correlation_id.clone(), reply_tx, timeout);
        let deadline = call.deadline();
        self.counters.record(CallState::Created);

        self.registry.insert(call)?;
        let guard = PendingGuard {
            registry: &self.registry,
            correlation_id: correlation_id.clone(),
        };

        let message = Message::new(&self.hostname, correlation_id.clone(), payload).with_reply_to(&self.reply_to);
        if let Err(e) = self.publisher.publish(&destination, message).await {
            drop(guard);
            self.counters.record(CallState::PublishFailed);
            error!(%correlation_id, error = %e, "Could not publish the message");
            return Err(e.into());
        }
        debug!(%correlation_id, state = ?CallState::Pending, "CallbackManager::submit_request: waiting for reply");

        let reply = match tokio::time::timeout_at(deadline, &mut reply_rx).await {
            Ok(Ok(reply)) => Some(reply),
            Ok(Err(_)) => None,
            Err(_) => {
                if guard.take().is_some() {
                    None
                } else {
                    // A resolver claimed the call first; its reply is already on the way
                    debug!(%correlation_id, "CallbackManager::submit_request: resolve won the race with timeout");
                    reply_rx.await.ok()
                }
            }
        };
        drop(guard);

        let Some(reply) = reply else {
            self.counters.record(CallState::TimedOut);
            error!(%correlation_id, timeout_ms = timeout.as_millis() as u64, "The service request has timed out");
            return Err(RegistryError::Timeout {
                correlation_id,
                after: timeout,
            });
        };

        self.counters.record(CallState::Resolved);
        if let MessageBody::Error { message } = &reply.payload {
            debug!(%correlation_id, %message, "CallbackManager::submit_request: error reply");
            return Err(RegistryError::Application {
                message: message.clone(),
            });
        }
        Ok(reply)
    }

    /// Hand an inbound reply to its waiting caller
    ///
    /// Never fails: unknown ids and vanished callers are logged and dropped.
    pub fn resolve(&self, correlation_id: &CorrelationId, message: Message) -> Resolution {
        debug!(%correlation_id, message_type = %message.message_type(), "CallbackManager::resolve: called");
        let Some(call) = self.registry.remove(correlation_id) else {
            self.counters.unknown_correlation();
            warn!(error = %RegistryError::UnknownCorrelation(correlation_id.clone()), "Dropping reply");
            return Resolution::UnknownCorrelation;
        };

        let age = call.age();
        match call.deliver(message) {
            Ok(()) => {
                debug!(%correlation_id, elapsed_ms = age.as_millis() as u64, "CallbackManager::resolve: delivered");
                Resolution::Delivered
            }
            Err(_) => {
                self.counters.caller_gone();
                error!(%correlation_id, "Unexpected error on callback: caller is no longer waiting");
                Resolution::CallerGone
            }
        }
    }

    /// Stop accepting new requests; in-flight calls keep running
    pub fn mark_shut_down(&self) {
        debug!("CallbackManager::mark_shut_down: called");
        self.shut_down.store(true, Ordering::SeqCst);
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Wait up to `grace` for in-flight calls to finish
    ///
    /// Returns true if nothing is pending anymore.
    pub async fn drain(&self, grace: Duration) -> bool {
        debug!(?grace, "CallbackManager::drain: called");
        if self.registry.is_empty() {
            return true;
        }

        info!(pending = self.registry.len(), "Waiting for pending requests to complete");
        let deadline = deadline_after(Instant::now(), grace);
        while !self.registry.is_empty() && Instant::now() < deadline {
            tokio::time::sleep(DRAIN_POLL_INTERVAL.min(grace)).await;
        }

        let remaining = self.registry.len();
        if remaining > 0 {
            let overdue = self.registry.expired(Instant::now()).len();
            warn!(remaining, overdue, "Drain grace period elapsed with requests still pending");
            return false;
        }
        true
    }

    pub fn pending_count(&self) -> usize {
        self.registry.len()
    }

    pub fn is_pending(&self, correlation_id: &CorrelationId) -> bool {
        self.registry.contains(correlation_id)
    }

    pub fn metrics(&self) -> CallbackMetrics {
        self.counters.snapshot(self.registry.len())
    }
}

#[async_trait]
impl MessageHandler for CallbackManager {
    async fn handle(&self, message: Message) {
        let correlation_id = message.correlation_id().clone();
        self.resolve(&correlation_id, message);
    }
}
