//! Ping/pong liveness responder

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::dispatch::MessageHandler;
use crate::domain::{Message, MessageBody, ProviderRecord, ProviderSlot};
use crate::transport::{Destination, Publisher};

/// Answers registry pings with the current provider record
pub struct PingResponder {
    publisher: Arc<dyn Publisher>,
    hostname: String,
    provider: ProviderSlot,
    pongs_sent: AtomicU64,
}

impl PingResponder {
    pub fn new(publisher: Arc<dyn Publisher>, hostname: impl Into<String>) -> Self {
        Self::with_slot(publisher, hostname, ProviderSlot::new())
    }

    /// Create a responder reading the record from a shared slot
    pub fn with_slot(publisher: Arc<dyn Publisher>, hostname: impl Into<String>, provider: ProviderSlot) -> Self {
        let hostname = hostname.into();
        debug!(%hostname, "PingResponder::with_slot: called");
        Self {
            publisher,
            hostname,
            provider,
            pongs_sent: AtomicU64::new(0),
        }
    }

    pub fn set_provider(&self, record: Arc<ProviderRecord>) {
        debug!(identity = %record.identity, "PingResponder::set_provider: called");
        self.provider.set(record);
    }

    pub fn clear_provider(&self) {
        debug!("PingResponder::clear_provider: called");
        self.provider.clear();
    }

    pub fn provider(&self) -> Option<Arc<ProviderRecord>> {
        self.provider.get()
    }

    /// Answer a ping with a pong carrying the current record
    ///
    /// The pong reuses the ping's correlation id. Returns whether a pong was
    /// sent; a missing record or a failed publish is logged, never returned.
    pub async fn handle_ping(&self, ping: &Message) -> bool {
        let correlation_id = ping.correlation_id().clone();
        debug!(%correlation_id, sender_host = %ping.header.sender_host, "PingResponder::handle_ping: called");

        let Some(provider) = self.provider.get() else {
            warn!(%correlation_id, "No capability provider is registered, not answering ping");
            return false;
        };

        let pong = Message::new(
            &self.hostname,
            correlation_id.clone(),
            MessageBody::Pong {
                provider: provider.as_ref().clone(),
            },
        );
        match self.publisher.publish(&Destination::Registration, pong).await {
            Ok(()) => {
                self.pongs_sent.fetch_add(1, Ordering::Relaxed);
                debug!(%correlation_id, identity = %provider.identity, "Pong published");
                true
            }
            Err(e) => {
                error!(%correlation_id, error = %e, "Error publishing pong");
                false
            }
        }
    }

    pub fn pongs_sent(&self) -> u64 {
        self.pongs_sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MessageHandler for PingResponder {
    async fn handle(&self, message: Message) {
        self.handle_ping(&message).await;
    }
}
