//! In-process loopback transport
//!
//! Every published message is broadcast to all subscribers. Clients pick out
//! the deliveries addressed to them with [`LoopbackTransport::inbound_for`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use super::{Destination, PublishError, Publisher};
use crate::domain::Message;

/// Default broadcast capacity (deliveries)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Inbound buffer for a single client
const INBOUND_BUFFER: usize = 256;

/// A message together with where it was published
#[derive(Debug, Clone)]
pub struct Delivery {
    pub destination: Destination,
    pub message: Message,
}

/// Broadcast-backed publisher with failure injection
pub struct LoopbackTransport {
    tx: broadcast::Sender<Delivery>,
    failing: AtomicBool,
    published: AtomicU64,
}

impl LoopbackTransport {
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "LoopbackTransport::new: called");
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            failing: AtomicBool::new(false),
            published: AtomicU64::new(0),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Receive every delivery published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<Delivery> {
        debug!("LoopbackTransport::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Make subsequent publishes fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        debug!(failing, "LoopbackTransport::set_failing: called");
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of messages accepted so far
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::SeqCst)
    }

    /// Forward deliveries for one client into a channel
    ///
    /// Passes through messages sent to `Reply(reply_to)` and to `Control`.
    /// The forwarder stops when the transport or the receiver goes away.
    /// Must be called inside a Tokio runtime.
    pub fn inbound_for(&self, reply_to: &str) -> mpsc::Receiver<Message> {
        debug!(%reply_to, "LoopbackTransport::inbound_for: called");
        let (tx, rx) = mpsc::channel(INBOUND_BUFFER);
        let mut deliveries = self.tx.subscribe();
        let reply_to = reply_to.to_string();

        tokio::spawn(async move {
            loop {
                let delivery = match deliveries.recv().await {
                    Ok(delivery) => delivery,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(%reply_to, skipped, "Inbound forwarder lagged, deliveries dropped");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                let addressed = match &delivery.destination {
                    Destination::Reply(name) => *name == reply_to,
                    Destination::Control => true,
                    _ => false,
                };
                if !addressed {
                    continue;
                }

                if tx.send(delivery.message).await.is_err() {
                    debug!(%reply_to, "Inbound receiver dropped, stopping forwarder");
                    break;
                }
            }
        });

        rx
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[async_trait]
impl Publisher for LoopbackTransport {
    async fn publish(&self, destination: &Destination, message: Message) -> Result<(), PublishError> {
        debug!(
            %destination,
            message_type = %message.message_type(),
            correlation_id = %message.correlation_id(),
            "LoopbackTransport::publish: called"
        );
        if self.failing.load(Ordering::SeqCst) {
            return Err(PublishError::Rejected("loopback transport is failing".to_string()));
        }

        self.published.fetch_add(1, Ordering::SeqCst);
        // No subscribers is fine: publishing is fire-and-forget
        let _ = self.tx.send(Delivery {
            destination: destination.clone(),
            message,
        });
        Ok(())
    }
}
