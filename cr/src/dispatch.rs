//! Inbound message dispatch
//!
//! The transport delivers every inbound message here. Handlers are looked up
//! by [`MessageType`] in a table built once at startup; types with no handler
//! are logged and dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::domain::{Message, MessageType};

/// Receiver side of an inbound message type
///
/// Handlers absorb their own failures; nothing propagates back into the
/// delivery path.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Message);
}

/// Routes inbound messages to handlers by type
#[derive(Default)]
pub struct Dispatcher {
    routes: HashMap<MessageType, Arc<dyn MessageHandler>>,
    dispatched: AtomicU64,
    unrouted: AtomicU64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for a message type, replacing any previous one
    pub fn route(mut self, message_type: MessageType, handler: Arc<dyn MessageHandler>) -> Self {
        debug!(%message_type, "Dispatcher::route: called");
        self.routes.insert(message_type, handler);
        self
    }

    pub fn handles(&self, message_type: MessageType) -> bool {
        self.routes.contains_key(&message_type)
    }

    /// Deliver one message to its handler
    ///
    /// Returns false if no handler is registered for the message type.
    pub async fn dispatch(&self, message: Message) -> bool {
        let message_type = message.message_type();
        debug!(
            %message_type,
            correlation_id = %message.correlation_id(),
            sender_host = %message.header.sender_host,
            "Dispatcher::dispatch: called"
        );

        let Some(handler) = self.routes.get(&message_type) else {
            self.unrouted.fetch_add(1, Ordering::Relaxed);
            debug!(%message_type, "Dispatcher::dispatch: no handler, dropping");
            return false;
        };

        self.dispatched.fetch_add(1, Ordering::Relaxed);
        handler.handle(message).await;
        true
    }

    /// Dispatch messages from a channel until it closes
    pub async fn run(&self, mut inbound: mpsc::Receiver<Message>) {
        info!(routes = self.routes.len(), "Dispatcher started");
        while let Some(message) = inbound.recv().await {
            self.dispatch(message).await;
        }
        info!("Dispatcher stopped: inbound channel closed");
    }

    pub fn dispatched_count(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn unrouted_count(&self) -> u64 {
        self.unrouted.load(Ordering::Relaxed)
    }
}
