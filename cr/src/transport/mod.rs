//! Transport boundary
//!
//! The core only needs a way to publish a message to a destination. Inbound
//! delivery is the transport's job: it hands received messages to the
//! [`Dispatcher`](crate::dispatch::Dispatcher).
//!
//! - [`Publisher`] - the outbound capability consumed by the core
//! - [`LoopbackTransport`] - in-process broadcast transport for tests and the demo
//! - [`RegistryService`] - simulated far side that tracks providers and answers lists

mod loopback;
mod service;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Message;

pub use loopback::{Delivery, LoopbackTransport};
pub use service::RegistryService;

/// Logical destination of a published message
///
/// Mapping these onto exchanges, queues or topics is up to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Destination {
    /// Provider announcements to the registry (register, unregister, pong)
    Registration,

    /// Requests to the registry service (list)
    Service,

    /// Registry liveness checks fanned out to every client (ping)
    Control,

    /// A specific client's reply queue
    Reply(String),
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Destination::Registration => write!(f, "registration"),
            Destination::Service => write!(f, "service"),
            Destination::Control => write!(f, "control"),
            Destination::Reply(name) => write!(f, "reply:{}", name),
        }
    }
}

/// Errors a transport can report for an outbound send
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Transport rejected the message: {0}")]
    Rejected(String),
}

/// Outbound half of the transport
///
/// Fire-and-forget: `Ok` means the transport accepted the message, not that
/// anyone received it.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, destination: &Destination, message: Message) -> Result<(), PublishError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Mutex, PoisonError};
    use std::time::Duration;

    use crate::domain::MessageType;

    /// Publisher that records every message it is asked to send
    #[derive(Default)]
    pub struct MockPublisher {
        sent: Mutex<Vec<(Destination, Message)>>,
        failing: AtomicBool,
        delay: Mutex<Option<Duration>>,
    }

    impl MockPublisher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing() -> Self {
            let publisher = Self::default();
            publisher.set_failing(true);
            publisher
        }

        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        /// Make every publish take this long before completing
        pub fn set_delay(&self, delay: Duration) {
            *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = Some(delay);
        }

        pub fn sent(&self) -> Vec<(Destination, Message)> {
            self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }

        pub fn count(&self) -> usize {
            self.sent.lock().unwrap_or_else(PoisonError::into_inner).len()
        }

        pub fn count_of(&self, message_type: MessageType) -> usize {
            self.sent()
                .iter()
                .filter(|(_, m)| m.message_type() == message_type)
                .count()
        }

        pub fn last(&self) -> Option<(Destination, Message)> {
            self.sent.lock().unwrap_or_else(PoisonError::into_inner).last().cloned()
        }
    }

    #[async_trait]
    impl Publisher for MockPublisher {
        async fn publish(&self, destination: &Destination, message: Message) -> Result<(), PublishError> {
            let delay = *self.delay.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(PublishError::Rejected("mock failure".to_string()));
            }
            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((destination.clone(), message));
            Ok(())
        }
    }
}
