//! Simulated registry service
//!
//! Plays the far side of the protocol over any [`Publisher`]: tracks providers
//! from register/pong/unregister announcements, answers list requests on the
//! requester's reply queue and can ping clients.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{Delivery, Destination, PublishError, Publisher};
use crate::domain::{CorrelationId, Message, MessageBody, ProviderRecord};

/// In-memory registry that answers the client protocol
pub struct RegistryService {
    hostname: String,
    publisher: Arc<dyn Publisher>,

    /// Known providers keyed by identity name
    providers: RwLock<BTreeMap<String, ProviderRecord>>,

    /// When set, list requests are answered with this error
    reject_with: RwLock<Option<String>>,

    /// When set, list requests are swallowed without an answer
    silent: AtomicBool,

    pongs_received: AtomicU64,
    list_requests: AtomicU64,
}

impl RegistryService {
    pub fn new(hostname: impl Into<String>, publisher: Arc<dyn Publisher>) -> Self {
        let hostname = hostname.into();
        debug!(%hostname, "RegistryService::new: called");
        Self {
            hostname,
            publisher,
            providers: RwLock::new(BTreeMap::new()),
            reject_with: RwLock::new(None),
            silent: AtomicBool::new(false),
            pongs_received: AtomicU64::new(0),
            list_requests: AtomicU64::new(0),
        }
    }

    /// Answer list requests with an error reply instead of a result
    pub fn set_rejecting(&self, message: Option<String>) {
        debug!(?message, "RegistryService::set_rejecting: called");
        *self.reject_with.write().unwrap_or_else(PoisonError::into_inner) = message;
    }

    /// Stop answering list requests (requests still get counted)
    pub fn set_silent(&self, silent: bool) {
        debug!(silent, "RegistryService::set_silent: called");
        self.silent.store(silent, Ordering::SeqCst);
    }

    /// Snapshot of known providers, ordered by name
    pub fn providers(&self) -> Vec<ProviderRecord> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn knows(&self, name: &str) -> bool {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    pub fn pongs_received(&self) -> u64 {
        self.pongs_received.load(Ordering::SeqCst)
    }

    pub fn list_requests(&self) -> u64 {
        self.list_requests.load(Ordering::SeqCst)
    }

    /// Probe all clients for liveness
    pub async fn ping(&self) -> Result<CorrelationId, PublishError> {
        let correlation_id = CorrelationId::new();
        debug!(%correlation_id, "RegistryService::ping: called");
        let message = Message::new(&self.hostname, correlation_id.clone(), MessageBody::Ping);
        self.publisher.publish(&Destination::Control, message).await?;
        Ok(correlation_id)
    }

    /// Process deliveries until the transport closes
    pub async fn run(self: Arc<Self>, mut deliveries: broadcast::Receiver<Delivery>) {
        info!(hostname = %self.hostname, "RegistryService started");
        loop {
            match deliveries.recv().await {
                Ok(delivery) => self.handle(delivery).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "RegistryService lagged, deliveries dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        info!("RegistryService stopped");
    }

    /// Handle a single delivery
    pub async fn handle(&self, delivery: Delivery) {
        let Delivery { destination, message } = delivery;
        match destination {
            Destination::Registration | Destination::Service => {}
            _ => return,
        }

        let sender = message.header.sender_host.clone();
        let correlation_id = message.header.correlation_id.clone();
        let reply_to = message.header.reply_to.clone();

        match message.payload {
            MessageBody::Register { provider } => {
                info!(%sender, identity = %provider.identity, "Provider registered");
                self.upsert(provider);
            }
            MessageBody::Pong { provider } => {
                debug!(%sender, identity = %provider.identity, "Pong received");
                self.pongs_received.fetch_add(1, Ordering::SeqCst);
                self.upsert(provider);
            }
            MessageBody::Unregister { identity } => {
                info!(%sender, %identity, "Provider unregistered");
                self.providers
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&identity.name);
            }
            MessageBody::ListRequest => {
                self.list_requests.fetch_add(1, Ordering::SeqCst);
                self.answer_list(correlation_id, reply_to).await;
            }
            other => {
                debug!(message_type = %other.message_type(), "RegistryService ignoring message");
            }
        }
    }

    fn upsert(&self, provider: ProviderRecord) {
        self.providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(provider.identity.name.clone(), provider);
    }

    async fn answer_list(&self, correlation_id: CorrelationId, reply_to: Option<String>) {
        if self.silent.load(Ordering::SeqCst) {
            debug!(%correlation_id, "RegistryService silent, not answering list request");
            return;
        }
        let Some(reply_to) = reply_to else {
            warn!(%correlation_id, "List request without reply-to, dropping");
            return;
        };

        let reject_with = self.reject_with.read().unwrap_or_else(PoisonError::into_inner).clone();
        let payload = match reject_with {
            Some(message) => MessageBody::Error { message },
            None => MessageBody::ListResult {
                providers: self.providers(),
            },
        };

        let reply = Message::new(&self.hostname, correlation_id.clone(), payload);
        if let Err(e) = self.publisher.publish(&Destination::Reply(reply_to), reply).await {
            warn!(%correlation_id, error = %e, "RegistryService failed to answer list request");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Capability, MessageType, ProviderIdentity};
    use crate::transport::mock::MockPublisher;

    fn record(name: &str) -> ProviderRecord {
        ProviderRecord::new(ProviderIdentity::new(name), vec![Capability::new("inventory")])
    }

    fn delivery(destination: Destination, payload: MessageBody) -> Delivery {
        Delivery {
            destination,
            message: Message::new("client-host", CorrelationId::from("c-1"), payload).with_reply_to("client.reply"),
        }
    }

    #[tokio::test]
    async fn test_tracks_register_pong_unregister() {
        let publisher = Arc::new(MockPublisher::new());
        let service = RegistryService::new("registry", publisher.clone());

        service
            .handle(delivery(Destination::Registration, MessageBody::Register { provider: record("a") }))
            .await;
        service
            .handle(delivery(Destination::Registration, MessageBody::Pong { provider: record("b") }))
            .await;
        assert!(service.knows("a"));
        assert!(service.knows("b"));
        assert_eq!(service.pongs_received(), 1);

        service
            .handle(delivery(
                Destination::Registration,
                MessageBody::Unregister {
                    identity: ProviderIdentity::new("a"),
                },
            ))
            .await;
        assert!(!service.knows("a"));
        assert_eq!(service.providers().len(), 1);
    }

    #[tokio::test]
    async fn test_answers_list_on_reply_queue() {
        let publisher = Arc::new(MockPublisher::new());
        let service = RegistryService::new("registry", publisher.clone());
        service
            .handle(delivery(Destination::Registration, MessageBody::Register { provider: record("a") }))
            .await;

        service.handle(delivery(Destination::Service, MessageBody::ListRequest)).await;

        let (destination, reply) = publisher.last().unwrap();
        assert_eq!(destination, Destination::Reply("client.reply".to_string()));
        assert_eq!(reply.correlation_id().as_str(), "c-1");
        match reply.payload {
            MessageBody::ListResult { providers } => assert_eq!(providers.len(), 1),
            other => panic!("Wrong payload: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rejecting_and_silent_modes() {
        let publisher = Arc::new(MockPublisher::new());
        let service = RegistryService::new("registry", publisher.clone());

        service.set_rejecting(Some("registry offline".to_string()));
        service.handle(delivery(Destination::Service, MessageBody::ListRequest)).await;
        assert_eq!(publisher.count_of(MessageType::Error), 1);

        service.set_rejecting(None);
        service.set_silent(true);
        service.handle(delivery(Destination::Service, MessageBody::ListRequest)).await;
        assert_eq!(publisher.count(), 1);
        assert_eq!(service.list_requests(), 2);
    }

    #[tokio::test]
    async fn test_ignores_messages_for_other_destinations() {
        let publisher = Arc::new(MockPublisher::new());
        let service = RegistryService::new("registry", publisher.clone());

        service
            .handle(delivery(Destination::Control, MessageBody::Register { provider: record("a") }))
            .await;
        assert!(!service.knows("a"));
    }

    #[tokio::test]
    async fn test_ping_goes_to_control() {
        let publisher = Arc::new(MockPublisher::new());
        let service = RegistryService::new("registry", publisher.clone());

        let id = service.ping().await.unwrap();
        let (destination, message) = publisher.last().unwrap();
        assert_eq!(destination, Destination::Control);
        assert_eq!(message.message_type(), MessageType::Ping);
        assert_eq!(message.correlation_id(), &id);
    }
}
