//! RegistryClient - one handle over callbacks, registration and inbound dispatch

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::callback::{CallbackManager, CallbackMetrics};
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::domain::{Capability, CorrelationId, Message, MessageBody, MessageType, ProviderIdentity, ProviderRecord};
use crate::error::RegistryError;
use crate::registration::RegistrationManager;
use crate::transport::{Destination, Publisher};

/// Answer to a provider listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListProvidersResponse {
    /// Correlation id the request went out with
    pub request_id: CorrelationId,
    pub providers: Vec<ProviderRecord>,
}

/// Client side of the capability registry protocol
pub struct RegistryClient {
    callbacks: Arc<CallbackManager>,
    registration: RegistrationManager,
    dispatcher: Arc<Dispatcher>,
    request_timeout: Duration,
}

impl RegistryClient {
    /// Wire up a client from configuration over the given transport
    pub fn new(config: &Config, publisher: Arc<dyn Publisher>) -> Self {
        let hostname = config.client.hostname.clone();
        debug!(%hostname, reply_to = %config.client.reply_to, "RegistryClient::new: called");

        let callbacks = Arc::new(CallbackManager::new(
            publisher.clone(),
            hostname.clone(),
            config.client.reply_to.clone(),
        ));
        let registration = RegistrationManager::new(publisher, hostname, &config.notifier);

        let dispatcher = Dispatcher::new()
            .route(MessageType::ListResult, callbacks.clone())
            .route(MessageType::Error, callbacks.clone())
            .route(MessageType::Ping, registration.ping_responder().clone());

        Self {
            callbacks,
            registration,
            dispatcher: Arc::new(dispatcher),
            request_timeout: config.client.request_timeout(),
        }
    }

    /// Default timeout from configuration
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn reply_to(&self) -> &str {
        self.callbacks.reply_to()
    }

    /// Ask the registry for every provider it knows
    pub async fn list_providers(&self, timeout: Duration) -> Result<ListProvidersResponse, RegistryError> {
        debug!(?timeout, "RegistryClient::list_providers: called");
        let reply = self
            .callbacks
            .submit_request(Destination::Service, MessageBody::ListRequest, timeout)
            .await?;

        let request_id = reply.correlation_id().clone();
        match reply.payload {
            MessageBody::ListResult { providers } => {
                debug!(%request_id, count = providers.len(), "RegistryClient::list_providers: received");
                Ok(ListProvidersResponse { request_id, providers })
            }
            other => {
                warn!(%request_id, message_type = %other.message_type(), "Unexpected reply to list request");
                Err(RegistryError::UnexpectedReply(other.message_type()))
            }
        }
    }

    pub async fn register(
        &self,
        identity: ProviderIdentity,
        capabilities: Vec<Capability>,
    ) -> Result<Arc<ProviderRecord>, RegistryError> {
        debug!(%identity, "RegistryClient::register: called");
        self.registration.register(identity, capabilities).await
    }

    pub async fn unregister(&self, identity: &ProviderIdentity) -> Result<(), RegistryError> {
        debug!(%identity, "RegistryClient::unregister: called");
        self.registration.unregister(identity).await
    }

    /// Stop accepting requests, let in-flight calls finish, release the provider
    ///
    /// The provider is dropped locally (no more heartbeats or ping answers)
    /// without an unregister announcement. Returns true if every in-flight
    /// call completed within `grace`.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        debug!(?grace, "RegistryClient::shutdown: called");
        self.callbacks.mark_shut_down();
        let drained = self.callbacks.drain(grace).await;
        self.registration.release().await;
        info!(drained, "Registry client shut down");
        drained
    }

    /// Inbound surface: feed every received message through this
    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    /// Drain an inbound queue through the dispatcher until it closes
    pub async fn run_inbound(&self, inbound: mpsc::Receiver<Message>) {
        debug!("RegistryClient::run_inbound: called");
        self.dispatcher.run(inbound).await;
    }

    pub fn callbacks(&self) -> &Arc<CallbackManager> {
        &self.callbacks
    }

    pub fn metrics(&self) -> CallbackMetrics {
        self.callbacks.metrics()
    }

    pub fn registration(&self) -> &RegistrationManager {
        &self.registration
    }
}
