//! RegistrationManager - provider lifecycle state machine

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::ping::PingResponder;
use crate::domain::{Capability, CorrelationId, Message, MessageBody, ProviderIdentity, ProviderRecord, ProviderSlot};
use crate::error::RegistryError;
use crate::notifier::{HeartbeatNotifier, NotifierConfig};
use crate::transport::{Destination, Publisher};

/// Where the provider is in its registration lifecycle
///
/// `Unregistered -> Registering -> Registered -> Unregistering -> Unregistered`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegistrationState {
    #[default]
    Unregistered,
    Registering,
    Registered,
    Unregistering,
}

/// Orchestrates provider registration, heartbeats and ping answers
pub struct RegistrationManager {
    publisher: Arc<dyn Publisher>,
    hostname: String,

    /// Record shared with the ping responder and the notifier
    provider: ProviderSlot,
    ping_responder: Arc<PingResponder>,
    notifier: Arc<HeartbeatNotifier>,
    initial_delay: Duration,
    period: Duration,
    state: Mutex<RegistrationState>,

    /// Serializes register/unregister so transitions never interleave
    transition: tokio::sync::Mutex<()>,
}

impl RegistrationManager {
    /// Build the lifecycle together with its ping responder and notifier
    ///
    /// Both read the provider record from one shared slot.
    pub fn new(publisher: Arc<dyn Publisher>, hostname: impl Into<String>, config: &NotifierConfig) -> Self {
        let hostname = hostname.into();
        debug!(%hostname, ?config, "RegistrationManager::new: called");
        let provider = ProviderSlot::new();
        let ping_responder = Arc::new(PingResponder::with_slot(
            publisher.clone(),
            hostname.clone(),
            provider.clone(),
        ));
        let notifier = Arc::new(HeartbeatNotifier::with_slot(
            publisher.clone(),
            hostname.clone(),
            config.shutdown_wait(),
            provider.clone(),
        ));
        Self {
            publisher,
            hostname,
            provider,
            ping_responder,
            notifier,
            initial_delay: config.initial_delay(),
            period: config.period(),
            state: Mutex::new(RegistrationState::Unregistered),
            transition: tokio::sync::Mutex::new(()),
        }
    }

    pub fn state(&self) -> RegistrationState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_registered(&self) -> bool {
        self.state() == RegistrationState::Registered
    }

    /// The record currently answered to pings
    pub fn provider(&self) -> Option<Arc<ProviderRecord>> {
        self.provider.get()
    }

    pub fn notifier(&self) -> &Arc<HeartbeatNotifier> {
        &self.notifier
    }

    pub fn ping_responder(&self) -> &Arc<PingResponder> {
        &self.ping_responder
    }

    fn set_state(&self, state: RegistrationState) {
        let mut current = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        debug!(from = ?*current, to = ?state, "RegistrationManager::set_state: transition");
        *current = state;
    }

    /// Register (or re-register) a provider
    ///
    /// The announcement is fire-and-forget; the registry learns of the
    /// provider for certain through later heartbeats and ping answers.
    pub async fn register(
        &self,
        identity: ProviderIdentity,
        capabilities: Vec<Capability>,
    ) -> Result<Arc<ProviderRecord>, RegistryError> {
        debug!(%identity, capabilities = capabilities.len(), "RegistrationManager::register: called");
        if identity.name.trim().is_empty() {
            return Err(RegistryError::InvalidState("provider identity name is empty".to_string()));
        }

        let _transition = self.transition.lock().await;
        let was_registered = self.state() == RegistrationState::Registered;
        self.set_state(RegistrationState::Registering);

        let record = Arc::new(ProviderRecord::new(identity, capabilities));
        self.provider.set(record.clone());

        let correlation_id = CorrelationId::new();
        let announcement = Message::new(
            &self.hostname,
            correlation_id.clone(),
            MessageBody::Register {
                provider: record.as_ref().clone(),
            },
        );
        if let Err(e) = self.publisher.publish(&Destination::Registration, announcement).await {
            error!(%correlation_id, identity = %record.identity, error = %e, "Error publishing register announcement");
            if was_registered {
                // Heartbeats keep announcing the new record
                self.set_state(RegistrationState::Registered);
            } else {
                self.rollback().await;
            }
            return Err(e.into());
        }

        if let Err(e) = self.notifier.start(self.initial_delay, self.period) {
            error!(error = %e, "Unable to start the notifier");
            self.rollback().await;
            return Err(e);
        }

        self.set_state(RegistrationState::Registered);
        info!(%correlation_id, identity = %record.identity, "Provider registered");
        Ok(record)
    }

    /// Unregister the provider
    ///
    /// Local state is cleared and the notifier stopped before the departure is
    /// announced, so no heartbeat can re-announce the provider afterwards.
    pub async fn unregister(&self, identity: &ProviderIdentity) -> Result<(), RegistryError> {
        debug!(%identity, "RegistrationManager::unregister: called");
        let _transition = self.transition.lock().await;

        match self.provider.get() {
            Some(current) if current.identity != *identity => {
                warn!(registered = %current.identity, requested = %identity, "Unregistering a provider that is not the registered one");
            }
            None => {
                debug!(%identity, "RegistrationManager::unregister: nothing registered locally");
            }
            _ => {}
        }

        self.set_state(RegistrationState::Unregistering);
        self.provider.clear();
        self.notifier.stop().await;
        self.set_state(RegistrationState::Unregistered);

        let correlation_id = CorrelationId::new();
        let announcement = Message::new(
            &self.hostname,
            correlation_id.clone(),
            MessageBody::Unregister {
                identity: identity.clone(),
            },
        );
        if let Err(e) = self.publisher.publish(&Destination::Registration, announcement).await {
            error!(%correlation_id, %identity, error = %e, "Error publishing unregister announcement");
            return Err(e.into());
        }

        info!(%correlation_id, %identity, "Provider unregistered");
        Ok(())
    }

    /// Drop the registration locally without announcing it
    ///
    /// Used on client shutdown: heartbeats and ping answers stop, and the
    /// registry ages the provider out. Returns the record that was active.
    pub async fn release(&self) -> Option<Arc<ProviderRecord>> {
        debug!("RegistrationManager::release: called");
        let _transition = self.transition.lock().await;
        self.set_state(RegistrationState::Unregistering);
        let released = self.provider.clear();
        self.notifier.stop().await;
        self.set_state(RegistrationState::Unregistered);
        if let Some(record) = &released {
            info!(identity = %record.identity, "Provider released without unregister announcement");
        }
        released
    }

    async fn rollback(&self) {
        debug!("RegistrationManager::rollback: called");
        self.provider.clear();
        self.notifier.stop().await;
        self.set_state(RegistrationState::Unregistered);
    }
}
