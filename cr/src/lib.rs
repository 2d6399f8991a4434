//! capregistry - client for a capability registry over pub/sub messaging
//!
//! The transport only offers fire-and-forget publishing and an inbound message
//! stream. This crate layers on top of it:
//!
//! - **Correlated calls**: publish a request, await its reply with a deadline
//! - **Heartbeats**: periodic re-announcement of the registered provider
//! - **Registration lifecycle**: register, answer pings, unregister
//!
//! # Modules
//!
//! - [`callback`] - Correlation registry and the request/reply manager
//! - [`notifier`] - Fixed-delay heartbeat scheduler
//! - [`registration`] - Provider lifecycle and ping responder
//! - [`dispatch`] - Inbound routing by message type
//! - [`transport`] - Publisher seam, loopback transport, simulated registry
//! - [`client`] - Facade wiring everything from a [`Config`]
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod callback;
pub mod cli;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod notifier;
pub mod registration;
pub mod transport;

// Re-export commonly used types
pub use callback::{CallState, CallbackManager, CallbackMetrics, CorrelationRegistry, PendingCall, Resolution};
pub use client::{ListProvidersResponse, RegistryClient};
pub use config::{ClientConfig, Config, ProviderConfig};
pub use dispatch::{Dispatcher, MessageHandler};
pub use domain::{
    Capability, CorrelationId, Message, MessageBody, MessageHeader, MessageType, ProviderIdentity, ProviderRecord,
    ProviderSlot,
};
pub use error::RegistryError;
pub use notifier::{HeartbeatNotifier, NotifierConfig, NotifierSchedule, TickOutcome};
pub use registration::{PingResponder, RegistrationManager, RegistrationState};
pub use transport::{Delivery, Destination, LoopbackTransport, PublishError, Publisher, RegistryService};
