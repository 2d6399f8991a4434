//! Provider registration lifecycle
//!
//! Registering a provider hands its record to the ping responder and the
//! heartbeat notifier, announces it once and starts the heartbeats.
//! Unregistering clears local state first, then announces the departure.

mod manager;
mod ping;

pub use manager::{RegistrationManager, RegistrationState};
pub use ping::PingResponder;
