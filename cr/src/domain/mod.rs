//! Domain types for the capability registry client
//!
//! Core domain types: CorrelationId, ProviderRecord, Message.
//! Messages are transport-agnostic; encoding and topology belong to the transport.

mod id;
mod message;
mod provider;

pub use id::CorrelationId;
pub use message::{Message, MessageBody, MessageHeader, MessageType};
pub use provider::{Capability, ProviderIdentity, ProviderRecord, ProviderSlot};
