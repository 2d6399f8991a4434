//! Transport-agnostic message envelope
//!
//! Every message carries `{type, sender-host, correlation-id, timestamp, payload}`.
//! How it is encoded on the wire is the transport's business.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::CorrelationId;
use super::provider::{ProviderIdentity, ProviderRecord};

/// Message type tag, used as the dispatch key on delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    Register,
    Unregister,
    Ping,
    Pong,
    ListRequest,
    ListResult,
    Error,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MessageType::Register => "Register",
            MessageType::Unregister => "Unregister",
            MessageType::Ping => "Ping",
            MessageType::Pong => "Pong",
            MessageType::ListRequest => "ListRequest",
            MessageType::ListResult => "ListResult",
            MessageType::Error => "Error",
        };
        write!(f, "{}", s)
    }
}

/// Envelope metadata stamped on every outbound message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageHeader {
    #[serde(rename = "sender-host")]
    pub sender_host: String,

    #[serde(rename = "correlation-id")]
    pub correlation_id: CorrelationId,

    pub timestamp: DateTime<Utc>,

    /// Where replies to this message should be sent
    #[serde(rename = "reply-to", default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

/// Message payload, tagged by type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum MessageBody {
    /// One-shot announcement that a provider is available
    Register { provider: ProviderRecord },

    /// One-shot announcement that a provider is going away
    Unregister { identity: ProviderIdentity },

    /// Liveness check from the registry
    Ping,

    /// Liveness announcement (heartbeat or ping answer)
    Pong { provider: ProviderRecord },

    /// Ask the registry for the known providers
    ListRequest,

    /// Registry answer to a ListRequest
    ListResult { providers: Vec<ProviderRecord> },

    /// Business-level error reply
    Error { message: String },
}

impl MessageBody {
    pub fn message_type(&self) -> MessageType {
        match self {
            MessageBody::Register { .. } => MessageType::Register,
            MessageBody::Unregister { .. } => MessageType::Unregister,
            MessageBody::Ping => MessageType::Ping,
            MessageBody::Pong { .. } => MessageType::Pong,
            MessageBody::ListRequest => MessageType::ListRequest,
            MessageBody::ListResult { .. } => MessageType::ListResult,
            MessageBody::Error { .. } => MessageType::Error,
        }
    }
}

/// A complete message: header plus payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub header: MessageHeader,
    pub payload: MessageBody,
}

impl Message {
    /// Build a message stamped with the current UTC time
    pub fn new(sender_host: impl Into<String>, correlation_id: CorrelationId, payload: MessageBody) -> Self {
        Self {
            header: MessageHeader {
                sender_host: sender_host.into(),
                correlation_id,
                timestamp: Utc::now(),
                reply_to: None,
            },
            payload,
        }
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.header.reply_to = Some(reply_to.into());
        self
    }

    pub fn message_type(&self) -> MessageType {
        self.payload.message_type()
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.header.correlation_id
    }

    pub fn reply_to(&self) -> Option<&str> {
        self.header.reply_to.as_deref()
    }
}
