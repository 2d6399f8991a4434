//! Registry client error types

use std::time::Duration;
use thiserror::Error;

use crate::domain::{CorrelationId, MessageType};
use crate::transport::PublishError;

/// Errors surfaced by registry client operations
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Could not publish the message: {0}")]
    PublishFailure(#[from] PublishError),

    #[error("Request {correlation_id} timed out after {after:?}")]
    Timeout {
        correlation_id: CorrelationId,
        after: Duration,
    },

    #[error("Registry returned an error: {message}")]
    Application { message: String },

    #[error("The client is shutting down, requests are not being accepted")]
    ShutdownRejected,

    #[error("No pending request for correlation id {0}")]
    UnknownCorrelation(CorrelationId),

    #[error("Unable to schedule notifier: {0}")]
    Scheduler(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Unexpected reply of type {0}")]
    UnexpectedReply(MessageType),
}

impl RegistryError {
    /// Check if this is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, RegistryError::Timeout { .. })
    }

    /// Check if the failure happened before anything reached the far side
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            RegistryError::PublishFailure(_)
                | RegistryError::ShutdownRejected
                | RegistryError::Scheduler(_)
                | RegistryError::InvalidState(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_timeout() {
        let err = RegistryError::Timeout {
            correlation_id: CorrelationId::from("x"),
            after: Duration::from_millis(500),
        };
        assert!(err.is_timeout());
        assert!(!err.is_local());
        assert!(!RegistryError::ShutdownRejected.is_timeout());
    }

    #[test]
    fn test_is_local() {
        assert!(RegistryError::ShutdownRejected.is_local());
        assert!(RegistryError::PublishFailure(PublishError::Rejected("queue full".to_string())).is_local());
        assert!(
            !RegistryError::Application {
                message: "denied".to_string()
            }
            .is_local()
        );
    }

    #[test]
    fn test_display_messages() {
        let err = RegistryError::Timeout {
            correlation_id: CorrelationId::from("req-1"),
            after: Duration::from_millis(250),
        };
        assert_eq!(err.to_string(), "Request req-1 timed out after 250ms");

        let err = RegistryError::from(PublishError::Rejected("broker down".to_string()));
        assert_eq!(
            err.to_string(),
            "Could not publish the message: Transport rejected the message: broker down"
        );
    }
}
