//! Runtime Error Types
//!
//! Error taxonomy for activation, delivery, handler execution, persistence
//! and request/response failures. Failures local to one entity never leave
//! that entity except through these values.

use crate::identity::ActorIdentity;
use thiserror::Error;

/// Boxed source error carried by persistence and activation failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure to bring an actor into the Running state
#[derive(Error, Debug)]
pub enum ActivationError {
    /// The persistence collaborator failed while loading state
    #[error("Activation of {identity} failed: {source}")]
    Load {
        identity: ActorIdentity,
        #[source]
        source: PersistenceError,
    },

    /// The persistence collaborator returned no state for this id
    #[error("Activation of {identity} failed: no persisted state")]
    NotFound { identity: ActorIdentity },

    /// The registry is shutting down and refuses new activations
    #[error("Activation of {identity} refused: registry shutting down")]
    ShuttingDown { identity: ActorIdentity },

    /// Another caller's activation of the same instance failed
    #[error("Activation of {identity} abandoned: {reason}")]
    Abandoned {
        identity: ActorIdentity,
        reason: String,
    },
}

impl ActivationError {
    /// Identity of the actor that failed to activate
    pub fn identity(&self) -> &ActorIdentity {
        match self {
            Self::Load { identity, .. }
            | Self::NotFound { identity }
            | Self::ShuttingDown { identity }
            | Self::Abandoned { identity, .. } => identity,
        }
    }
}

/// Non-fatal rejection of a single delivery
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// Actor is not in the Running state
    #[error("actor is not running")]
    NotRunning,

    /// Mailbox at capacity under the DropNew policy
    #[error("mailbox full")]
    MailboxFull,

    /// Mailbox stayed full for the whole BlockWithTimeout window
    #[error("mailbox full after waiting {waited_ms}ms")]
    Timeout { waited_ms: u64 },

    /// Mailbox closed while the message was being offered
    #[error("mailbox closed")]
    Closed,

    /// Registry no longer accepts deliveries
    #[error("registry shutting down")]
    ShuttingDown,
}

/// Failure raised while processing one message
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// Handler returned an error
    #[error("handler failed: {message}")]
    Failed { message: String },

    /// Handler panicked; the panic was contained
    #[error("handler panicked: {message}")]
    Panicked { message: String },

    /// No handler registered for the message kind
    #[error("no handler registered for message kind '{kind}'")]
    UnknownKind { kind: String },

    /// Payload type does not match the registered handler
    #[error("payload for '{kind}' is not a {expected}")]
    PayloadMismatch { kind: String, expected: &'static str },

    /// Message was evicted from a full mailbox before processing
    #[error("message evicted from full mailbox")]
    Evicted,

    /// Message was never accepted by the mailbox
    #[error("message rejected: {reason}")]
    Rejected { reason: DeliveryError },

    /// Actor stopped before the message could be processed
    #[error("actor stopped before processing message")]
    Stopped,
}

impl HandlerError {
    /// Create a handler failure from any displayable reason
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Short category label for structured logs
    pub fn category(&self) -> &'static str {
        match self {
            Self::Failed { .. } => "failed",
            Self::Panicked { .. } => "panicked",
            Self::UnknownKind { .. } => "unknown_kind",
            Self::PayloadMismatch { .. } => "payload_mismatch",
            Self::Evicted => "evicted",
            Self::Rejected { .. } => "rejected",
            Self::Stopped => "stopped",
        }
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        Self::failed(format!("{:#}", err))
    }
}

/// Failure reported by a persistence backend
#[derive(Error, Debug)]
#[error("Persistence error during {operation}: {message}")]
pub struct PersistenceError {
    pub operation: &'static str,
    pub message: String,
    #[source]
    pub source: Option<BoxError>,
}

impl PersistenceError {
    /// Create a load failure
    pub fn load(message: impl Into<String>) -> Self {
        Self {
            operation: "load",
            message: message.into(),
            source: None,
        }
    }

    /// Create a save failure
    pub fn save(message: impl Into<String>) -> Self {
        Self {
            operation: "save",
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying backend error
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

/// Failure to hand a message to an entity
#[derive(Error, Debug)]
pub enum SendError {
    #[error(transparent)]
    Activation(#[from] ActivationError),

    #[error("delivery rejected: {0}")]
    Delivery(#[from] DeliveryError),
}

impl From<SendError> for AskError {
    fn from(err: SendError) -> Self {
        match err {
            SendError::Activation(e) => Self::Activation(e),
            SendError::Delivery(e) => Self::Delivery(e),
        }
    }
}

/// Failure of a request/response exchange
#[derive(Error, Debug)]
pub enum AskError {
    #[error(transparent)]
    Activation(#[from] ActivationError),

    #[error("delivery rejected: {0}")]
    Delivery(#[from] DeliveryError),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// No reply within the caller's timeout
    #[error("no reply within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Handler replied with a different type than requested
    #[error("reply is not a {expected}")]
    ReplyMismatch { expected: &'static str },

    /// Reply sink dropped without being fulfilled
    #[error("reply dropped without an answer")]
    ReplyDropped,
}

/// Invalid handler table registration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("handler for message kind '{kind}' registered twice")]
    DuplicateKind { kind: String },

    #[error("message kind must not be empty")]
    EmptyKind,
}

/// Failure registering a registry with the actor system
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SystemError {
    #[error("a registry for entity kind '{kind}' is already registered")]
    DuplicateKind { kind: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Invalid registry configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Configuration error: {message} (field: {field})")]
pub struct ConfigError {
    pub message: String,
    pub field: &'static str,
}

impl ConfigError {
    pub fn new(message: impl Into<String>, field: &'static str) -> Self {
        Self {
            message: message.into(),
            field,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activation_error_identity() {
        let identity = ActorIdentity::new(7, "player");
        let err = ActivationError::NotFound {
            identity: identity.clone(),
        };
        assert_eq!(err.identity(), &identity);
        assert!(err.to_string().contains("player:7"));
    }

    #[test]
    fn test_handler_error_from_anyhow() {
        let err: HandlerError = anyhow::anyhow!("inventory full").into();
        assert_eq!(err, HandlerError::failed("inventory full"));
        assert_eq!(err.category(), "failed");
    }

    #[test]
    fn test_persistence_error_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = PersistenceError::save("write failed").with_source(io);
        assert_eq!(err.operation, "save");
        assert!(std::error::Error::source(&err).is_some());
    }
}
