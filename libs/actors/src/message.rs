//! Actor Messages
//!
//! A message is a kind tag, an opaque payload and an optional reply sink.
//! The payload is only interpreted by the handler registered for the tag.

use crate::error::HandlerError;
use std::any::Any;
use std::fmt;
use tokio::sync::oneshot;

/// Opaque message payload
pub type Payload = Box<dyn Any + Send>;

/// Type-erased handler result delivered through a reply sink
pub type Reply = std::result::Result<Payload, HandlerError>;

/// One-shot sink for the result of a request
///
/// Consuming `succeed`/`fail` guarantees the sink is resolved at most once.
/// A sink dropped unresolved is observed by the caller as a dropped reply.
pub struct ReplySink {
    tx: oneshot::Sender<Reply>,
}

impl ReplySink {
    /// Create a sink and the receiver the caller awaits on
    pub fn channel() -> (Self, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Resolve with a handler result
    pub fn succeed(self, value: Payload) {
        // Caller may have timed out and dropped the receiver.
        let _ = self.tx.send(Ok(value));
    }

    /// Resolve with a failure
    pub fn fail(self, error: HandlerError) {
        let _ = self.tx.send(Err(error));
    }

    /// Resolve with either outcome
    pub fn resolve(self, reply: Reply) {
        let _ = self.tx.send(reply);
    }

    /// True when the caller is no longer waiting
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

impl fmt::Debug for ReplySink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplySink")
            .field("abandoned", &self.is_abandoned())
            .finish()
    }
}

/// Message delivered to an entity actor
pub struct Message {
    kind: String,
    payload: Payload,
    reply: Option<ReplySink>,
}

impl Message {
    /// Fire-and-forget message
    pub fn new<P: Any + Send>(kind: impl Into<String>, payload: P) -> Self {
        Self {
            kind: kind.into(),
            payload: Box::new(payload),
            reply: None,
        }
    }

    /// Message carrying a reply sink
    pub fn with_reply<P: Any + Send>(kind: impl Into<String>, payload: P, reply: ReplySink) -> Self {
        Self {
            kind: kind.into(),
            payload: Box::new(payload),
            reply: Some(reply),
        }
    }

    /// Kind tag used for dispatch
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Whether a caller is waiting for the result
    pub fn expects_reply(&self) -> bool {
        self.reply.is_some()
    }

    /// Fail the reply sink, if any, consuming the message
    pub fn reject(self, error: HandlerError) {
        if let Some(reply) = self.reply {
            reply.fail(error);
        }
    }

    pub(crate) fn into_parts(self) -> (String, Payload, Option<ReplySink>) {
        (self.kind, self.payload, self.reply)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("kind", &self.kind)
            .field("expects_reply", &self.expects_reply())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reply_sink_success() {
        let (sink, rx) = ReplySink::channel();
        sink.succeed(Box::new(5u32));
        let value = rx.await.unwrap().unwrap();
        assert_eq!(*value.downcast::<u32>().unwrap(), 5);
    }

    #[tokio::test]
    async fn test_reject_fails_reply() {
        let (sink, rx) = ReplySink::channel();
        let msg = Message::with_reply("increment", (), sink);
        assert!(msg.expects_reply());
        msg.reject(HandlerError::Evicted);
        assert_eq!(rx.await.unwrap().unwrap_err(), HandlerError::Evicted);
    }

    #[tokio::test]
    async fn test_abandoned_sink() {
        let (sink, rx) = ReplySink::channel();
        drop(rx);
        assert!(sink.is_abandoned());
    }
}
