//! Handler Dispatch
//!
//! Static table from message kind tag to a typed handler closure. Handlers
//! are validated once when registered; dispatch only downcasts the payload.
//! Entity state is reachable exclusively through [`HandlerContext`], which
//! the actor builds inside its own drain turn.

use crate::error::{DispatchError, HandlerError};
use crate::identity::ActorIdentity;
use crate::message::Payload;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// Borrowed view of an actor's state handed to a handler
pub struct HandlerContext<'a, S> {
    identity: &'a ActorIdentity,
    state: &'a mut S,
    dirty: &'a mut bool,
}

impl<'a, S> HandlerContext<'a, S> {
    pub(crate) fn new(identity: &'a ActorIdentity, state: &'a mut S, dirty: &'a mut bool) -> Self {
        Self {
            identity,
            state,
            dirty,
        }
    }

    pub fn identity(&self) -> &ActorIdentity {
        self.identity
    }

    /// Read-only state access
    pub fn state(&self) -> &S {
        self.state
    }

    /// Mutable state access; marks the actor dirty
    pub fn state_mut(&mut self) -> &mut S {
        *self.dirty = true;
        self.state
    }

    /// Flag state for persistence without touching it
    pub fn mark_dirty(&mut self) {
        *self.dirty = true;
    }
}

type ErasedHandler<S> =
    Box<dyn Fn(&mut HandlerContext<'_, S>, Payload) -> Result<Payload, HandlerError> + Send + Sync>;

struct HandlerEntry<S> {
    payload_type: &'static str,
    handler: ErasedHandler<S>,
}

/// Dispatch table for one entity kind
pub struct HandlerTable<S> {
    handlers: HashMap<String, HandlerEntry<S>>,
}

impl<S: 'static> HandlerTable<S> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a typed handler for `kind`
    pub fn register<P, R, F>(&mut self, kind: impl Into<String>, handler: F) -> Result<(), DispatchError>
    where
        P: Any + Send,
        R: Any + Send,
        F: Fn(&mut HandlerContext<'_, S>, P) -> Result<R, HandlerError> + Send + Sync + 'static,
    {
        let kind = kind.into();
        if kind.is_empty() {
            return Err(DispatchError::EmptyKind);
        }
        if self.handlers.contains_key(&kind) {
            return Err(DispatchError::DuplicateKind { kind });
        }

        let tag = kind.clone();
        let erased: ErasedHandler<S> = Box::new(move |ctx: &mut HandlerContext<'_, S>, payload: Payload| {
            let payload = payload.downcast::<P>().map_err(|_| HandlerError::PayloadMismatch {
                kind: tag.clone(),
                expected: std::any::type_name::<P>(),
            })?;
            handler(ctx, *payload).map(|reply| Box::new(reply) as Payload)
        });

        self.handlers.insert(
            kind,
            HandlerEntry {
                payload_type: std::any::type_name::<P>(),
                handler: erased,
            },
        );
        Ok(())
    }

    /// Builder-style [`register`](Self::register)
    pub fn on<P, R, F>(mut self, kind: impl Into<String>, handler: F) -> Result<Self, DispatchError>
    where
        P: Any + Send,
        R: Any + Send,
        F: Fn(&mut HandlerContext<'_, S>, P) -> Result<R, HandlerError> + Send + Sync + 'static,
    {
        self.register(kind, handler)?;
        Ok(self)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Run the handler for `kind`, containing panics
    pub(crate) fn dispatch(
        &self,
        ctx: &mut HandlerContext<'_, S>,
        kind: &str,
        payload: Payload,
    ) -> Result<Payload, HandlerError> {
        let entry = self.handlers.get(kind).ok_or_else(|| HandlerError::UnknownKind {
            kind: kind.to_string(),
        })?;

        match panic::catch_unwind(AssertUnwindSafe(|| (entry.handler)(ctx, payload))) {
            Ok(result) => result,
            Err(panic) => Err(HandlerError::Panicked {
                message: panic_message(panic.as_ref()),
            }),
        }
    }
}

impl<S: 'static> Default for HandlerTable<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> fmt::Debug for HandlerTable<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.handlers.iter().map(|(k, e)| (k, e.payload_type)))
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
