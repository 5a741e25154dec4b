//! Actor Identity
//!
//! Immutable `(id, kind)` pair naming one logical entity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Unique identity of an entity actor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorIdentity {
    id: i64,
    kind: Arc<str>,
}

impl ActorIdentity {
    /// Create identity for entity `id` of the given kind
    pub fn new(id: i64, kind: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            kind: kind.into(),
        }
    }

    /// Entity id
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Entity kind, e.g. "player" or "guild"
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Routing key used by the cluster ring
    pub fn routing_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ActorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}
