//! Entity Routing
//!
//! Decides whether a message for an entity is handled by this process or
//! must be forwarded to the node that owns it.

use crate::hasher::{Md5Hasher, RingHasher};
use crate::node::{ClusterNode, NodeId};
use crate::ring::ConsistentHashRing;
use entity_actors::ActorIdentity;
use std::sync::Arc;
use tracing::trace;

/// Where a message for an entity should go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// This process owns the entity
    Local,
    /// Forward to the owning node
    Remote(ClusterNode),
    /// No members known yet
    Unavailable,
}

pub struct EntityRouter<H: RingHasher = Md5Hasher> {
    local: NodeId,
    ring: Arc<ConsistentHashRing<H>>,
}

impl<H: RingHasher> EntityRouter<H> {
    pub fn new(local: NodeId, ring: Arc<ConsistentHashRing<H>>) -> Self {
        Self { local, ring }
    }

    pub fn local(&self) -> &NodeId {
        &self.local
    }

    pub fn ring(&self) -> &Arc<ConsistentHashRing<H>> {
        &self.ring
    }

    pub fn route(&self, identity: &ActorIdentity) -> Route {
        let route = match self.ring.locate_entity(identity) {
            None => Route::Unavailable,
            Some(node) if node.id() == &self.local => Route::Local,
            Some(node) => Route::Remote(node),
        };
        trace!(actor_id = %identity, route = ?route, "Routed entity");
        route
    }

    pub fn is_local(&self, identity: &ActorIdentity) -> bool {
        matches!(self.route(identity), Route::Local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> ClusterNode {
        ClusterNode::new(NodeId::new(id).unwrap(), format!("{}.game.internal:7000", id))
    }

    #[test]
    fn test_empty_ring_is_unavailable() {
        let router = EntityRouter::new(NodeId::new("a").unwrap(), Arc::new(ConsistentHashRing::new()));
        assert_eq!(router.route(&ActorIdentity::new(1, "player")), Route::Unavailable);
    }

    #[test]
    fn test_routes_split_between_local_and_remote() {
        let ring = Arc::new(ConsistentHashRing::new());
        ring.rebuild(vec![node("a"), node("b")]);
        let router = EntityRouter::new(NodeId::new("a").unwrap(), Arc::clone(&ring));

        let (mut local, mut remote) = (0, 0);
        for id in 0..200 {
            let identity = ActorIdentity::new(id, "player");
            match router.route(&identity) {
                Route::Local => local += 1,
                Route::Remote(node) => {
                    assert_eq!(node.id().as_str(), "b");
                    assert_eq!(node.address(), "b.game.internal:7000");
                    remote += 1;
                }
                Route::Unavailable => panic!("ring has members"),
            }
        }
        assert!(local > 0 && remote > 0);
    }
}
