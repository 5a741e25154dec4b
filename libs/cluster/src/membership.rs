//! Topology Change Notifications
//!
//! The membership service (gossip, static config, orchestration) is outside
//! this crate; it reports changes through [`MembershipListener`].

use crate::hasher::RingHasher;
use crate::node::{ClusterNode, NodeId};
use crate::ring::ConsistentHashRing;
use serde::{Deserialize, Serialize};

/// Change in cluster membership
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TopologyChange {
    NodeJoined(ClusterNode),
    NodeLeft(NodeId),
    /// Full membership, replacing whatever was known before
    Snapshot(Vec<ClusterNode>),
}

/// Receiver of membership changes
pub trait MembershipListener: Send + Sync {
    fn on_topology_change(&self, change: TopologyChange);
}

impl<H: RingHasher> MembershipListener for ConsistentHashRing<H> {
    fn on_topology_change(&self, change: TopologyChange) {
        match change {
            TopologyChange::NodeJoined(node) => {
                self.add_node(node);
            }
            TopologyChange::NodeLeft(id) => {
                self.remove_node(&id);
            }
            TopologyChange::Snapshot(nodes) => self.rebuild(nodes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> ClusterNode {
        ClusterNode::new(NodeId::new(id).unwrap(), "")
    }

    #[test]
    fn test_ring_applies_changes() {
        let ring = ConsistentHashRing::with_virtual_nodes(8).unwrap();
        ring.on_topology_change(TopologyChange::NodeJoined(node("a")));
        ring.on_topology_change(TopologyChange::NodeJoined(node("b")));
        assert_eq!(ring.node_count(), 2);

        ring.on_topology_change(TopologyChange::NodeLeft(NodeId::new("a").unwrap()));
        assert_eq!(ring.nodes(), vec![node("b")]);

        ring.on_topology_change(TopologyChange::Snapshot(vec![node("c"), node("d")]));
        assert_eq!(ring.nodes(), vec![node("c"), node("d")]);
    }
}
