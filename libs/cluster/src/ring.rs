//! Consistent Hash Ring
//!
//! Each node owns `virtual_nodes` points on a `u64` ring; a key belongs to
//! the first point at or after its hash, wrapping to the lowest point.
//! Adding or removing one node moves only the keys adjacent to its points.
//!
//! Reads take a shared lock and never block each other. Topology changes
//! take the write lock; [`ConsistentHashRing::rebuild`] computes the new
//! ring before locking so readers only ever see the old or the new ring.

use crate::error::{ClusterError, Result};
use crate::hasher::{Md5Hasher, RingHasher};
use crate::node::{ClusterNode, NodeId};
use entity_actors::ActorIdentity;
use parking_lot::RwLock;
use runtime_config::ClusterSettings;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

/// Default number of points per physical node
pub const DEFAULT_VIRTUAL_NODES: usize = 160;

#[derive(Debug, Default)]
struct RingState {
    /// Every node hashed onto a slot; the smallest id owns it
    points: BTreeMap<u64, BTreeSet<NodeId>>,
    nodes: HashMap<NodeId, ClusterNode>,
}

impl RingState {
    fn place<H: RingHasher>(&mut self, hasher: &H, virtual_nodes: usize, node: &ClusterNode) {
        for index in 0..virtual_nodes {
            let point = hasher.hash(point_label(node.id(), index).as_bytes());
            self.points.entry(point).or_default().insert(node.id().clone());
        }
        self.nodes.insert(node.id().clone(), node.clone());
    }

    /// Drop `id` from every slot; shared slots fall back to the other owners
    fn unplace(&mut self, id: &NodeId) {
        self.points.retain(|_, owners| {
            owners.remove(id);
            !owners.is_empty()
        });
    }

    fn owner(&self, hash: u64) -> Option<&ClusterNode> {
        let (_, owners) = self
            .points
            .range(hash..)
            .next()
            .or_else(|| self.points.iter().next())?;
        self.nodes.get(owners.first()?)
    }
}

fn point_label(id: &NodeId, index: usize) -> String {
    format!("{}#{}", id, index)
}

/// Ring mapping routing keys to cluster nodes
pub struct ConsistentHashRing<H: RingHasher = Md5Hasher> {
    hasher: H,
    virtual_nodes: usize,
    state: RwLock<RingState>,
}

impl ConsistentHashRing<Md5Hasher> {
    /// Empty ring with the default MD5 placement and 160 points per node
    pub fn new() -> Self {
        Self {
            hasher: Md5Hasher,
            virtual_nodes: DEFAULT_VIRTUAL_NODES,
            state: RwLock::new(RingState::default()),
        }
    }

    pub fn with_virtual_nodes(virtual_nodes: usize) -> Result<Self> {
        Self::with_hasher(Md5Hasher, virtual_nodes)
    }

    /// Ring holding this process's node plus the configured seed nodes
    pub fn from_settings(settings: &ClusterSettings) -> Result<Self> {
        let ring = Self::with_virtual_nodes(settings.virtual_nodes)?;
        let mut nodes = Vec::with_capacity(settings.seed_nodes.len() + 1);
        nodes.push(ClusterNode::new(
            NodeId::new(settings.node_id.clone())?,
            settings.address.clone(),
        ));
        for seed in &settings.seed_nodes {
            nodes.push(ClusterNode::try_from(seed)?);
        }
        ring.rebuild(nodes);
        Ok(ring)
    }
}

impl Default for ConsistentHashRing<Md5Hasher> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: RingHasher> ConsistentHashRing<H> {
    pub fn with_hasher(hasher: H, virtual_nodes: usize) -> Result<Self> {
        if virtual_nodes == 0 {
            return Err(ClusterError::ZeroVirtualNodes);
        }
        Ok(Self {
            hasher,
            virtual_nodes,
            state: RwLock::new(RingState::default()),
        })
    }

    pub fn virtual_nodes(&self) -> usize {
        self.virtual_nodes
    }

    /// Place `node` on the ring; returns false if it is already a member
    pub fn add_node(&self, node: ClusterNode) -> bool {
        let mut state = self.state.write();
        if state.nodes.contains_key(node.id()) {
            return false;
        }
        state.place(&self.hasher, self.virtual_nodes, &node);
        info!(
            node_id = %node.id(),
            address = %node.address(),
            nodes = state.nodes.len(),
            points = state.points.len(),
            "Node joined ring"
        );
        true
    }

    /// Remove `id` and its points
    pub fn remove_node(&self, id: &NodeId) -> Option<ClusterNode> {
        let mut state = self.state.write();
        let node = state.nodes.remove(id)?;
        state.unplace(id);
        info!(
            node_id = %id,
            nodes = state.nodes.len(),
            points = state.points.len(),
            "Node left ring"
        );
        Some(node)
    }

    /// Replace the whole membership in one step
    pub fn rebuild(&self, nodes: impl IntoIterator<Item = ClusterNode>) {
        let mut fresh = RingState::default();
        for node in nodes {
            if !fresh.nodes.contains_key(node.id()) {
                fresh.place(&self.hasher, self.virtual_nodes, &node);
            }
        }
        let (node_count, point_count) = (fresh.nodes.len(), fresh.points.len());

        *self.state.write() = fresh;
        info!(nodes = node_count, points = point_count, "Ring rebuilt");
    }

    /// Node owning `key`, or `None` while the ring is empty
    pub fn locate(&self, key: &str) -> Option<ClusterNode> {
        let hash = self.hasher.hash(key.as_bytes());
        let state = self.state.read();
        let owner = state.owner(hash).cloned();
        if owner.is_none() {
            debug!(key, "Lookup on empty ring");
        }
        owner
    }

    /// Node hosting the actor for `identity`
    pub fn locate_entity(&self, identity: &ActorIdentity) -> Option<ClusterNode> {
        self.locate(&identity.routing_key())
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.state.read().nodes.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.state.read().nodes.len()
    }

    pub fn point_count(&self) -> usize {
        self.state.read().points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().nodes.is_empty()
    }

    /// Current members sorted by id
    pub fn nodes(&self) -> Vec<ClusterNode> {
        let mut nodes: Vec<ClusterNode> = self.state.read().nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.id().cmp(b.id()));
        nodes
    }
}

impl<H: RingHasher> std::fmt::Debug for ConsistentHashRing<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("ConsistentHashRing")
            .field("virtual_nodes", &self.virtual_nodes)
            .field("nodes", &state.nodes.len())
            .field("points", &state.points.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> ClusterNode {
        ClusterNode::new(NodeId::new(id).unwrap(), format!("{}:7000", id))
    }

    #[test]
    fn test_empty_ring_locates_nothing() {
        let ring = ConsistentHashRing::new();
        assert!(ring.is_empty());
        assert_eq!(ring.locate("player:1"), None);
    }

    #[test]
    fn test_zero_virtual_nodes_rejected() {
        assert_eq!(
            ConsistentHashRing::with_virtual_nodes(0).unwrap_err(),
            ClusterError::ZeroVirtualNodes
        );
    }

    #[test]
    fn test_single_node_owns_every_key() {
        let ring = ConsistentHashRing::new();
        ring.add_node(node("a"));
        for id in 0..100 {
            let owner = ring.locate(&format!("player:{}", id)).unwrap();
            assert_eq!(owner.id().as_str(), "a");
        }
    }

    #[test]
    fn test_add_node_is_idempotent() {
        let ring = ConsistentHashRing::new();
        assert!(ring.add_node(node("a")));
        let points = ring.point_count();
        assert!(!ring.add_node(node("a")));
        assert_eq!(ring.point_count(), points);
        assert_eq!(ring.node_count(), 1);
    }

    #[test]
    fn test_point_count_matches_virtual_nodes() {
        let ring = ConsistentHashRing::with_virtual_nodes(16).unwrap();
        ring.add_node(node("a"));
        // Collisions are possible in a 32-bit space but not for 16 labels
        assert_eq!(ring.point_count(), 16);
    }

    #[test]
    fn test_remove_restores_previous_owner() {
        let ring = ConsistentHashRing::new();
        ring.add_node(node("a"));
        ring.add_node(node("b"));
        ring.remove_node(&NodeId::new("b").unwrap());

        assert_eq!(ring.node_count(), 1);
        assert_eq!(ring.point_count(), DEFAULT_VIRTUAL_NODES);
        assert_eq!(ring.locate("guild:9").unwrap().id().as_str(), "a");
        assert!(ring.remove_node(&NodeId::new("b").unwrap()).is_none());
    }

    #[test]
    fn test_lookup_wraps_past_highest_point() {
        // Points at 10, 20; keys above 20 wrap to the point at 10
        let hasher = |bytes: &[u8]| -> u64 {
            match bytes {
                b"low#0" => 10,
                b"high#0" => 20,
                b"k15" => 15,
                b"k25" => 25,
                _ => 5,
            }
        };
        let ring = ConsistentHashRing::with_hasher(hasher, 1).unwrap();
        ring.add_node(node("low"));
        ring.add_node(node("high"));

        assert_eq!(ring.locate("k15").unwrap().id().as_str(), "high");
        assert_eq!(ring.locate("k25").unwrap().id().as_str(), "low");
        assert_eq!(ring.locate("k5").unwrap().id().as_str(), "low");
    }

    #[test]
    fn test_colliding_slot_owned_by_smaller_id() {
        // Every label hashes to the same slot
        let collide = |_: &[u8]| 7u64;
        let forward = ConsistentHashRing::with_hasher(collide, 1).unwrap();
        forward.add_node(node("a"));
        forward.add_node(node("b"));
        let reverse = ConsistentHashRing::with_hasher(collide, 1).unwrap();
        reverse.add_node(node("b"));
        reverse.add_node(node("a"));
        let rebuilt = ConsistentHashRing::with_hasher(collide, 1).unwrap();
        rebuilt.rebuild(vec![node("b"), node("a")]);

        for ring in [&forward, &reverse, &rebuilt] {
            assert_eq!(ring.point_count(), 1);
            assert_eq!(ring.locate("anything").unwrap().id().as_str(), "a");
        }
    }

    #[test]
    fn test_removal_hands_shared_slot_back() {
        let ring = ConsistentHashRing::with_hasher(|_: &[u8]| 7u64, 1).unwrap();
        ring.add_node(node("b"));
        ring.add_node(node("a"));

        ring.remove_node(&NodeId::new("a").unwrap());
        assert_eq!(ring.point_count(), 1);
        assert_eq!(ring.locate("anything").unwrap().id().as_str(), "b");

        ring.remove_node(&NodeId::new("b").unwrap());
        assert_eq!(ring.point_count(), 0);
        assert_eq!(ring.locate("anything"), None);
    }

    #[test]
    fn test_removing_collision_loser_keeps_winner() {
        let ring = ConsistentHashRing::with_hasher(|_: &[u8]| 7u64, 1).unwrap();
        ring.add_node(node("a"));
        ring.add_node(node("b"));

        ring.remove_node(&NodeId::new("b").unwrap());
        assert_eq!(ring.locate("anything").unwrap().id().as_str(), "a");
    }

    #[test]
    fn test_rebuild_replaces_membership() {
        let ring = ConsistentHashRing::new();
        ring.add_node(node("old"));
        ring.rebuild(vec![node("b"), node("a"), node("a")]);

        let ids: Vec<String> = ring.nodes().iter().map(|n| n.id().to_string()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(!ring.contains(&NodeId::new("old").unwrap()));
    }

    #[test]
    fn test_from_settings_includes_local_and_seeds() {
        let settings = ClusterSettings {
            node_id: "local".into(),
            address: "127.0.0.1:7000".into(),
            virtual_nodes: 32,
            seed_nodes: vec![runtime_config::NodeSettings {
                id: "seed-1".into(),
                address: "10.0.0.2:7000".into(),
            }],
        };
        let ring = ConsistentHashRing::from_settings(&settings).unwrap();
        assert_eq!(ring.node_count(), 2);
        assert_eq!(ring.virtual_nodes(), 32);
        assert!(ring.contains(&NodeId::new("seed-1").unwrap()));
    }

    #[test]
    fn test_locate_entity_uses_routing_key() {
        let ring = ConsistentHashRing::new();
        ring.rebuild(vec![node("a"), node("b"), node("c")]);
        let identity = ActorIdentity::new(42, "player");
        assert_eq!(ring.locate_entity(&identity), ring.locate("player:42"));
    }
}
