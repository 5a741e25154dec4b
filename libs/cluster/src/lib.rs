//! Cluster Placement
//!
//! Consistent hashing of entity routing keys onto cluster nodes. Every
//! process builds the same ring from the same membership, so any node can
//! tell which node hosts a given entity without coordination.
//!
//! ```rust
//! use cluster_ring::{ClusterNode, ConsistentHashRing, NodeId};
//!
//! let ring = ConsistentHashRing::new();
//! ring.add_node(ClusterNode::new(NodeId::new("node-a")?, "10.0.0.1:7000"));
//! ring.add_node(ClusterNode::new(NodeId::new("node-b")?, "10.0.0.2:7000"));
//!
//! let owner = ring.locate("player:42").expect("ring has members");
//! assert_eq!(ring.locate("player:42"), Some(owner));
//! # Ok::<(), cluster_ring::ClusterError>(())
//! ```

pub mod error;
pub mod hasher;
pub mod membership;
pub mod node;
pub mod ring;
pub mod router;

pub use error::{ClusterError, Result};
pub use hasher::{Md5Hasher, RingHasher};
pub use membership::{MembershipListener, TopologyChange};
pub use node::{ClusterNode, NodeId};
pub use ring::{ConsistentHashRing, DEFAULT_VIRTUAL_NODES};
pub use router::{EntityRouter, Route};
