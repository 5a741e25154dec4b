//! Placement properties of the consistent hash ring

use cluster_ring::{ClusterNode, ConsistentHashRing, NodeId};
use proptest::prelude::*;

fn node(index: usize) -> ClusterNode {
    ClusterNode::new(
        NodeId::new(format!("node-{}", index)).unwrap(),
        format!("10.0.0.{}:7000", index),
    )
}

fn ring_of(count: usize) -> ConsistentHashRing {
    let ring = ConsistentHashRing::new();
    ring.rebuild((0..count).map(node));
    ring
}

fn key(id: u32) -> String {
    format!("player:{}", id)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_independent_rings_agree(nodes in 1usize..12, keys in prop::collection::vec(any::<u32>(), 1..64)) {
        let first = ring_of(nodes);
        let second = ConsistentHashRing::new();
        // Same members added one at a time in reverse order
        for index in (0..nodes).rev() {
            second.add_node(node(index));
        }

        for id in keys {
            prop_assert_eq!(first.locate(&key(id)), second.locate(&key(id)));
        }
    }

    #[test]
    fn test_removal_moves_only_removed_keys(nodes in 2usize..10, removed in 0usize..10, keys in prop::collection::vec(any::<u32>(), 1..128)) {
        let removed = node(removed % nodes);
        let ring = ring_of(nodes);
        let before: Vec<_> = keys.iter().map(|id| ring.locate(&key(*id)).unwrap()).collect();

        ring.remove_node(removed.id());

        for (id, owner) in keys.iter().zip(before) {
            let after = ring.locate(&key(*id)).unwrap();
            if owner.id() != removed.id() {
                prop_assert_eq!(after, owner);
            } else {
                prop_assert_ne!(after.id(), removed.id());
            }
        }
    }
}

#[test]
fn test_adding_eleventh_node_remaps_about_one_eleventh() {
    let ring = ring_of(10);
    let keys: Vec<String> = (0..10_000).map(key).collect();
    let before: Vec<_> = keys.iter().map(|k| ring.locate(k).unwrap()).collect();

    let newcomer = node(10);
    ring.add_node(newcomer.clone());

    let mut moved = 0;
    for (k, owner) in keys.iter().zip(before) {
        let after = ring.locate(k).unwrap();
        if after != owner {
            assert_eq!(after.id(), newcomer.id(), "key {} moved between old nodes", k);
            moved += 1;
        }
    }

    let fraction = moved as f64 / keys.len() as f64;
    assert!(
        (0.02..=0.2).contains(&fraction),
        "remapped fraction {} far from 1/11",
        fraction
    );
}

#[test]
fn test_keys_spread_across_nodes() {
    let ring = ring_of(10);
    let mut counts = std::collections::HashMap::new();
    for id in 0..10_000 {
        let owner = ring.locate(&key(id)).unwrap();
        *counts.entry(owner.id().clone()).or_insert(0usize) += 1;
    }

    assert_eq!(counts.len(), 10);
    for (id, count) in counts {
        assert!(
            (500..=1_500).contains(&count),
            "node {} owns {} of 10000 keys",
            id,
            count
        );
    }
}
