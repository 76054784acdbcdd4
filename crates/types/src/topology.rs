//! Topology trait and static implementation.
//!
//! The topology is the static view a node has of the committee: N nodes per
//! shard, M shards, the intra-shard fault bound F, its own id and the public
//! key of every node indexed by global id. It is passed around as
//! `Arc<dyn Topology>` and never mutated.

use crate::{NodeId, PublicKey, ShardId};
use std::sync::Arc;

/// Static committee parameters and key table.
pub trait Topology: Send + Sync {
    /// Get the local node's ID.
    fn local_node(&self) -> NodeId;

    /// Number of nodes in every shard (N).
    fn nodes_per_shard(&self) -> u32;

    /// Intra-shard fault bound (F).
    fn fault_bound(&self) -> usize;

    /// Number of shards (M).
    fn num_shards(&self) -> u32;

    /// Public keys of every node, indexed by global id.
    fn global_key_table(&self) -> &[PublicKey];

    // Derived methods

    /// Get the public key for a node.
    fn public_key(&self, node: NodeId) -> Option<PublicKey> {
        self.global_key_table().get(node.as_index()).cloned()
    }

    /// Total number of nodes (N*M).
    fn total_nodes(&self) -> usize {
        self.nodes_per_shard() as usize * self.num_shards() as usize
    }

    /// Shard a node belongs to.
    fn shard_of(&self, node: NodeId) -> ShardId {
        node.shard(self.nodes_per_shard())
    }

    /// Get the local shard.
    fn local_shard(&self) -> ShardId {
        self.shard_of(self.local_node())
    }

    /// Index of the local node inside its shard.
    fn local_index(&self) -> usize {
        self.local_node().local_index(self.nodes_per_shard())
    }

    /// Whether `shard` names an existing shard.
    fn contains_shard(&self, shard: ShardId) -> bool {
        shard.0 < self.num_shards()
    }

    /// All shards in ascending order.
    fn shards(&self) -> Vec<ShardId> {
        (0..self.num_shards()).map(ShardId).collect()
    }

    /// Members of `shard`, in local index order.
    fn shard_members(&self, shard: ShardId) -> Vec<NodeId> {
        let n = self.nodes_per_shard();
        (0..n as usize)
            .map(|idx| NodeId::from_local(shard, idx, n))
            .collect()
    }

    /// Public keys of `shard`, indexed by local index.
    fn shard_key_table(&self, shard: ShardId) -> Vec<PublicKey> {
        self.shard_members(shard)
            .into_iter()
            .filter_map(|node| self.public_key(node))
            .collect()
    }

    /// Global fault bound, `(N*M - 1) / 3`.
    fn global_fault_bound(&self) -> usize {
        self.total_nodes().saturating_sub(1) / 3
    }

    /// `F + 1`: enough signers that at least one is honest.
    fn weak_quorum(&self) -> usize {
        self.fault_bound() + 1
    }

    /// `2F + 1` signers within one shard.
    fn shard_quorum(&self) -> usize {
        2 * self.fault_bound() + 1
    }

    /// `2F_global + 1` signers across the whole committee.
    fn global_quorum(&self) -> usize {
        2 * self.global_fault_bound() + 1
    }
}

/// Errors that can occur when building a topology.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopologyError {
    #[error("expected {expected} public keys, got {actual}")]
    KeyCountMismatch { expected: usize, actual: usize },

    #[error("local node {0} is outside the committee")]
    UnknownLocalNode(NodeId),

    #[error("committee must have at least one shard and one node per shard")]
    EmptyCommittee,
}

/// A static topology implementation.
#[derive(Debug, Clone)]
pub struct StaticTopology {
    local_node: NodeId,
    nodes_per_shard: u32,
    fault_bound: usize,
    num_shards: u32,
    keys: Arc<[PublicKey]>,
}

impl StaticTopology {
    /// Create a new static topology.
    pub fn new(
        local_node: NodeId,
        nodes_per_shard: u32,
        fault_bound: usize,
        num_shards: u32,
        keys: Vec<PublicKey>,
    ) -> Result<Self, TopologyError> {
        Self::from_shared(local_node, nodes_per_shard, fault_bound, num_shards, keys.into())
    }

    /// Create a topology over an already shared key table.
    pub fn from_shared(
        local_node: NodeId,
        nodes_per_shard: u32,
        fault_bound: usize,
        num_shards: u32,
        keys: Arc<[PublicKey]>,
    ) -> Result<Self, TopologyError> {
        if nodes_per_shard == 0 || num_shards == 0 {
            return Err(TopologyError::EmptyCommittee);
        }
        let expected = nodes_per_shard as usize * num_shards as usize;
        if keys.len() != expected {
            return Err(TopologyError::KeyCountMismatch {
                expected,
                actual: keys.len(),
            });
        }
        if local_node.as_index() >= expected {
            return Err(TopologyError::UnknownLocalNode(local_node));
        }
        Ok(Self {
            local_node,
            nodes_per_shard,
            fault_bound,
            num_shards,
            keys,
        })
    }

    /// The same committee seen from another node.
    pub fn for_node(&self, local_node: NodeId) -> Result<Self, TopologyError> {
        Self::from_shared(
            local_node,
            self.nodes_per_shard,
            self.fault_bound,
            self.num_shards,
            self.keys.clone(),
        )
    }

    /// Create a topology as an Arc.
    pub fn into_arc(self) -> Arc<dyn Topology> {
        Arc::new(self)
    }
}

impl Topology for StaticTopology {
    fn local_node(&self) -> NodeId {
        self.local_node
    }

    fn nodes_per_shard(&self) -> u32 {
        self.nodes_per_shard
    }

    fn fault_bound(&self) -> usize {
        self.fault_bound
    }

    fn num_shards(&self) -> u32 {
        self.num_shards
    }

    fn global_key_table(&self) -> &[PublicKey] {
        &self.keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyPair;

    fn keys(count: usize) -> Vec<PublicKey> {
        (0..count)
            .map(|i| KeyPair::from_seed(&[i as u8 + 1; 32]).public_key())
            .collect()
    }

    #[test]
    fn test_derived_parameters() {
        // N = 4, F = 1, M = 3.
        let topology = StaticTopology::new(NodeId(6), 4, 1, 3, keys(12)).unwrap();

        assert_eq!(topology.local_shard(), ShardId(1));
        assert_eq!(topology.local_index(), 2);
        assert_eq!(topology.total_nodes(), 12);
        assert_eq!(topology.global_fault_bound(), 3);
        assert_eq!(topology.weak_quorum(), 2);
        assert_eq!(topology.shard_quorum(), 3);
        assert_eq!(topology.global_quorum(), 7);
        assert_eq!(
            topology.shard_members(ShardId(2)),
            vec![NodeId(8), NodeId(9), NodeId(10), NodeId(11)]
        );
        assert_eq!(topology.shard_key_table(ShardId(2))[1], topology.global_key_table()[9]);
        assert!(topology.contains_shard(ShardId(2)));
        assert!(!topology.contains_shard(ShardId(3)));
    }

    #[test]
    fn test_rejects_bad_key_table() {
        assert_eq!(
            StaticTopology::new(NodeId(0), 4, 1, 3, keys(11)).unwrap_err(),
            TopologyError::KeyCountMismatch {
                expected: 12,
                actual: 11
            }
        );
        assert_eq!(
            StaticTopology::new(NodeId(12), 4, 1, 3, keys(12)).unwrap_err(),
            TopologyError::UnknownLocalNode(NodeId(12))
        );
    }

    #[test]
    fn test_for_node_shares_keys() {
        let topology = StaticTopology::new(NodeId(0), 2, 0, 2, keys(4)).unwrap();
        let other = topology.for_node(NodeId(3)).unwrap();

        assert_eq!(other.local_shard(), ShardId(1));
        assert_eq!(other.global_key_table(), topology.global_key_table());
    }
}
