//! Domain-specific identifier types.

use bincode::{Decode, Encode};
use std::fmt;

/// Global node identifier in `[0, N*M)`.
///
/// Nodes are laid out shard by shard: node `i` belongs to shard `i / N` and
/// sits at local index `i % N` inside that shard's committee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Shard this node belongs to, given the committee size per shard.
    pub fn shard(self, nodes_per_shard: u32) -> ShardId {
        ShardId(self.0 / nodes_per_shard)
    }

    /// Index of this node inside its shard's committee.
    pub fn local_index(self, nodes_per_shard: u32) -> usize {
        (self.0 % nodes_per_shard) as usize
    }

    /// Global id of the node at `index` in `shard`.
    pub fn from_local(shard: ShardId, index: usize, nodes_per_shard: u32) -> Self {
        NodeId(shard.0 * nodes_per_shard + index as u32)
    }

    /// Position in global key tables.
    pub fn as_index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

/// Shard identifier in `[0, M)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode)]
pub struct ShardId(pub u32);

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shard({})", self.0)
    }
}

/// Height marker of a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode)]
pub struct Height(pub u64);

impl fmt::Display for Height {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Height({})", self.0)
    }
}

/// Round identifier carried by every envelope.
///
/// Receives are keyed by `(type, round)`, so distinct rounds never block
/// each other. Epoch rounds are the 32-bit epoch in big-endian order.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode)]
pub struct RoundId(Vec<u8>);

impl RoundId {
    /// Round id for epoch `epoch`.
    pub fn epoch(epoch: u32) -> Self {
        RoundId(epoch.to_be_bytes().to_vec())
    }

    /// Round id for epoch `epoch` qualified by a tag, so that several
    /// instances within one epoch stay apart.
    pub fn tagged(tag: &[u8], epoch: u32) -> Self {
        let mut bytes = Vec::with_capacity(tag.len() + 5);
        bytes.extend_from_slice(tag);
        bytes.push(b':');
        bytes.extend_from_slice(&epoch.to_be_bytes());
        RoundId(bytes)
    }

    /// Wrap raw bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        RoundId(bytes.into())
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RoundId({})", hex::encode(&self.0))
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_layout() {
        let node = NodeId(9);
        assert_eq!(node.shard(4), ShardId(2));
        assert_eq!(node.local_index(4), 1);
        assert_eq!(NodeId::from_local(ShardId(2), 1, 4), node);
    }

    #[test]
    fn test_round_ids_are_distinct() {
        assert_eq!(RoundId::epoch(1).as_bytes(), &[0, 0, 0, 1]);
        assert_ne!(RoundId::epoch(1), RoundId::epoch(2));
        assert_ne!(RoundId::tagged(b"input", 1), RoundId::tagged(b"output", 1));
        assert_ne!(RoundId::tagged(b"input", 1), RoundId::epoch(1));
    }
}
