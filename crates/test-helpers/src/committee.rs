use kronos_types::test_utils::test_keypairs;
use kronos_types::{
    KeyPair, NodeId, PublicKey, QuorumCertificate, ShardId, Signature, SignerBitfield,
    StaticTopology,
};
use std::sync::Arc;

/// Deterministically keyed committee of `N` nodes in each of `M` shards.
#[derive(Debug, Clone)]
pub struct TestCommittee {
    nodes_per_shard: u32,
    fault_bound: usize,
    num_shards: u32,
    keys: Vec<KeyPair>,
    public_keys: Arc<[PublicKey]>,
}

impl TestCommittee {
    /// Build a committee with `nodes_per_shard` nodes per shard, intra-shard
    /// fault bound `fault_bound` and `num_shards` shards.
    pub fn new(nodes_per_shard: u32, fault_bound: usize, num_shards: u32) -> Self {
        let keys = test_keypairs(nodes_per_shard as usize * num_shards as usize);
        let public_keys: Arc<[PublicKey]> = keys.iter().map(|k| k.public_key()).collect();
        Self {
            nodes_per_shard,
            fault_bound,
            num_shards,
            keys,
            public_keys,
        }
    }

    /// Total number of nodes.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the committee has no nodes.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn nodes_per_shard(&self) -> u32 {
        self.nodes_per_shard
    }

    /// The topology as seen by global node `node`.
    pub fn topology(&self, node: u32) -> StaticTopology {
        StaticTopology::from_shared(
            NodeId(node),
            self.nodes_per_shard,
            self.fault_bound,
            self.num_shards,
            self.public_keys.clone(),
        )
        .expect("test committee topology is consistent")
    }

    /// Signing key of global node `node`.
    pub fn keypair(&self, node: u32) -> &KeyPair {
        &self.keys[node as usize]
    }

    /// Public keys indexed by global id.
    pub fn public_keys(&self) -> Vec<PublicKey> {
        self.public_keys.to_vec()
    }

    /// Public keys of `shard` indexed by local index.
    pub fn shard_public_keys(&self, shard: ShardId) -> Vec<PublicKey> {
        self.shard_range(shard)
            .map(|i| self.public_keys[i].clone())
            .collect()
    }

    /// Certificate over `message` signed by the given shard-local indices
    /// of `shard`.
    pub fn certify_shard(&self, shard: ShardId, indices: &[usize], message: &[u8]) -> QuorumCertificate {
        let base = self.shard_range(shard).start;
        let signers = SignerBitfield::from_indices(self.nodes_per_shard as usize, indices.iter().copied());
        let sigs: Vec<Signature> = signers
            .set_indices()
            .map(|i| self.keys[base + i].sign(message))
            .collect();
        QuorumCertificate::aggregate(message.to_vec(), signers, &sigs)
            .expect("test certificate aggregates")
    }

    /// Certificate over `message` signed by the given global ids.
    pub fn certify_global(&self, nodes: &[u32], message: &[u8]) -> QuorumCertificate {
        let signers = SignerBitfield::from_indices(self.len(), nodes.iter().map(|n| *n as usize));
        let sigs: Vec<Signature> = signers
            .set_indices()
            .map(|i| self.keys[i].sign(message))
            .collect();
        QuorumCertificate::aggregate(message.to_vec(), signers, &sigs)
            .expect("test certificate aggregates")
    }

    fn shard_range(&self, shard: ShardId) -> std::ops::Range<usize> {
        let n = self.nodes_per_shard as usize;
        let start = shard.0 as usize * n;
        start..start + n
    }
}
