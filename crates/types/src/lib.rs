//! Core types for Kronos.
//!
//! Everything the sequencing and accountability protocols share lives here:
//! node and shard identifiers, BLS keys, signer bitfields and quorum
//! certificates, the static topology, domain-separated signing messages and
//! the raw ledger record.

mod crypto;
mod identifiers;
mod quorum;
mod quorum_certificate;
mod record;
mod signer_bitfield;
pub mod signing;
mod topology;

pub use crypto::{AggregateError, KeyPair, PublicKey, Signature};
pub use identifiers::{Height, NodeId, RoundId, ShardId};
pub use quorum::QuorumTracker;
pub use quorum_certificate::{QcError, QuorumCertificate};
pub use record::{Classification, Record, RecordDetails, RecordError};
pub use signer_bitfield::SignerBitfield;
pub use topology::{StaticTopology, Topology, TopologyError};

/// Arbitrary-precision claim value `A`.
///
/// On the wire and in signed messages it is the minimal big-endian byte
/// string.
pub type ClaimValue = num_bigint::BigUint;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    //! Deterministic fixtures for tests.

    use super::*;

    /// Deterministic key pair for global node `index`.
    pub fn test_keypair(index: usize) -> KeyPair {
        let mut seed = [0u8; 32];
        seed[..8].copy_from_slice(&(index as u64).to_le_bytes());
        seed[31] = 0x4b;
        KeyPair::from_seed(&seed)
    }

    /// Deterministic key pairs for `count` nodes.
    pub fn test_keypairs(count: usize) -> Vec<KeyPair> {
        (0..count).map(test_keypair).collect()
    }

    /// A cross-shard record with a recognizable payload.
    pub fn test_cross_record(tag: &str, inputs: &[u32], output: u32) -> Record {
        let inputs: Vec<ShardId> = inputs.iter().copied().map(ShardId).collect();
        Record::cross_shard(tag, NodeId(0), &inputs, ShardId(output))
    }
}
