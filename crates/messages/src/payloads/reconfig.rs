//! Reconfiguration (RC) payloads.

use crate::{MessageType, Payload};
use bincode::{Decode, Encode};
use kronos_types::{signing, ClaimValue, Height, ShardId, Signature, SignerBitfield};

/// A starter's signed request to reconfigure `shard`.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct ReConfig {
    pub shard: ShardId,
    pub height: Height,
    claim: Vec<u8>,
    pub signature: Signature,
}

impl ReConfig {
    pub fn new(shard: ShardId, height: Height, claim: &ClaimValue, signature: Signature) -> Self {
        Self {
            shard,
            height,
            claim: claim.to_bytes_be(),
            signature,
        }
    }

    pub fn claim(&self) -> ClaimValue {
        ClaimValue::from_bytes_be(&self.claim)
    }

    pub fn signing_message(&self) -> Vec<u8> {
        signing::claim_message(self.height, &self.claim())
    }
}

impl Payload for ReConfig {
    const MESSAGE_TYPE: MessageType = MessageType::ReConfig;
}

/// Approval of the claim together with the proposed node set.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct RcCheckOk {
    pub shard: ShardId,
    pub height: Height,
    claim: Vec<u8>,
    /// Proposed members, bitfield over global ids.
    pub new_nodes: SignerBitfield,
    pub signature: Signature,
}

impl RcCheckOk {
    pub fn new(
        shard: ShardId,
        height: Height,
        claim: &ClaimValue,
        new_nodes: SignerBitfield,
        signature: Signature,
    ) -> Self {
        Self {
            shard,
            height,
            claim: claim.to_bytes_be(),
            new_nodes,
            signature,
        }
    }

    pub fn claim(&self) -> ClaimValue {
        ClaimValue::from_bytes_be(&self.claim)
    }

    pub fn signing_message(&self) -> Vec<u8> {
        signing::reconfig_check_message(self.height, &self.claim(), &self.new_nodes)
    }
}

impl Payload for RcCheckOk {
    const MESSAGE_TYPE: MessageType = MessageType::RcCheckOk;
}

/// Commitment to the new node set of `shard`.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct RcNewEpoch {
    pub shard: ShardId,
    pub new_nodes: SignerBitfield,
    pub signature: Signature,
}

impl RcNewEpoch {
    pub fn new(shard: ShardId, new_nodes: SignerBitfield, signature: Signature) -> Self {
        Self {
            shard,
            new_nodes,
            signature,
        }
    }

    pub fn signing_message(&self) -> Vec<u8> {
        signing::new_epoch_message(&self.new_nodes)
    }
}

impl Payload for RcNewEpoch {
    const MESSAGE_TYPE: MessageType = MessageType::RcNewEpoch;
}
