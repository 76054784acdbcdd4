//! Safety-fault (NS) payloads.

use crate::{MessageType, Payload};
use bincode::{Decode, Encode};
use kronos_types::{signing, ClaimValue, Height, QuorumCertificate, ShardId, Signature};

/// Equivocation evidence: two certificates from `shard` at the same height
/// over different claims.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct NoSafety {
    pub shard: ShardId,
    pub height: Height,
    claim1: Vec<u8>,
    claim2: Vec<u8>,
    pub certificate1: QuorumCertificate,
    pub certificate2: QuorumCertificate,
}

impl NoSafety {
    pub fn new(
        shard: ShardId,
        height: Height,
        claim1: &ClaimValue,
        claim2: &ClaimValue,
        certificate1: QuorumCertificate,
        certificate2: QuorumCertificate,
    ) -> Self {
        Self {
            shard,
            height,
            claim1: claim1.to_bytes_be(),
            claim2: claim2.to_bytes_be(),
            certificate1,
            certificate2,
        }
    }

    pub fn claim1(&self) -> ClaimValue {
        ClaimValue::from_bytes_be(&self.claim1)
    }

    pub fn claim2(&self) -> ClaimValue {
        ClaimValue::from_bytes_be(&self.claim2)
    }
}

impl Payload for NoSafety {
    const MESSAGE_TYPE: MessageType = MessageType::NoSafety;
}

/// A member of the accused shard signing the claim it keeps.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct NsChoice {
    pub shard: ShardId,
    pub height: Height,
    claim: Vec<u8>,
    pub signature: Signature,
}

impl NsChoice {
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

impl Payload for NsChoice {
    const MESSAGE_TYPE: MessageType = MessageType::NsChoice;
}
