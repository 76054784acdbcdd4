//! Liveness-fault (NL) payloads.

use crate::{MessageType, Payload};
use bincode::{Decode, Encode};
use kronos_types::{signing, ClaimValue, Height, QuorumCertificate, ShardId, Signature};

/// A finder's signed claim that `shard` stalled at `height` with claim `A`.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct NoLiveness {
    pub shard: ShardId,
    pub height: Height,
    claim: Vec<u8>,
    pub signature: Signature,
}

impl NoLiveness {
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

    /// The bytes `signature` covers.
    pub fn signing_message(&self) -> Vec<u8> {
        signing::claim_message(self.height, &self.claim())
    }
}

impl Payload for NoLiveness {
    const MESSAGE_TYPE: MessageType = MessageType::NoLiveness;
}

/// Helpers' certificate over a NoLiveness claim, signer bitfield over
/// global ids.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct NlResponse {
    pub shard: ShardId,
    pub height: Height,
    claim: Vec<u8>,
    pub certificate: QuorumCertificate,
}

impl NlResponse {
    pub fn new(
        shard: ShardId,
        height: Height,
        claim: &ClaimValue,
        certificate: QuorumCertificate,
    ) -> Self {
        Self {
            shard,
            height,
            claim: claim.to_bytes_be(),
            certificate,
        }
    }

    pub fn claim(&self) -> ClaimValue {
        ClaimValue::from_bytes_be(&self.claim)
    }
}

impl Payload for NlResponse {
    const MESSAGE_TYPE: MessageType = MessageType::NlResponse;
}

/// A finder's signed confirmation that it holds a valid response.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct NlConfirm {
    pub shard: ShardId,
    pub height: Height,
    claim: Vec<u8>,
    pub signature: Signature,
}

impl NlConfirm {
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

impl Payload for NlConfirm {
    const MESSAGE_TYPE: MessageType = MessageType::NlConfirm;
}
