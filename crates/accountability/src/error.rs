use kronos_core::{BftError, TransportError};
use kronos_messages::CodecError;
use kronos_types::{QcError, ShardId};
use thiserror::Error;

/// Errors that end a liveness-fault run.
#[derive(Debug, Error)]
pub enum LivenessError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("ordering error: {0}")]
    Bft(#[from] BftError),

    #[error("failed to certify claim: {0}")]
    Certificate(#[from] QcError),
}

/// Why a pair of certificates does not prove equivocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvidenceError {
    #[error("accused {0} is not part of the committee")]
    UnknownShard(ShardId),

    #[error("both certificates cover the same claim")]
    IdenticalClaims,

    #[error("certificate {which} does not cover the claimed height and value")]
    ClaimMismatch { which: u8 },

    #[error("certificate {which} has {signers} signers, need {quorum}")]
    BelowQuorum {
        which: u8,
        signers: usize,
        quorum: usize,
    },

    #[error("certificate {which} does not verify: {source}")]
    Certificate {
        which: u8,
        #[source]
        source: QcError,
    },
}

/// Errors that end a safety-fault run.
#[derive(Debug, Error)]
pub enum SafetyError {
    /// The finder's own evidence does not hold up.
    #[error("invalid evidence: {0}")]
    InvalidEvidence(#[from] EvidenceError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("ordering error: {0}")]
    Bft(#[from] BftError),
}

/// Errors that end a reconfiguration run.
#[derive(Debug, Error)]
pub enum ReconfigError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}
