//! Quorum certificates: a claim, who signed it, and one aggregate signature.

use crate::{AggregateError, PublicKey, Signature, SignerBitfield};
use bincode::{Decode, Encode};

/// A certificate proving that the nodes in `signers` all signed `claim`.
///
/// The bitfield cardinality is the quorum-size proof. Whether indices are
/// shard-local or global is decided by the key table passed to
/// [`verify`](Self::verify).
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct QuorumCertificate {
    /// The exact bytes that were signed.
    pub claim: Vec<u8>,

    /// Which nodes contributed to the aggregate signature.
    pub signers: SignerBitfield,

    /// BLS aggregate of the individual signatures.
    pub aggregated_signature: Signature,
}

impl QuorumCertificate {
    /// Aggregate individual signatures over `claim` into a certificate.
    ///
    /// `signatures` must be ordered like `signers.set_indices()`; aggregation
    /// itself is order independent so this only matters for auditing.
    pub fn aggregate(
        claim: Vec<u8>,
        signers: SignerBitfield,
        signatures: &[Signature],
    ) -> Result<Self, QcError> {
        if signatures.len() != signers.count_ones() {
            return Err(QcError::SignerCountMismatch {
                signers: signers.count_ones(),
                signatures: signatures.len(),
            });
        }
        let aggregated_signature = Signature::aggregate_bls(signatures)?;
        Ok(Self {
            claim,
            signers,
            aggregated_signature,
        })
    }

    /// Number of signers.
    pub fn signer_count(&self) -> usize {
        self.signers.count_ones()
    }

    /// Verify the aggregate signature against the keys at the signer indices
    /// of `key_table`, combined in ascending index order.
    ///
    /// The bitfield must be sized for exactly `key_table`.
    pub fn verify(&self, key_table: &[PublicKey]) -> Result<(), QcError> {
        if self.signers.num_nodes() != key_table.len() || !self.signers.is_well_formed() {
            return Err(QcError::MalformedSigners {
                num_nodes: self.signers.num_nodes(),
                keys: key_table.len(),
            });
        }

        let signer_keys: Vec<PublicKey> = self
            .signers
            .set_indices()
            .map(|idx| key_table[idx].clone())
            .collect();

        if signer_keys.is_empty() {
            return Err(QcError::NoSigners);
        }

        let aggregated_pubkey = PublicKey::aggregate_bls(&signer_keys)?;

        if !aggregated_pubkey.verify(&self.claim, &self.aggregated_signature) {
            return Err(QcError::InvalidSignature);
        }

        Ok(())
    }
}

/// Errors building or verifying a certificate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QcError {
    #[error("certificate has no signers")]
    NoSigners,

    #[error("signer bitfield covers {num_nodes} nodes but the key table has {keys}")]
    MalformedSigners { num_nodes: usize, keys: usize },

    #[error("{signers} signers but {signatures} signatures")]
    SignerCountMismatch { signers: usize, signatures: usize },

    #[error("aggregate signature does not verify")]
    InvalidSignature,

    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}
