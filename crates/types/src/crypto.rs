//! BLS12-381 key pairs, signatures and aggregation.
//!
//! Public keys live in G1 (48 bytes compressed) and signatures in G2
//! (96 bytes compressed), so many signatures over one claim collapse into a
//! single aggregate that verifies against the sum of the signers' keys.

use bincode::{Decode, Encode};
use std::fmt;

/// Domain separation tag for the hash-to-curve step.
const BLS_DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_NUL_";

/// A BLS key pair for signing.
#[derive(Clone)]
pub struct KeyPair(blst::min_pk::SecretKey);

impl KeyPair {
    /// Generate a new random keypair.
    pub fn generate_bls() -> Self {
        let mut ikm = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut ikm);
        Self::from_seed(&ikm)
    }

    /// Generate a keypair from a seed (for testing/simulation).
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        // key_gen only rejects input keying material shorter than 32 bytes.
        let sk = blst::min_pk::SecretKey::key_gen(seed, &[])
            .unwrap_or_else(|_| unreachable!("32-byte seed is always accepted"));
        KeyPair(sk)
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        let sig = self.0.sign(message, BLS_DST, &[]);
        Signature(sig.to_bytes().to_vec())
    }

    /// Get the public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.sk_to_pk().to_bytes().to_vec())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair({:?})", self.public_key())
    }
}

/// A BLS public key (48 bytes compressed).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode)]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    /// Wrap compressed key bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        PublicKey(bytes.into())
    }

    /// Compressed key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Verify a signature.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let pk = match blst::min_pk::PublicKey::from_bytes(&self.0) {
            Ok(pk) => pk,
            Err(_) => return false,
        };
        let sig = match blst::min_pk::Signature::from_bytes(&signature.0) {
            Ok(sig) => sig,
            Err(_) => return false,
        };
        sig.verify(true, message, BLS_DST, &[], &pk, true) == blst::BLST_ERROR::BLST_SUCCESS
    }

    /// Aggregate multiple public keys.
    ///
    /// Aggregation is point addition, so the result does not depend on the
    /// order of `pubkeys`.
    pub fn aggregate_bls(pubkeys: &[PublicKey]) -> Result<Self, AggregateError> {
        if pubkeys.is_empty() {
            return Err(AggregateError::Empty);
        }

        let bls_pks = pubkeys
            .iter()
            .map(|pk| blst::min_pk::PublicKey::from_bytes(&pk.0))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| AggregateError::Malformed)?;

        let refs: Vec<&blst::min_pk::PublicKey> = bls_pks.iter().collect();
        let agg = blst::min_pk::AggregatePublicKey::aggregate(&refs, false)
            .map_err(|_| AggregateError::AggregationFailed)?;

        Ok(PublicKey(agg.to_public_key().to_bytes().to_vec()))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = hex::encode(&self.0);
        if hex.len() < 16 {
            return write!(f, "PublicKey({})", hex);
        }
        write!(f, "PublicKey({}..{})", &hex[..8], &hex[hex.len() - 8..])
    }
}

/// A BLS signature (96 bytes compressed), individual or aggregated.
#[derive(Clone, PartialEq, Eq, Encode, Decode)]
pub struct Signature(Vec<u8>);

impl Signature {
    /// Create a zero/placeholder signature for testing.
    pub fn zero() -> Self {
        Signature(vec![0u8; 96])
    }

    /// Wrap compressed signature bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Signature(bytes.into())
    }

    /// Get signature as bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.clone()
    }

    /// Get signature as byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Aggregate multiple signatures.
    pub fn aggregate_bls(signatures: &[Signature]) -> Result<Self, AggregateError> {
        if signatures.is_empty() {
            return Err(AggregateError::Empty);
        }

        let bls_sigs = signatures
            .iter()
            .map(|s| blst::min_pk::Signature::from_bytes(&s.0))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| AggregateError::Malformed)?;

        let refs: Vec<&blst::min_pk::Signature> = bls_sigs.iter().collect();
        let agg = blst::min_pk::AggregateSignature::aggregate(&refs, true)
            .map_err(|_| AggregateError::AggregationFailed)?;

        Ok(Signature(agg.to_signature().to_bytes().to_vec()))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = hex::encode(&self.0);
        write!(f, "Signature({}..)", &hex[..hex.len().min(16)])
    }
}

/// Errors that can occur during aggregation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregateError {
    /// Empty list provided.
    #[error("Cannot aggregate empty list")]
    Empty,

    /// A key or signature did not decode to a curve point.
    #[error("Malformed key or signature bytes")]
    Malformed,

    /// Aggregation operation failed.
    #[error("Aggregation failed")]
    AggregationFailed,
}
