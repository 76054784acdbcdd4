//! Equivocation evidence for exercising the safety-fault protocol.
//!
//! Picks two independent random `2F+1` subsets of a shard, has each subset
//! sign one of two conflicting claims at the same height and aggregates the
//! signatures into an [`NsFixture`].

use kronos_accountability::NsFixture;
use kronos_types::{
    signing, ClaimValue, Height, KeyPair, QcError, QuorumCertificate, ShardId, Signature,
    SignerBitfield,
};
use rand::seq::index::sample;
use rand::Rng;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum EvidenceMakerError {
    #[error("quorum of {quorum} exceeds the {nodes} nodes of the shard")]
    QuorumTooLarge { quorum: usize, nodes: usize },

    #[error("both claims are equal")]
    IdenticalClaims,

    #[error("failed to certify claim: {0}")]
    Certificate(#[from] QcError),
}

/// Build equivocation evidence against `shard`.
///
/// `shard_keys` are the shard's signing keys ordered by local index.
pub fn make_evidence(
    shard_keys: &[KeyPair],
    shard: ShardId,
    height: Height,
    claim1: &ClaimValue,
    claim2: &ClaimValue,
    fault_bound: usize,
    rng: &mut impl Rng,
) -> Result<NsFixture, EvidenceMakerError> {
    let quorum = 2 * fault_bound + 1;
    if quorum > shard_keys.len() {
        return Err(EvidenceMakerError::QuorumTooLarge {
            quorum,
            nodes: shard_keys.len(),
        });
    }
    if claim1 == claim2 {
        return Err(EvidenceMakerError::IdenticalClaims);
    }

    let signers1 = pick_signers(rng, shard_keys.len(), quorum);
    let signers2 = pick_signers(rng, shard_keys.len(), quorum);

    let certificate1 = certify(shard_keys, &signers1, signing::claim_message(height, claim1))?;
    let certificate2 = certify(shard_keys, &signers2, signing::claim_message(height, claim2))?;
    info!(
        shard = shard.0,
        height = height.0,
        signers1 = %certificate1.signers,
        signers2 = %certificate2.signers,
        "Built equivocation evidence"
    );

    Ok(NsFixture {
        shard: shard.0,
        height: height.0,
        claim1: claim1.clone(),
        claim2: claim2.clone(),
        aggregated_signature1: certificate1.aggregated_signature,
        aggregated_signature2: certificate2.aggregated_signature,
        signers1,
        signers2,
    })
}

fn pick_signers(rng: &mut impl Rng, nodes: usize, quorum: usize) -> Vec<usize> {
    let mut signers = sample(rng, nodes, quorum).into_vec();
    signers.sort_unstable();
    signers
}

fn certify(
    shard_keys: &[KeyPair],
    signers: &[usize],
    message: Vec<u8>,
) -> Result<QuorumCertificate, QcError> {
    let signatures: Vec<Signature> = signers.iter().map(|&i| shard_keys[i].sign(&message)).collect();
    let bitfield = SignerBitfield::from_indices(shard_keys.len(), signers.iter().copied());
    let certificate = QuorumCertificate::aggregate(message, bitfield, &signatures)?;
    let keys: Vec<_> = shard_keys.iter().map(KeyPair::public_key).collect();
    certificate.verify(&keys)?;
    Ok(certificate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn keys(n: u8) -> Vec<KeyPair> {
        (0..n).map(|i| KeyPair::from_seed(&[i + 1; 32])).collect()
    }

    #[test]
    fn test_evidence_certificates_verify() {
        let keys = keys(7);
        let public: Vec<_> = keys.iter().map(KeyPair::public_key).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        let fixture = make_evidence(
            &keys,
            ShardId(1),
            Height(5),
            &1u32.into(),
            &2u32.into(),
            2,
            &mut rng,
        )
        .unwrap();

        assert_eq!(fixture.signers1.len(), 5);
        assert_eq!(fixture.signers2.len(), 5);
        assert!(fixture.signers1.windows(2).all(|w| w[0] < w[1]));
        let (c1, c2) = fixture.certificates(7);
        c1.verify(&public).unwrap();
        c2.verify(&public).unwrap();
        // Two 5-of-7 sets always overlap.
        assert!(!c1.signers.intersection(&c2.signers).is_empty());
    }

    #[test]
    fn test_rejects_oversized_quorum() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let err = make_evidence(&keys(4), ShardId(0), Height(1), &1u32.into(), &2u32.into(), 2, &mut rng)
            .unwrap_err();
        assert!(matches!(
            err,
            EvidenceMakerError::QuorumTooLarge { quorum: 5, nodes: 4 }
        ));
    }
}
