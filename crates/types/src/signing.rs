//! Domain-separated signing for the accountability protocols.
//!
//! Every signed message is a domain tag followed by its content, so a
//! signature produced for one protocol step cannot be replayed in another.
//!
//! # Domain Tags
//!
//! | Tag | Purpose |
//! |-----|---------|
//! | `kronos_claim:` | Claims about a shard at a height (NL, NS, RC start) |
//! | `kronos_rc_check:` | Reconfiguration check over claim and new node set |
//! | `kronos_rc_epoch:` | Commitment to a new node set |

use crate::{ClaimValue, Height, SignerBitfield};

/// Domain tag for claims.
///
/// Format: `kronos_claim:` || height (u64 LE) || claim (big-endian bytes)
pub const DOMAIN_CLAIM: &[u8] = b"kronos_claim:";

/// Domain tag for reconfiguration checks.
///
/// Format: `kronos_rc_check:` || height (u64 LE) || claim length (u32 LE) || claim || node set bytes
pub const DOMAIN_RECONFIG_CHECK: &[u8] = b"kronos_rc_check:";

/// Domain tag for new-epoch commitments.
///
/// Format: `kronos_rc_epoch:` || node set bytes
pub const DOMAIN_NEW_EPOCH: &[u8] = b"kronos_rc_epoch:";

/// Build the signing message for a claim `A` at height `H`.
///
/// This is used for:
/// - NoLiveness, NL_Confirm and the NL_Response certificate
/// - Both NS evidence certificates and NS_Choice
/// - ReConfig
pub fn claim_message(height: Height, claim: &ClaimValue) -> Vec<u8> {
    let claim_bytes = claim.to_bytes_be();
    let mut message = Vec::with_capacity(DOMAIN_CLAIM.len() + 8 + claim_bytes.len());
    message.extend_from_slice(DOMAIN_CLAIM);
    message.extend_from_slice(&height.0.to_le_bytes());
    message.extend_from_slice(&claim_bytes);
    message
}

/// Build the signing message for RC_CheckOK.
pub fn reconfig_check_message(
    height: Height,
    claim: &ClaimValue,
    new_nodes: &SignerBitfield,
) -> Vec<u8> {
    let claim_bytes = claim.to_bytes_be();
    let mut message = Vec::new();
    message.extend_from_slice(DOMAIN_RECONFIG_CHECK);
    message.extend_from_slice(&height.0.to_le_bytes());
    message.extend_from_slice(&(claim_bytes.len() as u32).to_le_bytes());
    message.extend_from_slice(&claim_bytes);
    message.extend_from_slice(&new_nodes.to_bytes());
    message
}

/// Build the signing message for RC_NewEpoch.
pub fn new_epoch_message(new_nodes: &SignerBitfield) -> Vec<u8> {
    let mut message = Vec::new();
    message.extend_from_slice(DOMAIN_NEW_EPOCH);
    message.extend_from_slice(&new_nodes.to_bytes());
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_message_deterministic() {
        let claim = ClaimValue::from(12345u32);

        let msg1 = claim_message(Height(10), &claim);
        let msg2 = claim_message(Height(10), &claim);

        assert_eq!(msg1, msg2);
        assert!(msg1.starts_with(DOMAIN_CLAIM));
        assert_ne!(msg1, claim_message(Height(11), &claim));
        assert_ne!(msg1, claim_message(Height(10), &ClaimValue::from(12346u32)));
    }

    #[test]
    fn test_different_domains_produce_different_messages() {
        let nodes = SignerBitfield::from_indices(8, [1, 2]);
        let claim = ClaimValue::from(7u32);

        let check = reconfig_check_message(Height(3), &claim, &nodes);
        let epoch = new_epoch_message(&nodes);

        assert_ne!(check, epoch);
        assert!(check.starts_with(DOMAIN_RECONFIG_CHECK));
        assert!(epoch.starts_with(DOMAIN_NEW_EPOCH));
    }

    #[test]
    fn test_node_set_changes_reconfig_messages() {
        let claim = ClaimValue::from(7u32);
        let a = SignerBitfield::from_indices(8, [1, 2]);
        let b = SignerBitfield::from_indices(8, [1, 3]);

        assert_ne!(
            reconfig_check_message(Height(3), &claim, &a),
            reconfig_check_message(Height(3), &claim, &b)
        );
        assert_ne!(
            reconfig_check_message(Height(3), &claim, &a),
            reconfig_check_message(Height(4), &claim, &a)
        );
        assert_ne!(new_epoch_message(&a), new_epoch_message(&b));
    }
}
