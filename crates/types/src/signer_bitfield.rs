//! Bitfield for tracking which nodes have signed.

use bincode::{Decode, Encode};
use std::fmt;

/// A compact bitfield representing which nodes have signed.
///
/// Used in [`QuorumCertificate`](crate::QuorumCertificate) to record whose
/// keys make up the aggregate, and in reconfiguration to describe a proposed
/// node set. Indices are shard-local or global depending on the key table the
/// caller pairs it with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Encode, Decode)]
pub struct SignerBitfield {
    /// The bitfield bytes.
    bits: Vec<u8>,
    /// Number of nodes (bits that are valid).
    num_nodes: usize,
}

impl SignerBitfield {
    /// Create a new empty bitfield for the given number of nodes.
    pub fn new(num_nodes: usize) -> Self {
        let num_bytes = num_nodes.div_ceil(8);
        Self {
            bits: vec![0u8; num_bytes],
            num_nodes,
        }
    }

    /// Create a bitfield with the given indices set.
    ///
    /// Indices at or beyond `num_nodes` are ignored.
    pub fn from_indices(num_nodes: usize, indices: impl IntoIterator<Item = usize>) -> Self {
        let mut bf = Self::new(num_nodes);
        for index in indices {
            bf.set(index);
        }
        bf
    }

    /// Create an empty bitfield.
    pub fn empty() -> Self {
        Self {
            bits: Vec::new(),
            num_nodes: 0,
        }
    }

    /// Set a bit (mark node as having signed).
    pub fn set(&mut self, index: usize) {
        if index < self.num_nodes {
            let byte_idx = index / 8;
            let bit_idx = index % 8;
            self.bits[byte_idx] |= 1 << bit_idx;
        }
    }

    /// Check if a bit is set.
    pub fn is_set(&self, index: usize) -> bool {
        if index >= self.num_nodes {
            return false;
        }
        let byte_idx = index / 8;
        let bit_idx = index % 8;
        if byte_idx >= self.bits.len() {
            return false;
        }
        (self.bits[byte_idx] >> bit_idx) & 1 == 1
    }

    /// Count the number of set bits.
    pub fn count_ones(&self) -> usize {
        self.bits.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Get the number of nodes this bitfield can represent.
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Get iterator over indices of set bits, in ascending order.
    ///
    /// Walks the stored bytes, not `0..num_nodes`.
    pub fn set_indices(&self) -> impl Iterator<Item = usize> + '_ {
        let num_nodes = self.num_nodes;
        self.bits
            .iter()
            .enumerate()
            .flat_map(|(byte_idx, &byte)| {
                (0..8usize)
                    .filter(move |bit| (byte >> bit) & 1 == 1)
                    .map(move |bit| byte_idx * 8 + bit)
            })
            .filter(move |&i| i < num_nodes)
    }

    /// Whether the byte length matches `num_nodes` and no bit is set past it.
    ///
    /// Always true for bitfields built locally; decoded ones must be checked
    /// before their node count is trusted.
    pub fn is_well_formed(&self) -> bool {
        if self.bits.len() != self.num_nodes.div_ceil(8) {
            return false;
        }
        match (self.num_nodes % 8, self.bits.last()) {
            (0, _) | (_, None) => true,
            (used, Some(&last)) => last >> used == 0,
        }
    }

    /// Check if the bitfield is empty (no bits set).
    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&b| b == 0)
    }

    /// Indices set in both `self` and `other`.
    pub fn intersection(&self, other: &SignerBitfield) -> SignerBitfield {
        let num_nodes = self.num_nodes.min(other.num_nodes);
        SignerBitfield::from_indices(num_nodes, self.set_indices().filter(|&i| other.is_set(i)))
    }

    /// Canonical byte form: node count (u32 little-endian) followed by the bits.
    ///
    /// Used wherever a node set is part of a signed message.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.bits.len());
        out.extend_from_slice(&(self.num_nodes as u32).to_le_bytes());
        out.extend_from_slice(&self.bits);
        out
    }
}

impl Default for SignerBitfield {
    fn default() -> Self {
        Self::empty()
    }
}

/// Renders as `{i,j,...}`.
impl fmt::Display for SignerBitfield {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let indices: Vec<String> = self.set_indices().map(|i| i.to_string()).collect();
        write!(f, "{{{}}}", indices.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitfield_basic() {
        let mut bf = SignerBitfield::new(10);

        assert!(!bf.is_set(0));
        assert!(!bf.is_set(5));

        bf.set(0);
        bf.set(5);
        bf.set(9);

        assert!(bf.is_set(0));
        assert!(bf.is_set(5));
        assert!(bf.is_set(9));
        assert!(!bf.is_set(1));
        assert!(!bf.is_set(10)); // Out of bounds

        assert_eq!(bf.count_ones(), 3);
    }

    #[test]
    fn test_set_indices() {
        let bf = SignerBitfield::from_indices(10, [7, 1, 4, 12]);

        let indices: Vec<_> = bf.set_indices().collect();
        assert_eq!(indices, vec![1, 4, 7]);
    }

    #[test]
    fn test_empty_bitfield() {
        let bf = SignerBitfield::empty();
        assert!(bf.is_empty());
        assert_eq!(bf.num_nodes(), 0);
        assert!(!bf.is_set(0));
    }

    #[test]
    fn test_intersection() {
        let a = SignerBitfield::from_indices(7, [1, 2, 3]);
        let b = SignerBitfield::from_indices(7, [2, 3, 4]);

        let both = a.intersection(&b);
        assert_eq!(both.set_indices().collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(both.to_string(), "{2,3}");

        let disjoint = SignerBitfield::from_indices(7, [5, 6]);
        assert!(a.intersection(&disjoint).is_empty());
        assert_eq!(a.intersection(&disjoint).to_string(), "{}");
    }

    #[test]
    fn test_well_formed() {
        assert!(SignerBitfield::new(10).is_well_formed());
        assert!(SignerBitfield::from_indices(8, [7]).is_well_formed());
        assert!(SignerBitfield::empty().is_well_formed());

        // Bit 4 is past the end of a 4-node field.
        let stray = SignerBitfield {
            bits: vec![0b1_0001],
            num_nodes: 4,
        };
        assert!(!stray.is_well_formed());
        assert_eq!(stray.set_indices().collect::<Vec<_>>(), vec![0]);

        let short = SignerBitfield {
            bits: vec![0b11],
            num_nodes: 1 << 40,
        };
        assert!(!short.is_well_formed());
    }

    #[test]
    fn test_oversized_node_count_is_cheap_to_walk() {
        let config = bincode::config::standard();
        let wire = bincode::encode_to_vec((vec![0b11u8], 1usize << 40), config).unwrap();
        let (bf, _): (SignerBitfield, usize) = bincode::decode_from_slice(&wire, config).unwrap();

        assert_eq!(bf.num_nodes(), 1 << 40);
        assert!(!bf.is_well_formed());
        assert_eq!(bf.set_indices().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(bf.to_string(), "{0,1}");
    }

    #[test]
    fn test_to_bytes_distinguishes_sizes() {
        let a = SignerBitfield::from_indices(4, [0]);
        let b = SignerBitfield::from_indices(5, [0]);
        assert_ne!(a.to_bytes(), b.to_bytes());
    }
}
