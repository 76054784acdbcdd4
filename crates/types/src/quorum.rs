//! Distinct-sender quorum collection.

use crate::NodeId;
use std::collections::BTreeMap;

/// Collects one value per sender until a threshold of distinct senders is met.
///
/// Every wait loop in the protocols funnels accepted messages through a
/// tracker: repeated messages from the same sender are counted once and the
/// first value a sender contributed is kept.
#[derive(Debug, Clone)]
pub struct QuorumTracker<V> {
    threshold: usize,
    values: BTreeMap<NodeId, V>,
}

impl<V> QuorumTracker<V> {
    /// Create a tracker that is complete once `threshold` distinct senders
    /// have contributed.
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            values: BTreeMap::new(),
        }
    }

    /// Record a value from `sender`.
    ///
    /// Returns `false` if the sender had already contributed.
    pub fn insert(&mut self, sender: NodeId, value: V) -> bool {
        if self.values.contains_key(&sender) {
            return false;
        }
        self.values.insert(sender, value);
        true
    }

    /// Whether `sender` has contributed.
    pub fn contains(&self, sender: NodeId) -> bool {
        self.values.contains_key(&sender)
    }

    /// Number of distinct senders so far.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no sender has contributed.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The configured threshold.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Whether the threshold is reached.
    pub fn is_complete(&self) -> bool {
        self.values.len() >= self.threshold
    }

    /// Contributions in ascending sender order.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &V)> {
        self.values.iter()
    }

    /// Consume the tracker, yielding contributions in ascending sender order.
    pub fn into_values(self) -> Vec<(NodeId, V)> {
        self.values.into_iter().collect()
    }
}
