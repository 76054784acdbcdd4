//! Inbound accumulation of cross-shard records.

use indexmap::IndexMap;
use kronos_types::{Classification, Record, RecordError, ShardId};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{debug, trace};

/// Reasons a report is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("malformed record: {0}")]
    Malformed(#[from] RecordError),

    #[error("record is internal to {0}; nothing to accumulate")]
    Internal(ShardId),

    #[error("{shard} is not an input shard of the record")]
    NotAnInputShard { shard: ShardId },
}

#[derive(Debug)]
struct PoolEntry {
    expected: BTreeSet<ShardId>,
    reported: BTreeSet<ShardId>,
}

impl PoolEntry {
    fn is_complete(&self) -> bool {
        self.reported.len() == self.expected.len()
    }
}

/// Cross-shard records waiting for all their input shards.
///
/// Records are grouped by output shard and kept in first-arrival order
/// within each group. Owned by a single task; no interior locking.
#[derive(Debug, Default)]
pub struct TransactionPool {
    by_output: BTreeMap<ShardId, IndexMap<Record, PoolEntry>>,
}

impl TransactionPool {
    /// Create a new empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `originating_shard` finalized `record`.
    ///
    /// Repeated reports from the same shard are idempotent.
    pub fn add_transaction(
        &mut self,
        record: Record,
        originating_shard: ShardId,
    ) -> Result<(), PoolError> {
        let details = record.details()?;
        let output_shard = match details.classification() {
            Classification::Internal => return Err(PoolError::Internal(details.output_shard)),
            Classification::CrossShard { output_shard } => output_shard,
        };
        let expected = details.distinct_input_shards();
        if !expected.contains(&originating_shard) {
            return Err(PoolError::NotAnInputShard {
                shard: originating_shard,
            });
        }

        let entry = self
            .by_output
            .entry(output_shard)
            .or_default()
            .entry(record)
            .or_insert_with(|| PoolEntry {
                expected,
                reported: BTreeSet::new(),
            });
        entry.reported.insert(originating_shard);
        trace!(
            output_shard = output_shard.0,
            from = originating_shard.0,
            reported = entry.reported.len(),
            expected = entry.expected.len(),
            "Pooled cross-shard record"
        );
        Ok(())
    }

    /// Remove and return every record all of whose input shards reported,
    /// ordered by output shard then first arrival.
    pub fn check_and_remove_transactions(&mut self) -> Vec<Record> {
        let mut ready = Vec::new();
        for records in self.by_output.values_mut() {
            records.retain(|record, entry| {
                if entry.is_complete() {
                    ready.push(record.clone());
                    false
                } else {
                    true
                }
            });
        }
        self.by_output.retain(|_, records| !records.is_empty());

        if !ready.is_empty() {
            debug!(
                drained = ready.len(),
                pending = self.pending_len(),
                "Drained complete cross-shard records"
            );
        }
        ready
    }

    /// Number of records still waiting.
    pub fn pending_len(&self) -> usize {
        self.by_output.values().map(IndexMap::len).sum()
    }

    /// Check if the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.by_output.is_empty()
    }

    /// Records waiting for output shard `shard`, in arrival order.
    pub fn pending_for_shard(&self, shard: ShardId) -> Vec<&Record> {
        self.by_output
            .get(&shard)
            .map(|records| records.keys().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kronos_types::test_utils::test_cross_record;
    use kronos_types::NodeId;

    #[test]
    fn test_drain_after_all_inputs_report() {
        let mut pool = TransactionPool::new();
        let a = test_cross_record("a", &[0, 1], 2);
        let b = test_cross_record("b", &[0], 2);

        pool.add_transaction(a.clone(), ShardId(0)).unwrap();
        pool.add_transaction(b.clone(), ShardId(0)).unwrap();
        // a still misses shard 1.
        assert_eq!(pool.check_and_remove_transactions(), vec![b]);
        assert_eq!(pool.pending_len(), 1);

        pool.add_transaction(a.clone(), ShardId(1)).unwrap();
        assert_eq!(pool.check_and_remove_transactions(), vec![a]);
        assert!(pool.check_and_remove_transactions().is_empty());
        assert!(pool.is_empty());
    }

    #[test]
    fn test_duplicate_reports_count_once() {
        let mut pool = TransactionPool::new();
        let a = test_cross_record("a", &[0, 1], 2);

        for _ in 0..5 {
            pool.add_transaction(a.clone(), ShardId(0)).unwrap();
        }
        assert!(pool.check_and_remove_transactions().is_empty());
        assert_eq!(pool.pending_for_shard(ShardId(2)), vec![&a]);
    }

    #[test]
    fn test_drain_order() {
        let mut pool = TransactionPool::new();
        let late_low = test_cross_record("x", &[1], 0);
        let first = test_cross_record("y", &[0], 2);
        let second = test_cross_record("z", &[1], 2);

        pool.add_transaction(first.clone(), ShardId(0)).unwrap();
        pool.add_transaction(second.clone(), ShardId(1)).unwrap();
        pool.add_transaction(late_low.clone(), ShardId(1)).unwrap();

        assert_eq!(
            pool.check_and_remove_transactions(),
            vec![late_low, first, second]
        );
    }

    #[test]
    fn test_rejected_reports() {
        let mut pool = TransactionPool::new();

        assert_eq!(
            pool.add_transaction(test_cross_record("a", &[0], 2), ShardId(1)),
            Err(PoolError::NotAnInputShard { shard: ShardId(1) })
        );
        assert_eq!(
            pool.add_transaction(Record::internal("i", NodeId(0), ShardId(1)), ShardId(1)),
            Err(PoolError::Internal(ShardId(1)))
        );
        assert!(matches!(
            pool.add_transaction(Record::new("garbage"), ShardId(0)),
            Err(PoolError::Malformed(_))
        ));
        assert!(pool.is_empty());
    }
}
