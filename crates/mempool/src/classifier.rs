//! Batch classification by input and output shard.
//!
//! Malformed records are logged and dropped here; nothing downstream ever
//! sees a record that does not parse.

use kronos_types::{Classification, Record, ShardId};
use std::collections::BTreeMap;
use tracing::warn;

/// Cross-shard records grouped by output shard, plus the internal ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputRouting {
    pub cross_shard: BTreeMap<ShardId, Vec<Record>>,
    pub internal: Vec<Record>,
}

/// Group records by each distinct input shard.
///
/// A record with k distinct input shards appears in k groups.
pub fn categorize_by_input_shard(records: &[Record]) -> BTreeMap<ShardId, Vec<Record>> {
    let mut groups: BTreeMap<ShardId, Vec<Record>> = BTreeMap::new();
    for record in records {
        let details = match record.details() {
            Ok(details) => details,
            Err(e) => {
                warn!(record = %record, error = %e, "Skipping malformed record");
                continue;
            }
        };
        for shard in details.distinct_input_shards() {
            groups.entry(shard).or_default().push(record.clone());
        }
    }
    groups
}

/// Split records into cross-shard groups keyed by output shard and the
/// internal list, preserving batch order within each group.
pub fn categorize_by_output_shard(records: &[Record]) -> OutputRouting {
    let mut routing = OutputRouting::default();
    for record in records {
        match record.classify() {
            Ok(Classification::Internal) => routing.internal.push(record.clone()),
            Ok(Classification::CrossShard { output_shard }) => routing
                .cross_shard
                .entry(output_shard)
                .or_default()
                .push(record.clone()),
            Err(e) => warn!(record = %record, error = %e, "Skipping malformed record"),
        }
    }
    routing
}

#[cfg(test)]
mod tests {
    use super::*;
    use kronos_types::test_utils::test_cross_record;
    use kronos_types::NodeId;
    use tracing_test::traced_test;

    #[test]
    fn test_input_categorization_fans_out() {
        let a = test_cross_record("a", &[0, 1], 2);
        let b = test_cross_record("b", &[1], 0);
        let c = test_cross_record("c", &[2, 2], 1);

        let groups = categorize_by_input_shard(&[a.clone(), b.clone(), c.clone()]);

        assert_eq!(groups[&ShardId(0)], vec![a.clone()]);
        assert_eq!(groups[&ShardId(1)], vec![a, b]);
        assert_eq!(groups[&ShardId(2)], vec![c]);
    }

    #[test]
    fn test_output_categorization() {
        let internal = Record::internal("i", NodeId(0), ShardId(1));
        let a = test_cross_record("a", &[0], 2);
        let b = test_cross_record("b", &[1], 2);
        let c = test_cross_record("c", &[2], 0);

        let routing = categorize_by_output_shard(&[a.clone(), internal.clone(), b.clone(), c.clone()]);

        assert_eq!(routing.internal, vec![internal]);
        assert_eq!(routing.cross_shard[&ShardId(2)], vec![a, b]);
        assert_eq!(routing.cross_shard[&ShardId(0)], vec![c]);
        assert!(!routing.cross_shard.contains_key(&ShardId(1)));
    }

    #[traced_test]
    #[test]
    fn test_malformed_records_are_skipped() {
        let good = test_cross_record("a", &[0], 1);
        let bad = Record::new("not a record");

        let groups = categorize_by_input_shard(&[bad.clone(), good.clone()]);
        assert_eq!(groups.len(), 1);

        let routing = categorize_by_output_shard(&[bad, good]);
        assert!(routing.internal.is_empty());
        assert_eq!(routing.cross_shard.len(), 1);
        assert!(logs_contain("Skipping malformed record"));
    }
}
