//! Dummy record workloads.
//!
//! Records carry a random alphanumeric payload and are always valid. A
//! cross-shard record consumes inputs on one to three distinct shards and
//! commits on an output shard. At least one input is another shard; a
//! configurable share of records also lists the output shard as an input.

use kronos_types::{NodeId, Record, ShardId};
use rand::distributions::Alphanumeric;
use rand::seq::index::sample;
use rand::Rng;

/// Generates dummy records for an `M`-shard committee.
#[derive(Debug, Clone)]
pub struct RecordWorkload {
    num_shards: u32,
    payload_len: usize,
    max_input_shards: usize,
    output_input_ratio: f64,
}

impl RecordWorkload {
    pub fn new(num_shards: u32) -> Self {
        Self {
            num_shards,
            payload_len: 16,
            max_input_shards: 3,
            output_input_ratio: 0.25,
        }
    }

    /// Share of cross-shard records that also list their output shard as an
    /// input. Clamped to `0.0..=1.0`.
    pub fn with_output_input_ratio(mut self, ratio: f64) -> Self {
        self.output_input_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// Set the payload length in characters.
    pub fn with_payload_len(mut self, payload_len: usize) -> Self {
        self.payload_len = payload_len;
        self
    }

    /// A record originated by `origin` that stays inside `shard`.
    pub fn internal(&self, shard: ShardId, origin: NodeId, rng: &mut impl Rng) -> Record {
        Record::internal(&self.payload(rng), origin, shard)
    }

    /// A cross-shard record committing on `output`, or `None` when the
    /// committee has a single shard.
    pub fn cross_shard_to(
        &self,
        output: ShardId,
        origin: NodeId,
        rng: &mut impl Rng,
    ) -> Option<Record> {
        let others: Vec<ShardId> = (0..self.num_shards)
            .map(ShardId)
            .filter(|s| *s != output)
            .collect();
        if others.is_empty() {
            return None;
        }
        let spans_output = rng.gen_bool(self.output_input_ratio);
        let max_others = self.max_input_shards - usize::from(spans_output);
        let count = rng.gen_range(1..=max_others.max(1)).min(others.len());
        let mut inputs: Vec<ShardId> = sample(rng, others.len(), count)
            .into_iter()
            .map(|i| others[i])
            .collect();
        if spans_output {
            let at = rng.gen_range(0..=inputs.len());
            inputs.insert(at, output);
        }
        Some(Record::cross_shard(&self.payload(rng), origin, &inputs, output))
    }

    /// A cross-shard record with a random output shard.
    pub fn cross_shard(&self, origin: NodeId, rng: &mut impl Rng) -> Option<Record> {
        let output = ShardId(rng.gen_range(0..self.num_shards.max(1)));
        self.cross_shard_to(output, origin, rng)
    }

    /// `count` internal records for `shard`.
    pub fn internal_batch(
        &self,
        shard: ShardId,
        origin: NodeId,
        count: usize,
        rng: &mut impl Rng,
    ) -> Vec<Record> {
        (0..count).map(|_| self.internal(shard, origin, rng)).collect()
    }

    /// `count` cross-shard records committing on `output`.
    pub fn cross_batch_to(
        &self,
        output: ShardId,
        origin: NodeId,
        count: usize,
        rng: &mut impl Rng,
    ) -> Vec<Record> {
        (0..count)
            .filter_map(|_| self.cross_shard_to(output, origin, rng))
            .collect()
    }

    fn payload(&self, rng: &mut impl Rng) -> String {
        rng.sample_iter(&Alphanumeric)
            .take(self.payload_len)
            .map(char::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kronos_types::Classification;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_internal_records_classify_as_internal() {
        let workload = RecordWorkload::new(4);
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        for record in workload.internal_batch(ShardId(2), NodeId(9), 20, &mut rng) {
            assert_eq!(record.classify().unwrap(), Classification::Internal);
            assert_eq!(record.details().unwrap().output_shard, ShardId(2));
        }
    }

    #[test]
    fn test_cross_shard_output_is_outside_inputs() {
        let workload = RecordWorkload::new(4).with_output_input_ratio(0.0);
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        for _ in 0..100 {
            let record = workload.cross_shard(NodeId(0), &mut rng).unwrap();
            let details = record.details().unwrap();
            let inputs = details.distinct_input_shards();
            assert!((1..=3).contains(&inputs.len()));
            assert_eq!(inputs.len(), details.input_shards.len());
            assert!(!inputs.contains(&details.output_shard));
            assert!(matches!(
                record.classify().unwrap(),
                Classification::CrossShard { .. }
            ));
        }
    }

    #[test]
    fn test_two_shards_cap_inputs_at_one() {
        let workload = RecordWorkload::new(2).with_output_input_ratio(0.0);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let batch = workload.cross_batch_to(ShardId(0), NodeId(0), 10, &mut rng);
        assert_eq!(batch.len(), 10);
        for record in batch {
            assert_eq!(record.details().unwrap().input_shards, vec![ShardId(1)]);
        }
    }

    #[test]
    fn test_output_shard_listed_as_input() {
        let workload = RecordWorkload::new(4).with_output_input_ratio(1.0);
        let mut rng = ChaCha8Rng::seed_from_u64(9);

        for record in workload.cross_batch_to(ShardId(1), NodeId(4), 50, &mut rng) {
            let details = record.details().unwrap();
            let inputs = details.distinct_input_shards();
            assert!((2..=3).contains(&inputs.len()));
            assert!(inputs.contains(&ShardId(1)));
            assert_eq!(
                record.classify().unwrap(),
                Classification::CrossShard {
                    output_shard: ShardId(1)
                }
            );
        }
    }

    #[test]
    fn test_single_shard_has_no_cross_shard_records() {
        let workload = RecordWorkload::new(1);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(workload.cross_shard(NodeId(0), &mut rng).is_none());
    }

    #[test]
    fn test_same_seed_same_workload() {
        let workload = RecordWorkload::new(3);
        let a = workload.cross_batch_to(ShardId(1), NodeId(3), 5, &mut ChaCha8Rng::seed_from_u64(42));
        let b = workload.cross_batch_to(ShardId(1), NodeId(3), 5, &mut ChaCha8Rng::seed_from_u64(42));
        assert_eq!(a, b);
    }
}
