//! Inbound role: the shard as an output-shard committer.
//!
//! Per epoch `e`:
//!
//! 1. Take the next batch of new cross-shard records, group them by input
//!    shard and send every shard its group in TXs_Inform(e).
//! 2. Collect InputBFT_Result(e) until the sender threshold is met, pooling
//!    each record under the sender's shard. Records that list this shard as
//!    an input were already emitted by the outbound role and are not pooled.
//! 3. Drain the records all of whose input shards reported, order them with
//!    the intra-shard BFT and emit the result.

use crate::{EpochOutput, EpochReport, KronosConfig, KronosError, Role};
use kronos_core::{receive, shard_broadcast_payload, IntraShardBft, Transport};
use kronos_mempool::{categorize_by_input_shard, TransactionPool};
use kronos_messages::{InputBftResult, TxsInform};
use kronos_types::{Classification, QuorumTracker, Record, RoundId, ShardId, Topology};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Round tag of the inbound BFT pass.
pub const OUTPUT_BFT_TAG: &[u8] = b"output";

/// The inbound half of a node's sequencer. Owns the transaction pool.
pub struct InboundRole {
    topology: Arc<dyn Topology>,
    transport: Arc<dyn Transport>,
    bft: Arc<dyn IntraShardBft>,
    config: KronosConfig,
    pool: TransactionPool,
}

impl InboundRole {
    pub fn new(
        topology: Arc<dyn Topology>,
        transport: Arc<dyn Transport>,
        bft: Arc<dyn IntraShardBft>,
        config: KronosConfig,
    ) -> Self {
        Self {
            topology,
            transport,
            bft,
            config,
            pool: TransactionPool::new(),
        }
    }

    /// Run one epoch per batch received on `batches` until it closes.
    pub async fn run(
        mut self,
        mut batches: mpsc::Receiver<Vec<Record>>,
        output: mpsc::UnboundedSender<EpochOutput>,
    ) -> Result<(), KronosError> {
        let mut epoch = self.config.first_epoch;
        while let Some(new_records) = batches.recv().await {
            let out = self.run_epoch(epoch, new_records).await?;
            if output.send(out).is_err() {
                debug!(epoch, "Output receiver dropped; stopping inbound role");
                break;
            }
            epoch += 1;
        }
        if !self.pool.is_empty() {
            warn!(
                pending = self.pool.pending_len(),
                "Inbound role stopped with incomplete cross-shard records"
            );
        }
        Ok(())
    }

    /// Sequence one epoch.
    pub async fn run_epoch(
        &mut self,
        epoch: u32,
        new_records: Vec<Record>,
    ) -> Result<EpochOutput, KronosError> {
        let started = Instant::now();
        let round = RoundId::epoch(epoch);

        let mut groups = categorize_by_input_shard(&new_records);
        for shard in self.topology.shards() {
            let records = groups.remove(&shard).unwrap_or_default();
            debug!(epoch, to = shard.0, records = records.len(), "Sending TXs_Inform");
            shard_broadcast_payload::<_, KronosError>(
                self.transport.as_ref(),
                round.clone(),
                self.topology.local_node(),
                &TxsInform::new(records),
                shard,
            )
            .await?;
        }

        self.collect_results(epoch, &round).await?;

        let ready = self.pool.check_and_remove_transactions();
        debug!(
            epoch,
            ready = ready.len(),
            pending = self.pool.pending_len(),
            "Submitting inbound batch"
        );
        let records = self
            .bft
            .run(RoundId::tagged(OUTPUT_BFT_TAG, epoch), ready)
            .await?;

        let cross_shard = records
            .iter()
            .filter(|r| matches!(r.classify(), Ok(Classification::CrossShard { .. })))
            .count();
        let report = EpochReport {
            epoch,
            role: Role::Inbound,
            records: records.len(),
            internal: records.len() - cross_shard,
            cross_shard,
            elapsed: started.elapsed(),
        };
        info!(
            epoch,
            shard = self.topology.local_shard().0,
            records = report.records,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Inbound epoch committed"
        );
        Ok(EpochOutput { report, records })
    }

    /// Pending cross-shard records still waiting for input shards.
    pub fn pool(&self) -> &TransactionPool {
        &self.pool
    }

    /// Collect InputBFT_Result messages until enough distinct senders
    /// reported, pooling every record under the sender's shard.
    async fn collect_results(&mut self, epoch: u32, round: &RoundId) -> Result<(), KronosError> {
        let mut tracker = QuorumTracker::new(self.config.result_threshold(self.topology.as_ref()));
        loop {
            let (sender, result) =
                receive::<InputBftResult, KronosError>(self.transport.as_ref(), round).await?;
            if tracker.insert(sender, ()) {
                let from_shard = self.topology.shard_of(sender);
                debug!(
                    epoch,
                    from = sender.0,
                    shard = from_shard.0,
                    records = result.records.len(),
                    "Received InputBFT_Result"
                );
                let local_shard = self.topology.local_shard();
                for record in result.records {
                    if lists_input_shard(&record, local_shard) {
                        trace!(epoch, from = sender.0, "Skipping record already emitted as outbound");
                        continue;
                    }
                    if let Err(e) = self.pool.add_transaction(record, from_shard) {
                        warn!(epoch, from = sender.0, error = %e, "Rejected pooled record");
                    }
                }
            } else {
                debug!(epoch, from = sender.0, "Ignoring duplicate InputBFT_Result");
            }
            if tracker.is_complete() {
                return Ok(());
            }
        }
    }
}

/// Whether `shard` is one of the record's input shards.
fn lists_input_shard(record: &Record, shard: ShardId) -> bool {
    record
        .details()
        .is_ok_and(|details| details.input_shards.contains(&shard))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kronos_messages::{Message, MessageType};
    use kronos_test_helpers::{RecordingBft, ScriptedTransport, TestCommittee};
    use kronos_types::test_utils::test_cross_record;
    use kronos_types::NodeId;

    fn result(epoch: u32, sender: u32, records: Vec<Record>) -> Message {
        Message::encapsulate(RoundId::epoch(epoch), NodeId(sender), &InputBftResult::new(records))
            .unwrap()
    }

    #[tokio::test]
    async fn test_inbound_epoch_informs_and_drains() {
        // N = 2, M = 3; node 4 sits in shard 2.
        let committee = TestCommittee::new(2, 0, 3);
        let topology = committee.topology(4).into_arc();
        let transport = Arc::new(ScriptedTransport::new());
        let bft = Arc::new(RecordingBft::new());
        let config = KronosConfig::default().with_result_threshold(3);

        let both = test_cross_record("both", &[0, 1], 2);
        let only0 = test_cross_record("only0", &[0], 2);
        let missing1 = test_cross_record("missing1", &[1], 2);

        // Shard 0 (nodes 0, 1) reports both and only0; shard 1 (node 2) both.
        transport.inject(result(1, 0, vec![both.clone(), only0.clone()]));
        transport.inject(result(1, 0, vec![missing1.clone()]));
        transport.inject(result(1, 2, vec![both.clone()]));
        transport.inject(result(1, 1, vec![]));

        let mut role = InboundRole::new(topology, transport.clone(), bft.clone(), config);
        let out = role
            .run_epoch(1, vec![both.clone(), only0.clone()])
            .await
            .unwrap();

        assert_eq!(out.records, vec![both.clone(), only0.clone()]);
        assert_eq!(out.report.cross_shard, 2);
        assert_eq!(bft.calls()[0].0, RoundId::tagged(OUTPUT_BFT_TAG, 1));
        assert!(role.pool().is_empty());

        // TXs_Inform went to every shard, grouped by input shard.
        let sent = transport.shard_sent();
        assert_eq!(sent.len(), 3);
        let by_shard: Vec<(ShardId, Vec<Record>)> = sent
            .into_iter()
            .map(|(m, s)| {
                assert_eq!(m.message_type(), MessageType::TxsInform);
                (s, m.decapsulate::<TxsInform>().unwrap().records)
            })
            .collect();
        assert_eq!(by_shard[0], (ShardId(0), vec![both.clone(), only0]));
        assert_eq!(by_shard[1], (ShardId(1), vec![both]));
        assert_eq!(by_shard[2], (ShardId(2), vec![]));
    }

    #[tokio::test]
    async fn test_incomplete_records_wait_in_pool() {
        let committee = TestCommittee::new(2, 0, 3);
        let topology = committee.topology(4).into_arc();
        let transport = Arc::new(ScriptedTransport::new());
        let bft = Arc::new(RecordingBft::new());
        let config = KronosConfig::default().with_result_threshold(1);

        let both = test_cross_record("both", &[0, 1], 2);
        transport.inject(result(1, 0, vec![both.clone()]));
        transport.inject(result(2, 3, vec![both.clone()]));

        let mut role = InboundRole::new(topology, transport.clone(), bft.clone(), config);
        let first = role.run_epoch(1, vec![]).await.unwrap();
        assert!(first.records.is_empty());
        assert_eq!(role.pool().pending_len(), 1);

        let second = role.run_epoch(2, vec![]).await.unwrap();
        assert_eq!(second.records, vec![both]);
        assert!(role.pool().is_empty());
    }

    #[tokio::test]
    async fn test_records_with_local_input_are_not_pooled() {
        // N = 2, M = 2; node 0 sits in shard 0, the output shard.
        let committee = TestCommittee::new(2, 0, 2);
        let topology = committee.topology(0).into_arc();
        let transport = Arc::new(ScriptedTransport::new());
        let bft = Arc::new(RecordingBft::new());
        let config = KronosConfig::default().with_result_threshold(2);

        // Shard 0's outbound role emits this itself and reports nothing.
        let spanning = test_cross_record("spanning", &[1, 0], 0);
        let remote = test_cross_record("remote", &[1], 0);
        transport.inject(result(1, 2, vec![spanning.clone(), remote.clone()]));
        transport.inject(result(1, 0, vec![]));
        for epoch in 2..=3 {
            transport.inject(result(epoch, 2, vec![spanning.clone()]));
            transport.inject(result(epoch, 0, vec![]));
        }

        let mut role = InboundRole::new(topology, transport.clone(), bft.clone(), config);
        let first = role.run_epoch(1, vec![spanning.clone()]).await.unwrap();
        assert_eq!(first.records, vec![remote.clone()]);
        for epoch in 2..=3 {
            let out = role.run_epoch(epoch, vec![]).await.unwrap();
            assert!(out.records.is_empty());
        }
        assert!(role.pool().is_empty());
    }
}
