//! Outbound role: the shard as an input-shard committer.
//!
//! Per epoch `e`:
//!
//! 1. Take the next batch of locally originated records.
//! 2. Collect TXs_Inform(e) until the sender threshold is met.
//! 3. Order local ∪ informed records with the intra-shard BFT.
//! 4. Emit internal records and cross-shard records whose output is this
//!    shard; send every output shard its records in InputBFT_Result(e).

use crate::{EpochOutput, EpochReport, KronosConfig, KronosError, Role};
use indexmap::IndexSet;
use kronos_core::{receive, shard_broadcast_payload, IntraShardBft, Transport};
use kronos_mempool::categorize_by_output_shard;
use kronos_messages::{InputBftResult, TxsInform};
use kronos_types::{QuorumTracker, Record, RoundId, Topology};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Round tag of the outbound BFT pass.
pub const INPUT_BFT_TAG: &[u8] = b"input";

/// The outbound half of a node's sequencer.
pub struct OutboundRole {
    topology: Arc<dyn Topology>,
    transport: Arc<dyn Transport>,
    bft: Arc<dyn IntraShardBft>,
    config: KronosConfig,
}

impl OutboundRole {
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
        }
    }

    /// Run one epoch per batch received on `batches` until it closes.
    pub async fn run(
        self,
        mut batches: mpsc::Receiver<Vec<Record>>,
        output: mpsc::UnboundedSender<EpochOutput>,
    ) -> Result<(), KronosError> {
        let mut epoch = self.config.first_epoch;
        while let Some(local) = batches.recv().await {
            let out = self.run_epoch(epoch, local).await?;
            if output.send(out).is_err() {
                debug!(epoch, "Output receiver dropped; stopping outbound role");
                break;
            }
            epoch += 1;
        }
        Ok(())
    }

    /// Sequence one epoch.
    pub async fn run_epoch(&self, epoch: u32, local: Vec<Record>) -> Result<EpochOutput, KronosError> {
        let started = Instant::now();
        let round = RoundId::epoch(epoch);
        let local_shard = self.topology.local_shard();

        let informed = self.collect_informs(epoch, &round).await?;

        let mut batch: IndexSet<Record> = local.into_iter().collect();
        batch.extend(informed);
        debug!(epoch, batch = batch.len(), "Submitting outbound batch");

        let decided = self
            .bft
            .run(
                RoundId::tagged(INPUT_BFT_TAG, epoch),
                batch.into_iter().collect(),
            )
            .await?;

        let mut routing = categorize_by_output_shard(&decided);
        let mut records = routing.internal;
        let internal = records.len();
        let own = routing.cross_shard.remove(&local_shard).unwrap_or_default();
        let cross_shard = own.len();
        records.extend(own);

        for shard in self.topology.shards() {
            let routed = routing.cross_shard.remove(&shard).unwrap_or_default();
            debug!(epoch, to = shard.0, records = routed.len(), "Sending InputBFT_Result");
            shard_broadcast_payload::<_, KronosError>(
                self.transport.as_ref(),
                round.clone(),
                self.topology.local_node(),
                &InputBftResult::new(routed),
                shard,
            )
            .await?;
        }

        let report = EpochReport {
            epoch,
            role: Role::Outbound,
            records: records.len(),
            internal,
            cross_shard,
            elapsed: started.elapsed(),
        };
        info!(
            epoch,
            shard = local_shard.0,
            records = report.records,
            internal = report.internal,
            cross_shard = report.cross_shard,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Outbound epoch committed"
        );
        Ok(EpochOutput { report, records })
    }

    /// Collect TXs_Inform messages until enough distinct senders reported.
    ///
    /// The threshold is checked after each receive, so even a threshold of
    /// zero consumes one message.
    async fn collect_informs(&self, epoch: u32, round: &RoundId) -> Result<Vec<Record>, KronosError> {
        let mut tracker = QuorumTracker::new(self.config.inform_threshold(self.topology.as_ref()));
        loop {
            let (sender, inform) = receive::<TxsInform, KronosError>(self.transport.as_ref(), round).await?;
            let count = inform.records.len();
            if tracker.insert(sender, inform.records) {
                debug!(epoch, from = sender.0, records = count, "Received TXs_Inform");
            } else {
                debug!(epoch, from = sender.0, "Ignoring duplicate TXs_Inform");
            }
            if tracker.is_complete() {
                break;
            }
        }

        let mut informed: IndexSet<Record> = IndexSet::new();
        for (_, records) in tracker.into_values() {
            informed.extend(records);
        }
        Ok(informed.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kronos_messages::{Message, MessageType};
    use kronos_test_helpers::{RecordingBft, ScriptedTransport, TestCommittee};
    use kronos_types::test_utils::test_cross_record;
    use kronos_types::{NodeId, ShardId};
    use tracing_test::traced_test;

    fn inform(epoch: u32, sender: u32, records: Vec<Record>) -> Message {
        Message::encapsulate(RoundId::epoch(epoch), NodeId(sender), &TxsInform::new(records)).unwrap()
    }

    #[traced_test]
    #[tokio::test]
    async fn test_outbound_epoch_routes_and_emits() {
        // N = 2, M = 3; node 0 sits in shard 0.
        let committee = TestCommittee::new(2, 0, 3);
        let topology = committee.topology(0).into_arc();
        let transport = Arc::new(ScriptedTransport::new());
        let bft = Arc::new(RecordingBft::new());
        let config = KronosConfig::default().with_inform_threshold(2);

        let to_local = test_cross_record("to-local", &[1, 0], 0);
        let to_two = test_cross_record("to-two", &[0], 2);
        let internal = Record::internal("mine", NodeId(0), ShardId(0));

        transport.inject(inform(1, 2, vec![to_two.clone()]));
        // Duplicate sender counts once.
        transport.inject(inform(1, 2, vec![to_two.clone()]));
        transport.inject(inform(1, 4, vec![to_two.clone(), to_local.clone()]));

        let role = OutboundRole::new(topology, transport.clone(), bft.clone(), config);
        let out = role.run_epoch(1, vec![internal.clone()]).await.unwrap();

        assert_eq!(out.records, vec![internal.clone(), to_local.clone()]);
        assert_eq!(out.report.internal, 1);
        assert_eq!(out.report.cross_shard, 1);

        // The BFT saw local records first, informed records deduplicated.
        let calls = bft.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, RoundId::tagged(INPUT_BFT_TAG, 1));
        assert_eq!(calls[0].1, vec![internal, to_two.clone(), to_local]);

        // One InputBFT_Result per shard, empty ones included.
        let sent = transport.shard_sent();
        assert_eq!(sent.len(), 3);
        for (message, shard) in &sent {
            assert_eq!(message.message_type(), MessageType::InputBftResult);
            let result = message.decapsulate::<InputBftResult>().unwrap();
            if *shard == ShardId(2) {
                assert_eq!(result.records, vec![to_two.clone()]);
            } else {
                assert!(result.records.is_empty());
            }
        }
        assert!(logs_contain("Ignoring duplicate TXs_Inform"));
    }

    #[tokio::test]
    async fn test_zero_threshold_still_consumes_one_inform() {
        let committee = TestCommittee::new(2, 0, 2);
        let topology = committee.topology(0).into_arc();
        let transport = Arc::new(ScriptedTransport::new());
        let bft = Arc::new(RecordingBft::new());
        let config = KronosConfig::default().with_inform_threshold(0);

        let informed = test_cross_record("x", &[0], 1);
        transport.inject(inform(1, 3, vec![informed.clone()]));
        transport.inject(inform(1, 2, vec![]));

        let role = OutboundRole::new(topology, transport.clone(), bft.clone(), config);
        role.run_epoch(1, vec![]).await.unwrap();

        assert_eq!(bft.calls()[0].1, vec![informed]);
        assert_eq!(transport.pending(MessageType::TxsInform, &RoundId::epoch(1)), 1);
    }
}
