//! Kronos cross-shard sequencing.
//!
//! Each node runs two independent roles as separate tokio tasks that only
//! share the network:
//!
//! - [`OutboundRole`]: this shard as an input shard. Orders local records
//!   together with the records other shards informed it about, emits what
//!   commits here and routes the rest to their output shards.
//! - [`InboundRole`]: this shard as an output shard. Informs input shards of
//!   new cross-shard records, pools their results until every input shard
//!   reported, then orders and emits the complete ones.
//!
//! Every message carries `RoundId::epoch(e)` and receives are keyed by
//! `(type, round)`, so epoch `e + 1` traffic never blocks behind epoch `e`.
//!
//! ```text
//!   local batch ─► Outbound ─► BFT("input", e) ─► emit internal + own
//!                    ▲                         └─► InputBFT_Result(e) ─┐
//!        TXs_Inform(e)                                                 │
//!                    │                                                 ▼
//!   cross batch ─► Inbound ─► pool ◄──────────────────────── InputBFT_Result(e)
//!                              └─► BFT("output", e) ─► emit
//! ```

mod config;
mod error;
mod inbound;
mod outbound;
mod report;

pub use config::KronosConfig;
pub use error::KronosError;
pub use inbound::{InboundRole, OUTPUT_BFT_TAG};
pub use outbound::{OutboundRole, INPUT_BFT_TAG};
pub use report::{EpochOutput, EpochReport, Role, ThroughputSummary};

use kronos_core::{IntraShardBft, Transport};
use kronos_types::{Record, Topology};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Capacity of the per-role input channels.
const INPUT_CHANNEL_CAPACITY: usize = 64;

/// A running sequencer: both roles of one node.
///
/// Feed one batch per epoch into each input channel; epoch outputs of both
/// roles arrive on `outputs`. Close the inputs (or call [`finish`]) to stop
/// after the last fed epoch.
///
/// [`finish`]: Sequencer::finish
pub struct Sequencer {
    /// Locally originated records, one batch per epoch.
    pub local_batches: mpsc::Sender<Vec<Record>>,
    /// New cross-shard records this shard is the output of, one batch per
    /// epoch.
    pub cross_batches: mpsc::Sender<Vec<Record>>,
    /// Epoch outputs of both roles.
    pub outputs: mpsc::UnboundedReceiver<EpochOutput>,
    outbound: JoinHandle<Result<(), KronosError>>,
    inbound: JoinHandle<Result<(), KronosError>>,
}

impl Sequencer {
    /// Spawn both roles on the current runtime.
    pub fn spawn(
        topology: Arc<dyn Topology>,
        transport: Arc<dyn Transport>,
        bft: Arc<dyn IntraShardBft>,
        config: KronosConfig,
    ) -> Self {
        let (local_tx, local_rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);
        let (cross_tx, cross_rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);
        let (output_tx, output_rx) = mpsc::unbounded_channel();

        let outbound = OutboundRole::new(
            topology.clone(),
            transport.clone(),
            bft.clone(),
            config.clone(),
        );
        let inbound = InboundRole::new(topology, transport, bft, config);

        let outbound = tokio::spawn(outbound.run(local_rx, output_tx.clone()));
        let inbound = tokio::spawn(inbound.run(cross_rx, output_tx));

        Self {
            local_batches: local_tx,
            cross_batches: cross_tx,
            outputs: output_rx,
            outbound,
            inbound,
        }
    }

    /// Close the inputs, wait for both roles and collect every output not
    /// yet taken from `outputs`.
    pub async fn finish(self) -> Result<Vec<EpochOutput>, KronosError> {
        let Sequencer {
            local_batches,
            cross_batches,
            mut outputs,
            outbound,
            inbound,
        } = self;
        drop(local_batches);
        drop(cross_batches);

        outbound
            .await
            .map_err(|_| KronosError::TaskFailed("outbound"))??;
        inbound
            .await
            .map_err(|_| KronosError::TaskFailed("inbound"))??;

        let mut collected = Vec::new();
        while let Some(out) = outputs.recv().await {
            collected.push(out);
        }
        Ok(collected)
    }
}
