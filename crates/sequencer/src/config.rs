//! Configuration for the Kronos roles.

use kronos_types::Topology;

/// Quorum thresholds and epoch numbering for the sequencer.
///
/// By default the outbound role waits for `N * (M / 3)` TXs_Inform senders
/// and the inbound role for `2 * M / 3` InputBFT_Result senders, both with
/// integer division. Either can be overridden, which deterministic tests use
/// to wait for every node.
#[derive(Debug, Clone)]
pub struct KronosConfig {
    /// Overrides the TXs_Inform sender threshold.
    pub inform_threshold: Option<usize>,

    /// Overrides the InputBFT_Result sender threshold.
    pub result_threshold: Option<usize>,

    /// Epoch assigned to the first batch.
    pub first_epoch: u32,
}

impl Default for KronosConfig {
    fn default() -> Self {
        Self {
            inform_threshold: None,
            result_threshold: None,
            first_epoch: 1,
        }
    }
}

impl KronosConfig {
    /// Set the TXs_Inform sender threshold.
    pub fn with_inform_threshold(mut self, threshold: usize) -> Self {
        self.inform_threshold = Some(threshold);
        self
    }

    /// Set the InputBFT_Result sender threshold.
    pub fn with_result_threshold(mut self, threshold: usize) -> Self {
        self.result_threshold = Some(threshold);
        self
    }

    /// Wait for every node of the committee at both gates.
    pub fn wait_for_all(topology: &dyn Topology) -> Self {
        let all = topology.total_nodes();
        Self::default()
            .with_inform_threshold(all)
            .with_result_threshold(all)
    }

    /// Set the first epoch number.
    pub fn with_first_epoch(mut self, epoch: u32) -> Self {
        self.first_epoch = epoch;
        self
    }

    /// Effective TXs_Inform threshold for `topology`.
    pub fn inform_threshold(&self, topology: &dyn Topology) -> usize {
        self.inform_threshold.unwrap_or_else(|| {
            topology.nodes_per_shard() as usize * (topology.num_shards() as usize / 3)
        })
    }

    /// Effective InputBFT_Result threshold for `topology`.
    pub fn result_threshold(&self, topology: &dyn Topology) -> usize {
        self.result_threshold
            .unwrap_or_else(|| topology.num_shards() as usize * 2 / 3)
    }
}
