//! A full committee wired over a [`LocalNetwork`].

use crate::{EchoCommittee, LocalNetwork, RecordWorkload};
use kronos_accountability::{
    LivenessError, LivenessProtocol, NlFixture, NlOutcome, NsFixture, Participant, RcFixture,
    ReconfigError, ReconfigOutcome, ReconfigProtocol, SafetyError, SafetyOutcome, SafetyProtocol,
};
use kronos_core::{IntraShardBft, Transport};
use kronos_sequencer::{EpochOutput, KronosConfig, KronosError, Sequencer, ThroughputSummary};
use kronos_types::{KeyPair, NodeId, PublicKey, Record, ShardId, StaticTopology, TopologyError};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("invalid topology: {0}")]
    Topology(#[from] TopologyError),

    #[error("sequencer failed: {0}")]
    Kronos(#[from] KronosError),

    #[error("liveness protocol failed: {0}")]
    Liveness(#[from] LivenessError),

    #[error("safety protocol failed: {0}")]
    Safety(#[from] SafetyError),

    #[error("reconfiguration failed: {0}")]
    Reconfig(#[from] ReconfigError),

    #[error("node task failed: {0}")]
    TaskFailed(String),
}

/// Shape of a simulated committee.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Number of shards (`M`).
    pub num_shards: u32,
    /// Nodes per shard (`N`).
    pub nodes_per_shard: u32,
    /// Intra-shard fault bound (`F`).
    pub fault_bound: usize,
    /// Seed for keys and workloads.
    pub seed: u64,
}

impl ClusterConfig {
    /// `M` shards of `N` nodes with the largest `F` such that `3F < N`.
    pub fn new(num_shards: u32, nodes_per_shard: u32) -> Self {
        Self {
            num_shards,
            nodes_per_shard,
            fault_bound: (nodes_per_shard.saturating_sub(1) / 3) as usize,
            seed: 12345,
        }
    }

    pub fn with_fault_bound(mut self, fault_bound: usize) -> Self {
        self.fault_bound = fault_bound;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn total_nodes(&self) -> u32 {
        self.num_shards * self.nodes_per_shard
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self::new(2, 4)
    }
}

/// Everything a sequencer run produced.
#[derive(Debug)]
pub struct SequencerRun {
    /// Epoch outputs of both roles, per node.
    pub outputs: BTreeMap<NodeId, Vec<EpochOutput>>,
    /// Internal records fed to each node.
    pub submitted_internal: BTreeMap<NodeId, Vec<Record>>,
    /// Cross-shard records fed to each node.
    pub submitted_cross: BTreeMap<NodeId, Vec<Record>>,
    pub wall_time: Duration,
}

impl SequencerRun {
    /// Every record `node` emitted, in emission order per role.
    pub fn emitted(&self, node: NodeId) -> Vec<Record> {
        self.outputs
            .get(&node)
            .map(|outs| outs.iter().flat_map(|o| o.records.iter().cloned()).collect())
            .unwrap_or_default()
    }

    /// Summary over the reports of every node; a record counts once per
    /// node that emitted it.
    pub fn summary(&self) -> ThroughputSummary {
        ThroughputSummary::from_reports(self.outputs.values().flatten().map(|out| &out.report))
    }
}

/// An in-process committee of `N*M` keyed nodes.
pub struct Cluster {
    config: ClusterConfig,
    keys: Vec<Arc<KeyPair>>,
    public_keys: Arc<[PublicKey]>,
    network: LocalNetwork,
    shard_committees: Vec<EchoCommittee>,
    global_committee: EchoCommittee,
}

impl Cluster {
    pub fn new(config: ClusterConfig) -> Result<Self, ClusterError> {
        if config.num_shards == 0 || config.nodes_per_shard == 0 {
            return Err(TopologyError::EmptyCommittee.into());
        }
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let keys: Vec<Arc<KeyPair>> = (0..config.total_nodes())
            .map(|_| {
                let mut seed = [0u8; 32];
                rng.fill_bytes(&mut seed);
                Arc::new(KeyPair::from_seed(&seed))
            })
            .collect();
        let public_keys: Arc<[PublicKey]> = keys.iter().map(|k| k.public_key()).collect();

        let n = config.nodes_per_shard;
        let shard_committees = (0..config.num_shards)
            .map(|s| EchoCommittee::new((s * n..(s + 1) * n).map(NodeId)))
            .collect();
        let global_committee = EchoCommittee::new((0..config.total_nodes()).map(NodeId));

        info!(
            shards = config.num_shards,
            nodes_per_shard = n,
            fault_bound = config.fault_bound,
            "Cluster created"
        );
        Ok(Self {
            network: LocalNetwork::new(config.num_shards, n),
            config,
            keys,
            public_keys,
            shard_committees,
            global_committee,
        })
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn network(&self) -> &LocalNetwork {
        &self.network
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> {
        (0..self.config.total_nodes()).map(NodeId)
    }

    pub fn topology(&self, node: NodeId) -> Result<StaticTopology, ClusterError> {
        Ok(StaticTopology::from_shared(
            node,
            self.config.nodes_per_shard,
            self.config.fault_bound,
            self.config.num_shards,
            self.public_keys.clone(),
        )?)
    }

    pub fn keypair(&self, node: NodeId) -> Option<&KeyPair> {
        self.keys.get(node.as_index()).map(Arc::as_ref)
    }

    /// Signing keys of `shard`, ordered by local index.
    pub fn shard_keys(&self, shard: ShardId) -> Vec<KeyPair> {
        let n = self.config.nodes_per_shard as usize;
        let start = shard.0 as usize * n;
        self.keys
            .iter()
            .skip(start)
            .take(n)
            .map(|k| k.as_ref().clone())
            .collect()
    }

    pub fn participant(&self, node: NodeId) -> Result<Participant, ClusterError> {
        let keypair = self
            .keys
            .get(node.as_index())
            .cloned()
            .ok_or(TopologyError::UnknownLocalNode(node))?;
        Ok(Participant::new(
            self.topology(node)?.into_arc(),
            self.transport(node),
            keypair,
        ))
    }

    fn transport(&self, node: NodeId) -> Arc<dyn Transport> {
        Arc::new(self.network.transport(node))
    }

    fn shard_bft(&self, node: NodeId) -> Arc<dyn IntraShardBft> {
        let shard = node.shard(self.config.nodes_per_shard);
        Arc::new(self.shard_committees[shard.0 as usize].member(node))
    }

    fn global_bft(&self, node: NodeId) -> Arc<dyn IntraShardBft> {
        Arc::new(self.global_committee.member(node))
    }

    /// Run `epochs` Kronos epochs on every node.
    ///
    /// Each epoch every node originates `internal_per_epoch` internal
    /// records and `cross_per_epoch` cross-shard records committing on its
    /// own shard.
    pub async fn run_sequencer(
        &self,
        kronos: KronosConfig,
        epochs: u32,
        internal_per_epoch: usize,
        cross_per_epoch: usize,
    ) -> Result<SequencerRun, ClusterError> {
        let started = Instant::now();
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed.wrapping_add(1));
        let workload = RecordWorkload::new(self.config.num_shards);

        let mut sequencers = Vec::new();
        for node in self.nodes() {
            let sequencer = Sequencer::spawn(
                self.topology(node)?.into_arc(),
                self.transport(node),
                self.shard_bft(node),
                kronos.clone(),
            );
            sequencers.push((node, sequencer));
        }

        // Batches are drawn up front so the workload does not depend on
        // scheduling. Each node gets its own feeder: a node blocked on a full
        // input channel waits for the others.
        let mut submitted_internal: BTreeMap<NodeId, Vec<Record>> = BTreeMap::new();
        let mut submitted_cross: BTreeMap<NodeId, Vec<Record>> = BTreeMap::new();
        let mut feeds: BTreeMap<NodeId, Vec<(Vec<Record>, Vec<Record>)>> = BTreeMap::new();
        for _ in 0..epochs {
            for node in self.nodes() {
                let shard = node.shard(self.config.nodes_per_shard);
                let local = workload.internal_batch(shard, node, internal_per_epoch, &mut rng);
                let cross = workload.cross_batch_to(shard, node, cross_per_epoch, &mut rng);
                submitted_internal.entry(node).or_default().extend(local.iter().cloned());
                submitted_cross.entry(node).or_default().extend(cross.iter().cloned());
                feeds.entry(node).or_default().push((local, cross));
            }
        }

        let mut feeders = Vec::new();
        for (node, sequencer) in &sequencers {
            let local_batches = sequencer.local_batches.clone();
            let cross_batches = sequencer.cross_batches.clone();
            let batches = feeds.remove(node).unwrap_or_default();
            feeders.push(async move {
                let closed = |_| KronosError::TaskFailed("sequencer input closed");
                for (local, cross) in batches {
                    local_batches.send(local).await.map_err(closed)?;
                    cross_batches.send(cross).await.map_err(closed)?;
                }
                Ok::<_, ClusterError>(())
            });
        }
        join_all(feeders.into_iter()).await?;
        debug!(epochs, "Fed every epoch to every node");

        let mut outputs = BTreeMap::new();
        for (node, sequencer) in sequencers {
            outputs.insert(node, sequencer.finish().await?);
        }

        let run = SequencerRun {
            outputs,
            submitted_internal,
            submitted_cross,
            wall_time: started.elapsed(),
        };
        let summary = run.summary();
        info!(
            epochs,
            records = summary.records,
            tps = summary.tps(run.wall_time),
            wall_ms = run.wall_time.as_millis() as u64,
            "Sequencer run finished"
        );
        Ok(run)
    }

    /// Run the liveness-fault protocol on every node.
    pub async fn run_liveness(&self, fixture: &NlFixture) -> Result<Vec<NlOutcome>, ClusterError> {
        let mut protocols = Vec::new();
        for node in self.nodes() {
            protocols.push(LivenessProtocol::new(self.participant(node)?, self.global_bft(node)));
        }
        let fixture = Arc::new(fixture.clone());
        join_all(protocols.into_iter().map(|protocol| {
            let fixture = fixture.clone();
            async move { Ok::<_, ClusterError>(protocol.run(&fixture).await?) }
        }))
        .await
    }

    /// Run the safety-fault protocol on every node.
    pub async fn run_safety(&self, fixture: &NsFixture) -> Result<Vec<SafetyOutcome>, ClusterError> {
        let mut protocols = Vec::new();
        for node in self.nodes() {
            protocols.push(SafetyProtocol::new(self.participant(node)?, self.global_bft(node)));
        }
        let fixture = Arc::new(fixture.clone());
        join_all(protocols.into_iter().map(|protocol| {
            let fixture = fixture.clone();
            async move { Ok::<_, ClusterError>(protocol.run(&fixture).await?) }
        }))
        .await
    }

    /// Run the reconfiguration protocol on every node.
    pub async fn run_reconfig(
        &self,
        fixture: &RcFixture,
    ) -> Result<Vec<ReconfigOutcome>, ClusterError> {
        let mut protocols = Vec::new();
        for node in self.nodes() {
            protocols.push(ReconfigProtocol::new(self.participant(node)?));
        }
        let fixture = Arc::new(fixture.clone());
        join_all(protocols.into_iter().map(|protocol| {
            let fixture = fixture.clone();
            async move { Ok::<_, ClusterError>(protocol.run(&fixture).await?) }
        }))
        .await
    }
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("config", &self.config)
            .field("network", &self.network.stats())
            .finish_non_exhaustive()
    }
}

/// Spawn one task per node and collect the results in node order.
async fn join_all<T, F>(tasks: impl Iterator<Item = F>) -> Result<Vec<T>, ClusterError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, ClusterError>> + Send + 'static,
{
    let mut set = JoinSet::new();
    for (index, task) in tasks.enumerate() {
        set.spawn(async move { (index, task.await) });
    }
    let mut results = Vec::with_capacity(set.len());
    while let Some(joined) = set.join_next().await {
        let (index, result) = joined.map_err(|e| ClusterError::TaskFailed(e.to_string()))?;
        results.push((index, result?));
    }
    results.sort_by_key(|(index, _)| *index);
    Ok(results.into_iter().map(|(_, outcome)| outcome).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ClusterConfig::new(3, 7);
        assert_eq!(config.fault_bound, 2);
        assert_eq!(config.total_nodes(), 21);
        assert_eq!(ClusterConfig::new(2, 1).fault_bound, 0);
    }

    #[test]
    fn test_keys_follow_seed() {
        let a = Cluster::new(ClusterConfig::new(2, 2).with_seed(9)).unwrap();
        let b = Cluster::new(ClusterConfig::new(2, 2).with_seed(9)).unwrap();
        let c = Cluster::new(ClusterConfig::new(2, 2).with_seed(10)).unwrap();

        let key = |cluster: &Cluster| cluster.keypair(NodeId(3)).unwrap().public_key();
        assert_eq!(key(&a), key(&b));
        assert_ne!(key(&a), key(&c));
        assert_eq!(a.shard_keys(ShardId(1)).len(), 2);
    }

    #[test]
    fn test_empty_committee_is_rejected() {
        assert!(matches!(
            Cluster::new(ClusterConfig::new(0, 4)),
            Err(ClusterError::Topology(TopologyError::EmptyCommittee))
        ));
    }
}
