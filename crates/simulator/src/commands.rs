//! Subcommands of `kronos-sim`.

use anyhow::{anyhow, ensure, Context};
use clap::{Args, Parser, Subcommand};
use kronos_accountability::{NlFixture, NsFixture, RcFixture};
use kronos_sequencer::KronosConfig;
use kronos_simulation::{make_evidence, Cluster, ClusterConfig, ClusterError};
use kronos_types::{ClaimValue, Height, NodeId, ShardId, StaticTopology};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Run Kronos and its accountability protocols on an in-process cluster.
#[derive(Parser, Debug)]
#[command(name = "kronos-sim", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub cluster: ClusterArgs,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Abort a run after this many seconds
    #[arg(long, global = true, default_value_t = 60)]
    pub timeout_secs: u64,

    #[command(subcommand)]
    pub command: Command,
}

/// Shape of the simulated committee.
#[derive(Args, Debug, Clone)]
pub struct ClusterArgs {
    /// Number of shards (M)
    #[arg(short = 'm', long, global = true, default_value_t = 2)]
    pub shards: u32,

    /// Nodes per shard (N)
    #[arg(short = 'n', long, global = true, default_value_t = 4)]
    pub nodes_per_shard: u32,

    /// Intra-shard fault bound (F); defaults to the largest F with 3F < N
    #[arg(short = 'f', long, global = true)]
    pub fault_bound: Option<usize>,

    /// Seed for keys and workloads
    #[arg(long, global = true, default_value_t = 12345)]
    pub seed: u64,
}

impl ClusterArgs {
    pub fn to_config(&self) -> ClusterConfig {
        let config = ClusterConfig::new(self.shards, self.nodes_per_shard).with_seed(self.seed);
        match self.fault_bound {
            Some(f) => config.with_fault_bound(f),
            None => config,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sequence dummy records for a number of epochs
    Sequence(SequenceArgs),

    /// Run the liveness-fault protocol against an NL fixture
    Liveness(FixtureArgs),

    /// Run the safety-fault protocol against an NS fixture
    Safety(FixtureArgs),

    /// Run the reconfiguration protocol against an RC fixture
    Reconfig(FixtureArgs),

    /// Write an NS fixture signed with the cluster's keys
    Evidence(EvidenceArgs),
}

#[derive(Args, Debug)]
pub struct SequenceArgs {
    /// Number of epochs to feed
    #[arg(long, default_value_t = 5)]
    pub epochs: u32,

    /// Internal records per node and epoch
    #[arg(long, default_value_t = 100)]
    pub internal: usize,

    /// Cross-shard records per node and epoch
    #[arg(long, default_value_t = 20)]
    pub cross: usize,

    /// Wait for every node at both gates instead of the default thresholds
    #[arg(long)]
    pub wait_for_all: bool,
}

#[derive(Args, Debug)]
pub struct FixtureArgs {
    /// Path of the TOML fixture
    pub fixture: PathBuf,
}

#[derive(Args, Debug)]
pub struct EvidenceArgs {
    /// Shard accused of equivocating
    #[arg(long, default_value_t = 0)]
    pub shard: u32,

    /// Height both claims were made at
    #[arg(long, default_value_t = 1)]
    pub height: u64,

    /// First claim value
    #[arg(long)]
    pub claim1: ClaimValue,

    /// Second claim value
    #[arg(long)]
    pub claim2: ClaimValue,

    /// Where to write the fixture
    #[arg(short, long)]
    pub output: PathBuf,
}

/// Build the cluster described by `cli` and run its subcommand.
pub async fn run_cli(cli: Cli) -> anyhow::Result<()> {
    let cluster = Cluster::new(cli.cluster.to_config())?;
    let timeout = Duration::from_secs(cli.timeout_secs);

    match cli.command {
        Command::Sequence(args) => sequence(&cluster, &args, timeout).await,
        Command::Liveness(args) => liveness(&cluster, &args, timeout).await,
        Command::Safety(args) => safety(&cluster, &args, timeout).await,
        Command::Reconfig(args) => reconfig(&cluster, &args, timeout).await,
        Command::Evidence(args) => evidence(&cluster, &args),
    }
}

async fn within<T>(
    timeout: Duration,
    what: &str,
    run: impl Future<Output = Result<T, ClusterError>>,
) -> anyhow::Result<T> {
    let result = tokio::time::timeout(timeout, run)
        .await
        .map_err(|_| anyhow!("{what} did not finish within {timeout:?}"))?;
    Ok(result?)
}

fn reference_topology(cluster: &Cluster) -> anyhow::Result<StaticTopology> {
    Ok(cluster.topology(NodeId(0))?)
}

async fn sequence(cluster: &Cluster, args: &SequenceArgs, timeout: Duration) -> anyhow::Result<()> {
    let kronos = if args.wait_for_all {
        KronosConfig::wait_for_all(&reference_topology(cluster)?)
    } else {
        KronosConfig::default()
    };
    let run = within(
        timeout,
        "sequencer run",
        cluster.run_sequencer(kronos, args.epochs, args.internal, args.cross),
    )
    .await?;

    let summary = run.summary();
    let stats = cluster.network().stats();
    println!("epochs:        {}", args.epochs);
    println!("records:       {}", summary.records);
    println!("throughput:    {:.1} tps", summary.tps(run.wall_time));
    println!("mean latency:  {:?}", summary.mean_latency);
    println!("max latency:   {:?}", summary.max_latency);
    println!("messages sent: {}", stats.messages_sent);
    println!("bytes:         {}", stats.bytes_delivered);
    Ok(())
}

async fn liveness(cluster: &Cluster, args: &FixtureArgs, timeout: Duration) -> anyhow::Result<()> {
    let topology = reference_topology(cluster)?;
    let fixture = NlFixture::load(&args.fixture, &topology)
        .with_context(|| format!("loading {}", args.fixture.display()))?;

    let outcomes = within(timeout, "liveness protocol", cluster.run_liveness(&fixture)).await?;
    for (node, outcome) in cluster.nodes().zip(&outcomes) {
        println!(
            "{node} {:<6} {} ({:?})",
            outcome.role,
            outcome.record.as_str(),
            outcome.elapsed
        );
    }
    ensure!(
        outcomes.windows(2).all(|w| w[0].committed == w[1].committed),
        "nodes committed different liveness records"
    );
    Ok(())
}

async fn safety(cluster: &Cluster, args: &FixtureArgs, timeout: Duration) -> anyhow::Result<()> {
    let topology = reference_topology(cluster)?;
    let fixture = NsFixture::load(&args.fixture, &topology)
        .with_context(|| format!("loading {}", args.fixture.display()))?;

    let outcomes = within(timeout, "safety protocol", cluster.run_safety(&fixture)).await?;
    for (node, outcome) in cluster.nodes().zip(&outcomes) {
        println!(
            "{node} {:<11} {} ({:?})",
            outcome.role,
            outcome.record.as_str(),
            outcome.elapsed
        );
    }
    if outcomes.iter().any(|o| o.is_abnormal()) {
        warn!("Certificates share no signer; nobody could be blamed");
    }
    ensure!(
        outcomes.windows(2).all(|w| w[0].committed == w[1].committed),
        "nodes committed different safety records"
    );
    Ok(())
}

async fn reconfig(cluster: &Cluster, args: &FixtureArgs, timeout: Duration) -> anyhow::Result<()> {
    let topology = reference_topology(cluster)?;
    let fixture = RcFixture::load(&args.fixture, &topology)
        .with_context(|| format!("loading {}", args.fixture.display()))?;

    let outcomes = within(timeout, "reconfiguration", cluster.run_reconfig(&fixture)).await?;
    for (node, outcome) in cluster.nodes().zip(&outcomes) {
        let members: Vec<String> = outcome.members().iter().map(ToString::to_string).collect();
        println!(
            "{node} {:<7} shard {} -> [{}] ({:?})",
            outcome.role,
            outcome.shard.0,
            members.join(", "),
            outcome.elapsed
        );
    }
    Ok(())
}

fn evidence(cluster: &Cluster, args: &EvidenceArgs) -> anyhow::Result<()> {
    let topology = reference_topology(cluster)?;
    let shard = ShardId(args.shard);
    ensure!(
        args.shard < cluster.config().num_shards,
        "shard {} is out of range for {} shards",
        args.shard,
        cluster.config().num_shards
    );

    let mut rng = ChaCha8Rng::seed_from_u64(cluster.config().seed.wrapping_add(2));
    let fixture = make_evidence(
        &cluster.shard_keys(shard),
        shard,
        Height(args.height),
        &args.claim1,
        &args.claim2,
        cluster.config().fault_bound,
        &mut rng,
    )?;
    fixture.validate(&topology)?;
    fixture
        .save(&args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;

    info!(path = %args.output.display(), "Wrote evidence fixture");
    println!(
        "signers1: {:?}\nsigners2: {:?}",
        fixture.signers1, fixture.signers2
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("kronos-sim").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cluster_args_anywhere() {
        let cli = parse(&["sequence", "-m", "3", "-n", "7", "--epochs", "2", "--wait-for-all"]);
        let config = cli.cluster.to_config();
        assert_eq!(config.num_shards, 3);
        assert_eq!(config.nodes_per_shard, 7);
        assert_eq!(config.fault_bound, 2);
        match cli.command {
            Command::Sequence(args) => {
                assert_eq!(args.epochs, 2);
                assert!(args.wait_for_all);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_fault_bound_override() {
        let cli = parse(&["-f", "0", "liveness", "nl.toml"]);
        assert_eq!(cli.cluster.to_config().fault_bound, 0);
        assert!(matches!(cli.command, Command::Liveness(_)));
    }

    #[test]
    fn test_claims_parse_as_big_integers() {
        let cli = parse(&[
            "evidence",
            "--claim1",
            "340282366920938463463374607431768211457",
            "--claim2",
            "7",
            "-o",
            "ns.toml",
        ]);
        match cli.command {
            Command::Evidence(args) => {
                assert_eq!(args.claim2, ClaimValue::from(7u32));
                assert!(args.claim1 > ClaimValue::from(u128::MAX));
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(Cli::try_parse_from(["kronos-sim", "evidence", "--claim1", "-3", "--claim2", "1", "-o", "x"]).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[traced_test]
    async fn test_evidence_then_safety() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ns.toml");
        let path_arg = path.to_str().unwrap();

        run_cli(parse(&[
            "evidence", "--shard", "1", "--height", "9", "--claim1", "10", "--claim2", "20", "-o",
            path_arg,
        ]))
        .await
        .unwrap();
        assert!(path.exists());
        assert!(logs_contain("Wrote evidence fixture"));

        run_cli(parse(&["safety", path_arg])).await.unwrap();
    }

    #[tokio::test]
    async fn test_evidence_rejects_unknown_shard() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ns.toml");
        let err = run_cli(parse(&[
            "evidence",
            "--shard",
            "5",
            "--claim1",
            "1",
            "--claim2",
            "2",
            "-o",
            path.to_str().unwrap(),
        ]))
        .await
        .unwrap_err();
        assert!(err.to_string().contains("out of range"));
        assert!(!path.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sequence_small_run() {
        run_cli(parse(&[
            "sequence",
            "--epochs",
            "2",
            "--internal",
            "3",
            "--cross",
            "1",
            "--wait-for-all",
        ]))
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_missing_fixture_names_the_path() {
        let err = run_cli(parse(&["reconfig", "/nonexistent/rc.toml"]))
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/rc.toml"));
    }
}
