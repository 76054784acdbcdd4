//! In-process Kronos cluster.
//!
//! Everything needed to run the sequencer and the accountability protocols
//! on N*M nodes inside one tokio runtime:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Cluster                             │
//! │                                                              │
//! │   node 0 ... node N*M-1   (keys, topology, participant)      │
//! │        │          │                                          │
//! │        ▼          ▼                                          │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │ LocalNetwork: one MailboxRegistry per node, messages   │  │
//! │  │ re-encoded on every hop                                │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! │  ┌──────────────────────┐   ┌──────────────────────────────┐ │
//! │  │ EchoCommittee/shard  │   │ EchoCommittee (all nodes)    │ │
//! │  │ Kronos BFT passes    │   │ NL / NS commits              │ │
//! │  └──────────────────────┘   └──────────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Given the same seed, keys and workloads are identical every run.

mod bft;
mod cluster;
pub mod evidence;
mod network;
pub mod workload;

pub use bft::{EchoBft, EchoCommittee};
pub use cluster::{Cluster, ClusterConfig, ClusterError, SequencerRun};
pub use evidence::{make_evidence, EvidenceMakerError};
pub use network::{LocalNetwork, LocalTransport, NetworkStats};
pub use workload::RecordWorkload;
