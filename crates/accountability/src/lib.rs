//! Kronos accountability protocols.
//!
//! Three independent, quorum-driven protocols triggered by an operator
//! supplied claim fixture:
//!
//! - [`liveness`] (NL): a shard reports that another shard stalled; helpers
//!   certify the claim and the whole committee commits the report.
//! - [`safety`] (NS): two conflicting certificates from one shard prove
//!   equivocation; every node computes the culpable signer set and the
//!   committee commits it.
//! - [`reconfig`] (RC): a shard asks for a new node set; three quorum gates
//!   commit the new membership.
//!
//! All messages use the fixed round [`protocol_round`]; the NL and NS
//! committee-wide ordering passes use their own tagged rounds.

mod error;
pub mod fixture;
pub mod liveness;
pub mod reconfig;
pub mod safety;

pub use error::{EvidenceError, LivenessError, ReconfigError, SafetyError};
pub use fixture::{FixtureError, NlFixture, NsFixture, RcFixture};
pub use liveness::{LivenessProtocol, NlOutcome, NlRole};
pub use reconfig::{ReconfigOutcome, ReconfigProtocol, RcRole};
pub use safety::{NsRole, SafetyOutcome, SafetyProtocol};

use kronos_core::Transport;
use kronos_types::{KeyPair, RoundId, Topology};
use std::sync::Arc;

/// Epoch every accountability message is sent in.
pub const PROTOCOL_EPOCH: u32 = 1;

/// Round of every accountability message.
pub fn protocol_round() -> RoundId {
    RoundId::epoch(PROTOCOL_EPOCH)
}

/// One node's seat in an accountability protocol.
#[derive(Clone)]
pub struct Participant {
    pub topology: Arc<dyn Topology>,
    pub transport: Arc<dyn Transport>,
    pub keypair: Arc<KeyPair>,
}

impl Participant {
    pub fn new(
        topology: Arc<dyn Topology>,
        transport: Arc<dyn Transport>,
        keypair: Arc<KeyPair>,
    ) -> Self {
        Self {
            topology,
            transport,
            keypair,
        }
    }
}

impl std::fmt::Debug for Participant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Participant")
            .field("node", &self.topology.local_node())
            .finish_non_exhaustive()
    }
}
