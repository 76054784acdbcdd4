//! Safety-fault protocol (NS).
//!
//! Evidence is two certificates of the accused shard at the same height
//! over different claims. Their signer intersection is the culpable set:
//! those nodes signed both. Three roles take part:
//!
//! - the finder (local index 0 of the accused shard) checks its own
//!   evidence, broadcasts it, then signs and broadcasts its choice of the
//!   first claim;
//! - intra-shard helpers check the broadcast evidence and broadcast their
//!   own choice;
//! - cross-shard helpers check the evidence and wait for `F+1` choices from
//!   the accused shard.
//!
//! Every role ends by committing `<NS BadNodes {i,j} Choice A1>` through the
//! committee-wide ordering service.

use crate::{protocol_round, EvidenceError, NsFixture, Participant, SafetyError, PROTOCOL_EPOCH};
use kronos_core::{broadcast_payload, receive, IntraShardBft};
use kronos_messages::{NoSafety, NsChoice};
use kronos_types::{
    signing, ClaimValue, Height, NodeId, QuorumTracker, Record, RoundId, ShardId, SignerBitfield,
    Topology,
};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Round tag of the committee-wide commit.
pub const SAFETY_BFT_TAG: &[u8] = b"ns";

/// Local index of the finder within the accused shard.
pub const FINDER_INDEX: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NsRole {
    Finder,
    HelperIntra,
    HelperCross,
}

impl fmt::Display for NsRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NsRole::Finder => write!(f, "finder"),
            NsRole::HelperIntra => write!(f, "helper-intra"),
            NsRole::HelperCross => write!(f, "helper-cross"),
        }
    }
}

/// Result of a completed NS run on one node.
#[derive(Debug, Clone)]
pub struct SafetyOutcome {
    pub role: NsRole,
    /// Shard-local indices that signed both claims.
    pub bad_nodes: SignerBitfield,
    pub record: Record,
    pub committed: Vec<Record>,
    pub elapsed: Duration,
}

impl SafetyOutcome {
    /// An empty culpable set means the certificates did not overlap, which
    /// an honest `2F+1` quorum pair cannot produce.
    pub fn is_abnormal(&self) -> bool {
        self.bad_nodes.is_empty()
    }
}

/// The committed form of a safety report.
pub fn safety_record(bad_nodes: &SignerBitfield, choice: &ClaimValue) -> Record {
    Record::new(format!("<NS BadNodes {} Choice {}>", bad_nodes, choice))
}

/// Check equivocation evidence against the accused shard's keys and
/// return the culpable set.
pub fn verify_evidence(
    topology: &dyn Topology,
    evidence: &NoSafety,
) -> Result<SignerBitfield, EvidenceError> {
    if !topology.contains_shard(evidence.shard) {
        return Err(EvidenceError::UnknownShard(evidence.shard));
    }
    let (claim1, claim2) = (evidence.claim1(), evidence.claim2());
    if claim1 == claim2 {
        return Err(EvidenceError::IdenticalClaims);
    }

    let keys = topology.shard_key_table(evidence.shard);
    let quorum = topology.shard_quorum();
    for (which, claim, certificate) in [
        (1, &claim1, &evidence.certificate1),
        (2, &claim2, &evidence.certificate2),
    ] {
        if certificate.claim != signing::claim_message(evidence.height, claim) {
            return Err(EvidenceError::ClaimMismatch { which });
        }
        if certificate.signer_count() < quorum {
            return Err(EvidenceError::BelowQuorum {
                which,
                signers: certificate.signer_count(),
                quorum,
            });
        }
        certificate
            .verify(&keys)
            .map_err(|source| EvidenceError::Certificate { which, source })?;
    }

    Ok(evidence
        .certificate1
        .signers
        .intersection(&evidence.certificate2.signers))
}

/// One node's NS instance.
pub struct SafetyProtocol {
    participant: Participant,
    bft: Arc<dyn IntraShardBft>,
}

impl SafetyProtocol {
    /// `bft` must be the committee-wide ordering service.
    pub fn new(participant: Participant, bft: Arc<dyn IntraShardBft>) -> Self {
        Self { participant, bft }
    }

    /// The role this node plays against the shard named in `fixture`.
    pub fn role(&self, fixture: &NsFixture) -> NsRole {
        let topology = self.topology();
        if topology.local_shard() != fixture.shard_id() {
            NsRole::HelperCross
        } else if topology.local_index() == FINDER_INDEX {
            NsRole::Finder
        } else {
            NsRole::HelperIntra
        }
    }

    pub async fn run(&self, fixture: &NsFixture) -> Result<SafetyOutcome, SafetyError> {
        match self.role(fixture) {
            NsRole::Finder => self.run_finder(fixture).await,
            NsRole::HelperIntra => self.run_helper_intra(fixture).await,
            NsRole::HelperCross => self.run_helper_cross(fixture).await,
        }
    }

    pub async fn run_finder(&self, fixture: &NsFixture) -> Result<SafetyOutcome, SafetyError> {
        let started = Instant::now();
        let (certificate1, certificate2) = fixture.certificates(self.topology().nodes_per_shard());
        let evidence = NoSafety::new(
            fixture.shard_id(),
            fixture.height(),
            &fixture.claim1,
            &fixture.claim2,
            certificate1,
            certificate2,
        );
        let bad_nodes = verify_evidence(self.topology(), &evidence)?;
        info!(
            node = self.local_node().0,
            shard = fixture.shard,
            height = fixture.height,
            %bad_nodes,
            "Starting NS finder"
        );

        broadcast_payload::<_, SafetyError>(
            self.participant.transport.as_ref(),
            protocol_round(),
            self.local_node(),
            &evidence,
        )
        .await?;
        self.broadcast_choice(evidence.shard, evidence.height, &fixture.claim1)
            .await?;
        self.commit(NsRole::Finder, bad_nodes, &fixture.claim1, started)
            .await
    }

    pub async fn run_helper_intra(&self, fixture: &NsFixture) -> Result<SafetyOutcome, SafetyError> {
        let started = Instant::now();
        let (evidence, bad_nodes) = self.await_evidence(fixture).await?;
        let choice = evidence.claim1();
        self.broadcast_choice(evidence.shard, evidence.height, &choice)
            .await?;
        self.commit(NsRole::HelperIntra, bad_nodes, &choice, started)
            .await
    }

    pub async fn run_helper_cross(&self, fixture: &NsFixture) -> Result<SafetyOutcome, SafetyError> {
        let started = Instant::now();
        let (evidence, bad_nodes) = self.await_evidence(fixture).await?;
        self.await_choices(evidence.shard, evidence.height).await?;
        self.commit(NsRole::HelperCross, bad_nodes, &evidence.claim1(), started)
            .await
    }

    /// Block until valid NoSafety evidence against the fixture's shard
    /// arrives. Invalid evidence is discarded.
    async fn await_evidence(
        &self,
        fixture: &NsFixture,
    ) -> Result<(NoSafety, SignerBitfield), SafetyError> {
        loop {
            let (sender, evidence) =
                receive::<NoSafety, SafetyError>(self.participant.transport.as_ref(), &protocol_round())
                    .await?;
            if evidence.shard != fixture.shard_id() || evidence.height != fixture.height() {
                warn!(from = sender.0, "Received unexpected NoSafety");
                continue;
            }
            match verify_evidence(self.topology(), &evidence) {
                Ok(bad_nodes) => {
                    debug!(from = sender.0, %bad_nodes, "Accepted NoSafety evidence");
                    return Ok((evidence, bad_nodes));
                }
                Err(e) => warn!(from = sender.0, error = %e, "Discarding invalid NoSafety evidence"),
            }
        }
    }

    /// Block until `F+1` verified NS_Choice from members of `shard`.
    async fn await_choices(&self, shard: ShardId, height: Height) -> Result<(), SafetyError> {
        let mut tracker = QuorumTracker::new(self.topology().weak_quorum());
        loop {
            let (sender, choice) =
                receive::<NsChoice, SafetyError>(self.participant.transport.as_ref(), &protocol_round())
                    .await?;
            if choice.shard != shard || choice.height != height {
                warn!(from = sender.0, "Received unexpected NS_Choice");
                continue;
            }
            let topology = self.topology();
            let valid = topology.shard_of(sender) == shard
                && topology
                    .public_key(sender)
                    .is_some_and(|key| key.verify(&choice.signing_message(), &choice.signature));
            if !valid {
                warn!(from = sender.0, "Invalid NS_Choice signature");
                continue;
            }
            tracker.insert(sender, ());
            if tracker.is_complete() {
                debug!(choices = tracker.len(), "Received F+1 NS_Choice");
                return Ok(());
            }
        }
    }

    async fn broadcast_choice(
        &self,
        shard: ShardId,
        height: Height,
        claim: &ClaimValue,
    ) -> Result<(), SafetyError> {
        let signature = self
            .participant
            .keypair
            .sign(&signing::claim_message(height, claim));
        broadcast_payload::<_, SafetyError>(
            self.participant.transport.as_ref(),
            protocol_round(),
            self.local_node(),
            &NsChoice::new(shard, height, claim, signature),
        )
        .await
    }

    async fn commit(
        &self,
        role: NsRole,
        bad_nodes: SignerBitfield,
        choice: &ClaimValue,
        started: Instant,
    ) -> Result<SafetyOutcome, SafetyError> {
        if bad_nodes.is_empty() {
            warn!(node = self.local_node().0, %role, "Equivocation evidence has no common signers");
        }
        let record = safety_record(&bad_nodes, choice);
        let committed = self
            .bft
            .run(
                RoundId::tagged(SAFETY_BFT_TAG, PROTOCOL_EPOCH),
                vec![record.clone()],
            )
            .await?;
        let elapsed = started.elapsed();
        info!(
            node = self.local_node().0,
            %role,
            %bad_nodes,
            elapsed_ms = elapsed.as_millis() as u64,
            "NS committed"
        );
        Ok(SafetyOutcome {
            role,
            bad_nodes,
            record,
            committed,
            elapsed,
        })
    }

    fn topology(&self) -> &dyn Topology {
        self.participant.topology.as_ref()
    }

    fn local_node(&self) -> NodeId {
        self.topology().local_node()
    }
}
