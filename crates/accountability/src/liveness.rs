//! Liveness-fault protocol (NL).
//!
//! The nodes of the reporting shard ("finders") broadcast a signed claim
//! that some shard stalled at height `H` with value `A`. Every other node
//! ("helper") collects `F+1` matching signed claims, aggregates them into a
//! certificate and sends it back to the reporting shard. A finder holding a
//! valid certificate confirms; once a helper has `F+1` confirmations the
//! whole committee commits `<NL Shard s Height H Claim A>`.
//!
//! ```text
//! finder:  NoLiveness ─► await NL_Response ─► NL_Confirm ─► global BFT
//! helper:  await F+1 NoLiveness ─► NL_Response ─► await F+1 NL_Confirm ─► global BFT
//! ```

use crate::{protocol_round, LivenessError, NlFixture, Participant, PROTOCOL_EPOCH};
use kronos_core::{broadcast_payload, receive, shard_broadcast_payload, IntraShardBft};
use kronos_messages::{NlConfirm, NlResponse, NoLiveness};
use kronos_types::{
    signing, ClaimValue, Height, NodeId, QuorumCertificate, QuorumTracker, Record, RoundId,
    ShardId, Signature, SignerBitfield, Topology,
};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Round tag of the committee-wide commit.
pub const LIVENESS_BFT_TAG: &[u8] = b"nl";

/// Which side of the protocol a node played.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NlRole {
    Finder,
    Helper,
}

impl fmt::Display for NlRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NlRole::Finder => write!(f, "finder"),
            NlRole::Helper => write!(f, "helper"),
        }
    }
}

/// Result of a completed NL run on one node.
#[derive(Debug, Clone)]
pub struct NlOutcome {
    pub role: NlRole,
    /// The report this node submitted.
    pub record: Record,
    /// What the committee committed.
    pub committed: Vec<Record>,
    pub elapsed: Duration,
}

/// The committed form of a liveness report.
pub fn liveness_record(shard: ShardId, height: Height, claim: &ClaimValue) -> Record {
    Record::new(format!(
        "<NL Shard {} Height {} Claim {}>",
        shard.0, height.0, claim
    ))
}

/// One node's NL instance.
pub struct LivenessProtocol {
    participant: Participant,
    bft: Arc<dyn IntraShardBft>,
}

impl LivenessProtocol {
    /// `bft` must be the committee-wide ordering service.
    pub fn new(participant: Participant, bft: Arc<dyn IntraShardBft>) -> Self {
        Self { participant, bft }
    }

    /// Run the finder side if this node belongs to the reporting shard,
    /// the helper side otherwise.
    pub async fn run(&self, fixture: &NlFixture) -> Result<NlOutcome, LivenessError> {
        if self.topology().local_shard() == fixture.shard_id() {
            self.run_finder(fixture).await
        } else {
            self.run_helper(fixture).await
        }
    }

    pub async fn run_finder(&self, fixture: &NlFixture) -> Result<NlOutcome, LivenessError> {
        let started = Instant::now();
        let (shard, height, claim) = (fixture.shard_id(), fixture.height(), &fixture.claim);
        let message = signing::claim_message(height, claim);
        info!(node = self.local_node().0, shard = shard.0, height = height.0, "Starting NL finder");

        let claim_msg = NoLiveness::new(shard, height, claim, self.participant.keypair.sign(&message));
        broadcast_payload::<_, LivenessError>(
            self.participant.transport.as_ref(),
            protocol_round(),
            self.local_node(),
            &claim_msg,
        )
        .await?;

        self.await_response(fixture).await?;

        let confirm = NlConfirm::new(shard, height, claim, self.participant.keypair.sign(&message));
        broadcast_payload::<_, LivenessError>(
            self.participant.transport.as_ref(),
            protocol_round(),
            self.local_node(),
            &confirm,
        )
        .await?;

        self.commit(NlRole::Finder, fixture, started).await
    }

    pub async fn run_helper(&self, fixture: &NlFixture) -> Result<NlOutcome, LivenessError> {
        let started = Instant::now();
        info!(
            node = self.local_node().0,
            shard = fixture.shard,
            height = fixture.height,
            "Starting NL helper"
        );

        let certificate = self.certify_claims(fixture).await?;
        let response = NlResponse::new(
            fixture.shard_id(),
            fixture.height(),
            &fixture.claim,
            certificate,
        );
        shard_broadcast_payload::<_, LivenessError>(
            self.participant.transport.as_ref(),
            protocol_round(),
            self.local_node(),
            &response,
            fixture.shard_id(),
        )
        .await?;

        self.await_confirms(fixture).await?;
        self.commit(NlRole::Helper, fixture, started).await
    }

    /// Block until one NL_Response with a valid certificate arrives.
    async fn await_response(&self, fixture: &NlFixture) -> Result<QuorumCertificate, LivenessError> {
        let expected = signing::claim_message(fixture.height(), &fixture.claim);
        let quorum = self.topology().weak_quorum();
        loop {
            let (sender, response) =
                receive::<NlResponse, LivenessError>(self.participant.transport.as_ref(), &protocol_round())
                    .await?;
            if response.shard != fixture.shard_id()
                || response.height != fixture.height()
                || response.claim() != fixture.claim
                || response.certificate.claim != expected
            {
                warn!(from = sender.0, "Received unexpected NL_Response");
                continue;
            }
            if response.certificate.signer_count() < quorum {
                warn!(
                    from = sender.0,
                    signers = response.certificate.signer_count(),
                    quorum,
                    "NL_Response certificate below quorum"
                );
                continue;
            }
            if let Err(e) = response
                .certificate
                .verify(self.topology().global_key_table())
            {
                warn!(from = sender.0, error = %e, "Invalid NL_Response certificate");
                continue;
            }
            debug!(from = sender.0, "Accepted NL_Response");
            return Ok(response.certificate);
        }
    }

    /// Collect `F+1` verified NoLiveness claims from the reporting shard and
    /// aggregate them into a certificate over global ids.
    async fn certify_claims(&self, fixture: &NlFixture) -> Result<QuorumCertificate, LivenessError> {
        let message = signing::claim_message(fixture.height(), &fixture.claim);
        let mut tracker: QuorumTracker<Signature> = QuorumTracker::new(self.topology().weak_quorum());
        loop {
            let (sender, claim) =
                receive::<NoLiveness, LivenessError>(self.participant.transport.as_ref(), &protocol_round())
                    .await?;
            if claim.shard != fixture.shard_id()
                || claim.height != fixture.height()
                || claim.claim() != fixture.claim
            {
                warn!(from = sender.0, "Received unexpected NoLiveness");
                continue;
            }
            if !self.signed_by(sender, fixture.shard_id(), &message, &claim.signature) {
                warn!(from = sender.0, "Invalid NoLiveness signature");
                continue;
            }
            if tracker.insert(sender, claim.signature) {
                debug!(from = sender.0, count = tracker.len(), "Accepted NoLiveness");
            }
            if tracker.is_complete() {
                break;
            }
        }

        let collected = tracker.into_values();
        let signers = SignerBitfield::from_indices(
            self.topology().total_nodes(),
            collected.iter().map(|(node, _)| node.as_index()),
        );
        let signatures: Vec<Signature> = collected.into_iter().map(|(_, sig)| sig).collect();
        Ok(QuorumCertificate::aggregate(message, signers, &signatures)?)
    }

    /// Block until `F+1` verified NL_Confirm from the reporting shard.
    async fn await_confirms(&self, fixture: &NlFixture) -> Result<(), LivenessError> {
        let message = signing::claim_message(fixture.height(), &fixture.claim);
        let mut tracker = QuorumTracker::new(self.topology().weak_quorum());
        loop {
            let (sender, confirm) =
                receive::<NlConfirm, LivenessError>(self.participant.transport.as_ref(), &protocol_round())
                    .await?;
            if confirm.shard != fixture.shard_id()
                || confirm.height != fixture.height()
                || confirm.claim() != fixture.claim
            {
                warn!(from = sender.0, "Received unexpected NL_Confirm");
                continue;
            }
            if !self.signed_by(sender, fixture.shard_id(), &message, &confirm.signature) {
                warn!(from = sender.0, "Invalid NL_Confirm signature");
                continue;
            }
            tracker.insert(sender, ());
            if tracker.is_complete() {
                debug!(confirms = tracker.len(), "Received F+1 NL_Confirm");
                return Ok(());
            }
        }
    }

    async fn commit(
        &self,
        role: NlRole,
        fixture: &NlFixture,
        started: Instant,
    ) -> Result<NlOutcome, LivenessError> {
        let record = liveness_record(fixture.shard_id(), fixture.height(), &fixture.claim);
        let committed = self
            .bft
            .run(
                RoundId::tagged(LIVENESS_BFT_TAG, PROTOCOL_EPOCH),
                vec![record.clone()],
            )
            .await?;
        let elapsed = started.elapsed();
        info!(
            node = self.local_node().0,
            %role,
            committed = committed.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "NL committed"
        );
        Ok(NlOutcome {
            role,
            record,
            committed,
            elapsed,
        })
    }

    /// Whether `sender` is a member of `shard` and signed `message`.
    fn signed_by(&self, sender: NodeId, shard: ShardId, message: &[u8], signature: &Signature) -> bool {
        self.topology().shard_of(sender) == shard
            && self
                .topology()
                .public_key(sender)
                .is_some_and(|key| key.verify(message, signature))
    }

    fn topology(&self) -> &dyn Topology {
        self.participant.topology.as_ref()
    }

    fn local_node(&self) -> NodeId {
        self.topology().local_node()
    }
}
