//! Reconfiguration protocol (RC).
//!
//! Starters (every node of the shard asking to be reconfigured) broadcast a
//! signed request; then every node walks the same three gates:
//!
//! 1. `2F+1` verified ReConfig requests from members of the shard, matching
//!    shard, height and claim.
//! 2. Broadcast RC_CheckOK over `(height, claim, new_nodes)`; wait for
//!    `2F_global+1` valid ones.
//! 3. Broadcast RC_NewEpoch over `new_nodes`; wait for `2F_global+1` valid
//!    ones for the same shard and node set.
//!
//! The node set is then committed. There is no ordering pass and no
//! rollback: a gate that never fills blocks forever.

use crate::{protocol_round, Participant, RcFixture, ReconfigError};
use kronos_core::{broadcast_payload, receive};
use kronos_messages::{RcCheckOk, RcNewEpoch, ReConfig};
use kronos_types::{signing, NodeId, QuorumTracker, ShardId, Signature, SignerBitfield, Topology};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RcRole {
    Starter,
    Helper,
}

impl fmt::Display for RcRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RcRole::Starter => write!(f, "starter"),
            RcRole::Helper => write!(f, "helper"),
        }
    }
}

/// The membership a node committed.
#[derive(Debug, Clone)]
pub struct ReconfigOutcome {
    pub role: RcRole,
    pub shard: ShardId,
    /// New members as a bitfield over global ids.
    pub new_nodes: SignerBitfield,
    pub elapsed: Duration,
}

impl ReconfigOutcome {
    pub fn members(&self) -> Vec<NodeId> {
        self.new_nodes
            .set_indices()
            .map(|i| NodeId(i as u32))
            .collect()
    }
}

/// One node's RC instance.
pub struct ReconfigProtocol {
    participant: Participant,
}

impl ReconfigProtocol {
    pub fn new(participant: Participant) -> Self {
        Self { participant }
    }

    pub async fn run(&self, fixture: &RcFixture) -> Result<ReconfigOutcome, ReconfigError> {
        let role = if self.topology().local_shard() == fixture.shard_id() {
            RcRole::Starter
        } else {
            RcRole::Helper
        };
        let started = Instant::now();
        info!(node = self.local_node().0, shard = fixture.shard, %role, "Starting RC");

        if role == RcRole::Starter {
            let signature = self
                .participant
                .keypair
                .sign(&signing::claim_message(fixture.height(), &fixture.claim));
            broadcast_payload::<_, ReconfigError>(
                self.participant.transport.as_ref(),
                protocol_round(),
                self.local_node(),
                &ReConfig::new(fixture.shard_id(), fixture.height(), &fixture.claim, signature),
            )
            .await?;
        }

        self.await_requests(fixture).await?;

        let new_nodes = fixture.new_node_set(self.topology().total_nodes());
        let check = RcCheckOk::new(
            fixture.shard_id(),
            fixture.height(),
            &fixture.claim,
            new_nodes.clone(),
            self.participant.keypair.sign(&signing::reconfig_check_message(
                fixture.height(),
                &fixture.claim,
                &new_nodes,
            )),
        );
        broadcast_payload::<_, ReconfigError>(
            self.participant.transport.as_ref(),
            protocol_round(),
            self.local_node(),
            &check,
        )
        .await?;
        self.await_checks(fixture).await?;

        let new_epoch = RcNewEpoch::new(
            fixture.shard_id(),
            new_nodes.clone(),
            self.participant
                .keypair
                .sign(&signing::new_epoch_message(&new_nodes)),
        );
        broadcast_payload::<_, ReconfigError>(
            self.participant.transport.as_ref(),
            protocol_round(),
            self.local_node(),
            &new_epoch,
        )
        .await?;
        self.await_new_epochs(fixture.shard_id(), &new_nodes).await?;

        let elapsed = started.elapsed();
        info!(
            node = self.local_node().0,
            shard = fixture.shard,
            %new_nodes,
            elapsed_ms = elapsed.as_millis() as u64,
            "RC committed new membership"
        );
        Ok(ReconfigOutcome {
            role,
            shard: fixture.shard_id(),
            new_nodes,
            elapsed,
        })
    }

    /// Gate 1: `2F+1` verified requests from members of the shard.
    async fn await_requests(&self, fixture: &RcFixture) -> Result<(), ReconfigError> {
        let mut tracker = QuorumTracker::new(self.topology().shard_quorum());
        loop {
            let (sender, request) =
                receive::<ReConfig, ReconfigError>(self.participant.transport.as_ref(), &protocol_round())
                    .await?;
            if request.shard != fixture.shard_id()
                || request.height != fixture.height()
                || request.claim() != fixture.claim
            {
                warn!(from = sender.0, "Received unexpected ReConfig");
                continue;
            }
            if self.topology().shard_of(sender) != fixture.shard_id() {
                warn!(from = sender.0, "ReConfig from outside the shard");
                continue;
            }
            if !self.verify(sender, &request.signing_message(), &request.signature) {
                warn!(from = sender.0, "Invalid ReConfig signature");
                continue;
            }
            tracker.insert(sender, ());
            if tracker.is_complete() {
                debug!(requests = tracker.len(), "Received 2F+1 ReConfig");
                return Ok(());
            }
        }
    }

    /// Gate 2: `2F_global+1` valid approvals.
    async fn await_checks(&self, fixture: &RcFixture) -> Result<(), ReconfigError> {
        let mut tracker = QuorumTracker::new(self.topology().global_quorum());
        loop {
            let (sender, check) =
                receive::<RcCheckOk, ReconfigError>(self.participant.transport.as_ref(), &protocol_round())
                    .await?;
            if check.shard != fixture.shard_id()
                || check.height != fixture.height()
                || check.claim() != fixture.claim
            {
                warn!(from = sender.0, "Received unexpected RC_CheckOK");
                continue;
            }
            if !self.verify(sender, &check.signing_message(), &check.signature) {
                warn!(from = sender.0, "Invalid RC_CheckOK signature");
                continue;
            }
            tracker.insert(sender, ());
            if tracker.is_complete() {
                debug!(approvals = tracker.len(), "Received 2F+1 RC_CheckOK");
                return Ok(());
            }
        }
    }

    /// Gate 3: `2F_global+1` valid commitments to the same node set.
    async fn await_new_epochs(
        &self,
        shard: ShardId,
        new_nodes: &SignerBitfield,
    ) -> Result<(), ReconfigError> {
        let mut tracker = QuorumTracker::new(self.topology().global_quorum());
        loop {
            let (sender, epoch) =
                receive::<RcNewEpoch, ReconfigError>(self.participant.transport.as_ref(), &protocol_round())
                    .await?;
            if epoch.shard != shard || epoch.new_nodes != *new_nodes {
                warn!(from = sender.0, "Received unexpected RC_NewEpoch");
                continue;
            }
            if !self.verify(sender, &epoch.signing_message(), &epoch.signature) {
                warn!(from = sender.0, "Invalid RC_NewEpoch signature");
                continue;
            }
            tracker.insert(sender, ());
            if tracker.is_complete() {
                debug!(commitments = tracker.len(), "Received 2F+1 RC_NewEpoch");
                return Ok(());
            }
        }
    }

    fn verify(&self, sender: NodeId, message: &[u8], signature: &Signature) -> bool {
        self.topology()
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

#[cfg(test)]
mod tests {
    use super::*;
    use kronos_messages::{Message, MessageType};
    use kronos_test_helpers::{ScriptedTransport, TestCommittee};
    use kronos_types::Height;
    use std::sync::Arc;
    use tokio::task::JoinHandle;

    // N = 4, F = 1, M = 2: 2F+1 = 3; F_global = 2, 2F_global+1 = 5.
    fn committee() -> TestCommittee {
        TestCommittee::new(4, 1, 2)
    }

    fn fixture() -> RcFixture {
        RcFixture {
            shard: 0,
            height: 12,
            claim: 77u32.into(),
            new_nodes: vec![0, 1, 2, 7],
        }
    }

    fn request(committee: &TestCommittee, sender: u32) -> Message {
        let f = fixture();
        let sig = committee
            .keypair(sender)
            .sign(&signing::claim_message(Height(12), &f.claim));
        Message::encapsulate(
            protocol_round(),
            NodeId(sender),
            &ReConfig::new(f.shard_id(), f.height(), &f.claim, sig),
        )
        .unwrap()
    }

    fn check(committee: &TestCommittee, sender: u32) -> Message {
        let f = fixture();
        let nodes = f.new_node_set(committee.len());
        let sig = committee
            .keypair(sender)
            .sign(&signing::reconfig_check_message(f.height(), &f.claim, &nodes));
        Message::encapsulate(
            protocol_round(),
            NodeId(sender),
            &RcCheckOk::new(f.shard_id(), f.height(), &f.claim, nodes, sig),
        )
        .unwrap()
    }

    fn new_epoch(committee: &TestCommittee, sender: u32, nodes: SignerBitfield) -> Message {
        let sig = committee
            .keypair(sender)
            .sign(&signing::new_epoch_message(&nodes));
        Message::encapsulate(
            protocol_round(),
            NodeId(sender),
            &RcNewEpoch::new(ShardId(0), nodes, sig),
        )
        .unwrap()
    }

    fn spawn_run(
        committee: &TestCommittee,
        node: u32,
    ) -> (Arc<ScriptedTransport>, JoinHandle<Result<ReconfigOutcome, ReconfigError>>) {
        let transport = Arc::new(ScriptedTransport::new());
        let protocol = ReconfigProtocol::new(Participant::new(
            committee.topology(node).into_arc(),
            transport.clone(),
            Arc::new(committee.keypair(node).clone()),
        ));
        let handle = tokio::spawn(async move { protocol.run(&fixture()).await });
        (transport, handle)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    fn sent_types(transport: &ScriptedTransport) -> Vec<MessageType> {
        transport
            .broadcasts()
            .iter()
            .map(Message::message_type)
            .collect()
    }

    #[tokio::test]
    async fn test_gates_open_exactly_at_threshold() {
        let committee = committee();
        let (transport, handle) = spawn_run(&committee, 5);
        settle().await;
        // Helpers do not send a request of their own.
        assert!(transport.broadcasts().is_empty());

        // Gate 1: 2F = 2 requests are not enough.
        transport.inject(request(&committee, 0));
        transport.inject(request(&committee, 1));
        transport.inject(request(&committee, 1));
        settle().await;
        assert!(transport.broadcasts().is_empty());
        transport.inject(request(&committee, 2));
        settle().await;
        assert_eq!(sent_types(&transport), vec![MessageType::RcCheckOk]);

        // Gate 2: 2F_global = 4 approvals are not enough.
        for sender in [0, 1, 4, 5] {
            transport.inject(check(&committee, sender));
        }
        settle().await;
        assert_eq!(transport.broadcasts().len(), 1);
        transport.inject(check(&committee, 6));
        settle().await;
        assert_eq!(
            sent_types(&transport),
            vec![MessageType::RcCheckOk, MessageType::RcNewEpoch]
        );

        // Gate 3: a different node set does not count.
        let nodes = fixture().new_node_set(committee.len());
        let other = SignerBitfield::from_indices(committee.len(), [3]);
        transport.inject(new_epoch(&committee, 7, other));
        for sender in [0, 2, 3, 4] {
            transport.inject(new_epoch(&committee, sender, nodes.clone()));
        }
        settle().await;
        assert!(!handle.is_finished());
        transport.inject(new_epoch(&committee, 5, nodes.clone()));

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.role, RcRole::Helper);
        assert_eq!(outcome.new_nodes, nodes);
        assert_eq!(
            outcome.members(),
            vec![NodeId(0), NodeId(1), NodeId(2), NodeId(7)]
        );
    }

    #[tokio::test]
    async fn test_starter_broadcasts_signed_request() {
        let committee = committee();
        let (transport, handle) = spawn_run(&committee, 2);
        settle().await;

        let sent = transport.broadcasts();
        assert_eq!(sent.len(), 1);
        let sent_request = sent[0].decapsulate::<ReConfig>().unwrap();
        assert!(committee
            .keypair(2)
            .public_key()
            .verify(&sent_request.signing_message(), &sent_request.signature));

        // A forged request does not count towards gate 1.
        let mut forged = sent_request.clone();
        forged.signature = committee.keypair(3).sign(b"forged");
        transport.inject(Message::encapsulate(protocol_round(), NodeId(3), &forged).unwrap());
        transport.inject(request(&committee, 0));
        transport.inject(request(&committee, 1));
        settle().await;
        assert_eq!(transport.broadcasts().len(), 1);
        handle.abort();
    }

    #[tokio::test]
    async fn test_requests_from_other_shards_do_not_open_gate() {
        let committee = committee();
        let (transport, handle) = spawn_run(&committee, 5);
        settle().await;

        // Validly signed, but nodes 4 and 6 belong to shard 1.
        transport.inject(request(&committee, 0));
        transport.inject(request(&committee, 4));
        transport.inject(request(&committee, 6));
        settle().await;
        assert!(transport.broadcasts().is_empty());

        transport.inject(request(&committee, 1));
        transport.inject(request(&committee, 3));
        settle().await;
        assert_eq!(sent_types(&transport), vec![MessageType::RcCheckOk]);
        handle.abort();
    }

    #[tokio::test]
    async fn test_check_for_other_height_does_not_count() {
        let committee = committee();
        let (transport, handle) = spawn_run(&committee, 5);
        for sender in [0, 1, 2] {
            transport.inject(request(&committee, sender));
        }
        settle().await;
        assert_eq!(transport.broadcasts().len(), 1);

        let f = fixture();
        let nodes = f.new_node_set(committee.len());
        for sender in [0, 1, 2, 3, 4] {
            let sig = committee
                .keypair(sender)
                .sign(&signing::reconfig_check_message(Height(13), &f.claim, &nodes));
            let stale = RcCheckOk::new(f.shard_id(), Height(13), &f.claim, nodes.clone(), sig);
            transport.inject(Message::encapsulate(protocol_round(), NodeId(sender), &stale).unwrap());
        }
        settle().await;
        assert_eq!(sent_types(&transport), vec![MessageType::RcCheckOk]);

        for sender in [0, 1, 2, 3, 4] {
            transport.inject(check(&committee, sender));
        }
        settle().await;
        assert_eq!(
            sent_types(&transport),
            vec![MessageType::RcCheckOk, MessageType::RcNewEpoch]
        );
        handle.abort();
    }
}
