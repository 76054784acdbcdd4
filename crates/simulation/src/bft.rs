//! Deterministic stand-in for the intra-shard consensus engine.
//!
//! Every member of an [`EchoCommittee`] proposes a batch for a round; once
//! all members proposed, each of them gets the sorted, deduplicated union.
//! No faults are tolerated; it exists to drive the protocols above it.

use async_trait::async_trait;
use kronos_core::{BftError, IntraShardBft};
use kronos_types::{NodeId, Record, RoundId};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

type Decision = Option<Arc<Vec<Record>>>;

struct RoundState {
    proposals: BTreeMap<NodeId, Vec<Record>>,
    decided: watch::Sender<Decision>,
    /// Members that already took the decision.
    finished: usize,
}

struct Inner {
    members: BTreeSet<NodeId>,
    rounds: Mutex<HashMap<RoundId, RoundState>>,
}

/// The shared state of one ordering committee.
#[derive(Clone)]
pub struct EchoCommittee {
    inner: Arc<Inner>,
}

impl EchoCommittee {
    pub fn new(members: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            inner: Arc::new(Inner {
                members: members.into_iter().collect(),
                rounds: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn size(&self) -> usize {
        self.inner.members.len()
    }

    /// `node`'s handle on the committee.
    pub fn member(&self, node: NodeId) -> EchoBft {
        EchoBft {
            committee: self.clone(),
            node,
        }
    }

    /// Rounds that have not been fully read yet.
    pub fn open_rounds(&self) -> usize {
        self.inner.rounds.lock().len()
    }
}

impl std::fmt::Debug for EchoCommittee {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EchoCommittee")
            .field("members", &self.inner.members.len())
            .field("open_rounds", &self.open_rounds())
            .finish()
    }
}

/// One member of an [`EchoCommittee`].
#[derive(Debug, Clone)]
pub struct EchoBft {
    committee: EchoCommittee,
    node: NodeId,
}

#[async_trait]
impl IntraShardBft for EchoBft {
    async fn run(&self, round: RoundId, input: Vec<Record>) -> Result<Vec<Record>, BftError> {
        let inner = &self.committee.inner;
        if !inner.members.contains(&self.node) {
            return Err(BftError::Failed {
                round: round.to_string(),
                reason: format!("{} is not a committee member", self.node),
            });
        }

        let mut receiver = {
            let mut rounds = inner.rounds.lock();
            let state = rounds.entry(round.clone()).or_insert_with(|| RoundState {
                proposals: BTreeMap::new(),
                decided: watch::channel(None).0,
                finished: 0,
            });
            state.proposals.insert(self.node, input);
            let receiver = state.decided.subscribe();
            if state.proposals.len() == inner.members.len() {
                let union: BTreeSet<Record> = state.proposals.values().flatten().cloned().collect();
                debug!(round = %round, records = union.len(), "Round decided");
                state.decided.send_replace(Some(Arc::new(union.into_iter().collect())));
            }
            receiver
        };

        let decided = loop {
            let current = receiver.borrow_and_update().clone();
            if let Some(decided) = current {
                break decided;
            }
            receiver.changed().await.map_err(|_| BftError::Unavailable)?;
        };

        let mut rounds = inner.rounds.lock();
        if let Some(state) = rounds.get_mut(&round) {
            state.finished += 1;
            if state.finished == inner.members.len() {
                rounds.remove(&round);
            }
        }
        Ok(decided.as_ref().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_members_agree_on_sorted_union() {
        let committee = EchoCommittee::new([NodeId(0), NodeId(1), NodeId(2)]);
        let round = RoundId::epoch(1);

        let a = committee.member(NodeId(0));
        let b = committee.member(NodeId(1));
        let c = committee.member(NodeId(2));
        let (ra, rb, rc) = tokio::join!(
            a.run(round.clone(), vec![Record::new("z"), Record::new("a")]),
            b.run(round.clone(), vec![Record::new("m")]),
            c.run(round.clone(), vec![Record::new("a")]),
        );

        let expected = vec![Record::new("a"), Record::new("m"), Record::new("z")];
        assert_eq!(ra.unwrap(), expected);
        assert_eq!(rb.unwrap(), expected);
        assert_eq!(rc.unwrap(), expected);
        assert_eq!(committee.open_rounds(), 0);
    }

    #[tokio::test]
    async fn test_rounds_are_independent() {
        let committee = EchoCommittee::new([NodeId(0), NodeId(1)]);
        let a = committee.member(NodeId(0));
        let b = committee.member(NodeId(1));

        let pending = tokio::spawn({
            let a = a.clone();
            async move { a.run(RoundId::epoch(2), vec![Record::new("late")]).await }
        });
        let (r1, r2) = tokio::join!(
            a.run(RoundId::epoch(1), vec![Record::new("x")]),
            b.run(RoundId::epoch(1), vec![]),
        );
        assert_eq!(r1.unwrap(), vec![Record::new("x")]);
        assert_eq!(r2.unwrap(), vec![Record::new("x")]);
        assert!(!pending.is_finished());

        b.run(RoundId::epoch(2), vec![]).await.unwrap();
        assert_eq!(pending.await.unwrap().unwrap(), vec![Record::new("late")]);
    }

    #[tokio::test]
    async fn test_outsider_is_rejected() {
        let committee = EchoCommittee::new([NodeId(0)]);
        let err = committee
            .member(NodeId(5))
            .run(RoundId::epoch(1), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, BftError::Failed { .. }));
    }
}
