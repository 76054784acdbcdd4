//! Per-`(type, round)` receive queues.
//!
//! A transport delivers every incoming message into the registry and serves
//! [`Transport::get_message`](crate::Transport::get_message) from it. Queues
//! are created on first delivery or first wait and removed once they are
//! drained and nobody waits on them, so finished rounds leave nothing
//! behind.

use kronos_messages::{Message, MessageType};
use kronos_types::RoundId;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::trace;

type MailboxKey = (MessageType, RoundId);

#[derive(Default)]
struct Slot {
    queue: VecDeque<Message>,
    /// Receivers registered on `notify` and not yet back under the lock.
    waiters: usize,
    notify: Arc<Notify>,
}

/// Registry of blocking receive queues keyed by message type and round.
#[derive(Default)]
pub struct MailboxRegistry {
    slots: Mutex<HashMap<MailboxKey, Slot>>,
}

impl MailboxRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `message` and wake one receiver waiting for its key.
    pub fn deliver(&self, message: Message) {
        let key = (message.message_type(), message.round().clone());
        let mut slots = self.slots.lock();
        let slot = slots.entry(key).or_default();
        slot.queue.push_back(message);
        slot.notify.notify_one();
    }

    /// Wait for the next message of `message_type` in `round`.
    ///
    /// Any number of receivers may wait on the same key; each delivered
    /// message goes to exactly one of them. Dropping the future (for example
    /// on a timeout) deregisters the receiver.
    pub async fn recv(&self, message_type: MessageType, round: &RoundId) -> Message {
        let key = (message_type, round.clone());
        let mut waiter = Waiter {
            registry: self,
            key: &key,
            registered: false,
        };
        loop {
            let notify = {
                let mut slots = self.slots.lock();
                let slot = slots.entry(key.clone()).or_default();
                if waiter.registered {
                    slot.waiters -= 1;
                    waiter.registered = false;
                }

                if let Some(message) = slot.queue.pop_front() {
                    if !slot.queue.is_empty() {
                        // Pass the wakeup on; notify_one keeps at most one permit.
                        slot.notify.notify_one();
                    } else if slot.waiters == 0 {
                        slots.remove(&key);
                    }
                    return message;
                }

                slot.waiters += 1;
                waiter.registered = true;
                slot.notify.clone()
            };

            trace!(message_type = %message_type, round = %round, "Waiting for message");
            notify.notified().await;
        }
    }

    /// Number of queued messages for a key.
    pub fn pending(&self, message_type: MessageType, round: &RoundId) -> usize {
        self.slots
            .lock()
            .get(&(message_type, round.clone()))
            .map_or(0, |slot| slot.queue.len())
    }

    /// Number of live queues.
    pub fn open_mailboxes(&self) -> usize {
        self.slots.lock().len()
    }
}

/// Deregisters a receiver whose `recv` future is dropped while waiting.
struct Waiter<'a> {
    registry: &'a MailboxRegistry,
    key: &'a MailboxKey,
    registered: bool,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        if !self.registered {
            return;
        }
        let mut slots = self.registry.slots.lock();
        let remove = match slots.get_mut(self.key) {
            Some(slot) => {
                slot.waiters -= 1;
                if !slot.queue.is_empty() {
                    slot.notify.notify_one();
                }
                slot.queue.is_empty() && slot.waiters == 0
            }
            None => false,
        };
        if remove {
            slots.remove(self.key);
        }
    }
}

impl std::fmt::Debug for MailboxRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxRegistry")
            .field("open_mailboxes", &self.open_mailboxes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kronos_messages::{InputBftResult, TxsInform};
    use kronos_types::test_utils::test_cross_record;
    use kronos_types::NodeId;
    use std::time::Duration;

    fn inform(round: u32, sender: u32) -> Message {
        Message::encapsulate(RoundId::epoch(round), NodeId(sender), &TxsInform::new(vec![])).unwrap()
    }

    #[tokio::test]
    async fn test_out_of_order_rounds() {
        let registry = MailboxRegistry::new();
        registry.deliver(inform(2, 0));
        registry.deliver(inform(1, 1));

        let first = registry.recv(MessageType::TxsInform, &RoundId::epoch(1)).await;
        assert_eq!(first.sender(), NodeId(1));
        assert_eq!(registry.pending(MessageType::TxsInform, &RoundId::epoch(2)), 1);

        let second = registry.recv(MessageType::TxsInform, &RoundId::epoch(2)).await;
        assert_eq!(second.sender(), NodeId(0));
    }

    #[tokio::test]
    async fn test_types_do_not_mix() {
        let registry = MailboxRegistry::new();
        let result = Message::encapsulate(
            RoundId::epoch(1),
            NodeId(3),
            &InputBftResult::new(vec![test_cross_record("x", &[0], 1)]),
        )
        .unwrap();
        registry.deliver(inform(1, 0));
        registry.deliver(result);

        let got = registry.recv(MessageType::InputBftResult, &RoundId::epoch(1)).await;
        assert_eq!(got.sender(), NodeId(3));
        assert_eq!(registry.pending(MessageType::TxsInform, &RoundId::epoch(1)), 1);
    }

    #[tokio::test]
    async fn test_queues_are_collected_after_drain() {
        let registry = MailboxRegistry::new();
        registry.deliver(inform(1, 0));
        registry.deliver(inform(1, 1));
        assert_eq!(registry.open_mailboxes(), 1);

        registry.recv(MessageType::TxsInform, &RoundId::epoch(1)).await;
        assert_eq!(registry.open_mailboxes(), 1);
        registry.recv(MessageType::TxsInform, &RoundId::epoch(1)).await;
        assert_eq!(registry.open_mailboxes(), 0);
    }

    #[tokio::test]
    async fn test_receiver_blocks_until_delivery() {
        let registry = Arc::new(MailboxRegistry::new());

        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.recv(MessageType::TxsInform, &RoundId::epoch(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        registry.deliver(inform(5, 7));
        let got = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.sender(), NodeId(7));
        assert_eq!(registry.open_mailboxes(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_waiters_each_get_one() {
        let registry = Arc::new(MailboxRegistry::new());
        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    registry
                        .recv(MessageType::TxsInform, &RoundId::epoch(1))
                        .await
                        .sender()
                })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        for sender in 0..8 {
            registry.deliver(inform(1, sender));
        }

        let mut senders = Vec::new();
        for waiter in waiters {
            let sender = tokio::time::timeout(Duration::from_secs(5), waiter)
                .await
                .unwrap()
                .unwrap();
            senders.push(sender.0);
        }
        senders.sort_unstable();
        assert_eq!(senders, (0..8).collect::<Vec<_>>());
        assert_eq!(registry.open_mailboxes(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_receiver_releases_queue() {
        let registry = MailboxRegistry::new();

        let timed_out = tokio::time::timeout(
            Duration::from_millis(20),
            registry.recv(MessageType::TxsInform, &RoundId::epoch(3)),
        )
        .await;
        assert!(timed_out.is_err());
        assert_eq!(registry.open_mailboxes(), 0);

        // A later delivery is still collected once drained.
        registry.deliver(inform(3, 2));
        let got = registry.recv(MessageType::TxsInform, &RoundId::epoch(3)).await;
        assert_eq!(got.sender(), NodeId(2));
        assert_eq!(registry.open_mailboxes(), 0);
    }
}
