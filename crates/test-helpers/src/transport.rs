use async_trait::async_trait;
use kronos_core::{MailboxRegistry, Transport, TransportError};
use kronos_messages::{Message, MessageType};
use kronos_types::{RoundId, ShardId};
use parking_lot::Mutex;

/// One node's view of the network, driven by the test.
///
/// Nothing sent is delivered anywhere; tests inspect it through
/// [`broadcasts`](Self::broadcasts) and [`shard_sent`](Self::shard_sent)
/// and feed the node with [`inject`](Self::inject).
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    inbox: MailboxRegistry,
    broadcasts: Mutex<Vec<Message>>,
    shard_sent: Mutex<Vec<(Message, ShardId)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `message` available to `get_message`.
    pub fn inject(&self, message: Message) {
        self.inbox.deliver(message);
    }

    /// Messages passed to `broadcast`, in order.
    pub fn broadcasts(&self) -> Vec<Message> {
        self.broadcasts.lock().clone()
    }

    /// Messages passed to `shard_broadcast` with their destination, in order.
    pub fn shard_sent(&self) -> Vec<(Message, ShardId)> {
        self.shard_sent.lock().clone()
    }

    /// Injected messages not yet received.
    pub fn pending(&self, message_type: MessageType, round: &RoundId) -> usize {
        self.inbox.pending(message_type, round)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn broadcast(&self, message: Message) -> Result<(), TransportError> {
        self.broadcasts.lock().push(message);
        Ok(())
    }

    async fn shard_broadcast(&self, message: Message, shard: ShardId) -> Result<(), TransportError> {
        self.shard_sent.lock().push((message, shard));
        Ok(())
    }

    async fn get_message(
        &self,
        message_type: MessageType,
        round: &RoundId,
    ) -> Result<Message, TransportError> {
        Ok(self.inbox.recv(message_type, round).await)
    }
}
