//! In-process message delivery.

use async_trait::async_trait;
use kronos_core::{MailboxRegistry, Transport, TransportError};
use kronos_messages::{Message, MessageType};
use kronos_types::{NodeId, RoundId, ShardId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkStats {
    /// Messages handed to the network.
    pub messages_sent: u64,
    /// Copies put into mailboxes.
    pub deliveries: u64,
    /// Encoded bytes put into mailboxes.
    pub bytes_delivered: u64,
}

#[derive(Debug)]
struct Inner {
    nodes_per_shard: u32,
    num_shards: u32,
    mailboxes: Vec<MailboxRegistry>,
    messages_sent: AtomicU64,
    deliveries: AtomicU64,
    bytes_delivered: AtomicU64,
}

/// A lossless network connecting `N*M` in-process nodes.
///
/// Every hop goes through the wire encoding, so each receiver decodes its
/// own copy exactly as it would from a socket.
#[derive(Debug, Clone)]
pub struct LocalNetwork {
    inner: Arc<Inner>,
}

impl LocalNetwork {
    pub fn new(num_shards: u32, nodes_per_shard: u32) -> Self {
        let total = (num_shards * nodes_per_shard) as usize;
        Self {
            inner: Arc::new(Inner {
                nodes_per_shard,
                num_shards,
                mailboxes: (0..total).map(|_| MailboxRegistry::new()).collect(),
                messages_sent: AtomicU64::new(0),
                deliveries: AtomicU64::new(0),
                bytes_delivered: AtomicU64::new(0),
            }),
        }
    }

    /// Node `node`'s handle on the network.
    pub fn transport(&self, node: NodeId) -> LocalTransport {
        LocalTransport {
            network: self.clone(),
            node,
        }
    }

    pub fn stats(&self) -> NetworkStats {
        NetworkStats {
            messages_sent: self.inner.messages_sent.load(Ordering::Relaxed),
            deliveries: self.inner.deliveries.load(Ordering::Relaxed),
            bytes_delivered: self.inner.bytes_delivered.load(Ordering::Relaxed),
        }
    }

    /// Messages buffered for `node` and not yet received.
    pub fn pending(&self, node: NodeId, message_type: MessageType, round: &RoundId) -> usize {
        self.inner
            .mailboxes
            .get(node.as_index())
            .map_or(0, |mailbox| mailbox.pending(message_type, round))
    }

    fn deliver(
        &self,
        message: &Message,
        recipients: std::ops::Range<usize>,
    ) -> Result<(), TransportError> {
        let bytes = message
            .to_bytes()
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.inner.messages_sent.fetch_add(1, Ordering::Relaxed);
        for index in recipients {
            let copy =
                Message::from_bytes(&bytes).map_err(|e| TransportError::SendFailed(e.to_string()))?;
            self.inner.mailboxes[index].deliver(copy);
            self.inner.deliveries.fetch_add(1, Ordering::Relaxed);
            self.inner
                .bytes_delivered
                .fetch_add(bytes.len() as u64, Ordering::Relaxed);
        }
        Ok(())
    }
}

/// One node's endpoint on a [`LocalNetwork`].
#[derive(Debug, Clone)]
pub struct LocalTransport {
    network: LocalNetwork,
    node: NodeId,
}

impl LocalTransport {
    pub fn node(&self) -> NodeId {
        self.node
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn broadcast(&self, message: Message) -> Result<(), TransportError> {
        trace!(from = self.node.0, kind = %message.message_type(), "Broadcast");
        let total = self.network.inner.mailboxes.len();
        self.network.deliver(&message, 0..total)
    }

    async fn shard_broadcast(&self, message: Message, shard: ShardId) -> Result<(), TransportError> {
        let inner = &self.network.inner;
        if shard.0 >= inner.num_shards {
            return Err(TransportError::UnknownShard(shard));
        }
        trace!(
            from = self.node.0,
            to = shard.0,
            kind = %message.message_type(),
            "Shard broadcast"
        );
        let n = inner.nodes_per_shard as usize;
        let start = shard.0 as usize * n;
        self.network.deliver(&message, start..start + n)
    }

    async fn get_message(
        &self,
        message_type: MessageType,
        round: &RoundId,
    ) -> Result<Message, TransportError> {
        let mailbox = self
            .network
            .inner
            .mailboxes
            .get(self.node.as_index())
            .ok_or(TransportError::Closed)?;
        Ok(mailbox.recv(message_type, round).await)
    }
}
