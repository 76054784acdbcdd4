//! Seams to the outside world: the network and the ordering service.

use crate::{BftError, TransportError};
use async_trait::async_trait;
use kronos_messages::{CodecError, Message, MessageType, Payload};
use kronos_types::{NodeId, Record, RoundId, ShardId};

/// Message delivery between the nodes of the committee.
///
/// Broadcasts include the sender itself. Receives block until a message of
/// the requested type and round is available; messages of other types or
/// rounds are buffered untouched. Arrival order across senders is
/// unspecified.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `message` to every node.
    async fn broadcast(&self, message: Message) -> Result<(), TransportError>;

    /// Deliver `message` to every node of `shard`.
    async fn shard_broadcast(&self, message: Message, shard: ShardId)
        -> Result<(), TransportError>;

    /// Wait for the next message of `message_type` in `round`.
    async fn get_message(
        &self,
        message_type: MessageType,
        round: &RoundId,
    ) -> Result<Message, TransportError>;
}

/// A finalizing ordering service for one committee.
///
/// Given a candidate batch, returns the totally ordered batch the committee
/// agreed on for `round`. Every honest member calling `run` for the same
/// round gets the same result.
#[async_trait]
pub trait IntraShardBft: Send + Sync {
    async fn run(&self, round: RoundId, input: Vec<Record>) -> Result<Vec<Record>, BftError>;
}

/// Encapsulate `payload` and broadcast it.
pub async fn broadcast_payload<P, E>(
    transport: &dyn Transport,
    round: RoundId,
    sender: NodeId,
    payload: &P,
) -> Result<(), E>
where
    P: Payload,
    E: From<TransportError> + From<CodecError>,
{
    let message = Message::encapsulate(round, sender, payload)?;
    transport.broadcast(message).await?;
    Ok(())
}

/// Encapsulate `payload` and send it to every node of `shard`.
pub async fn shard_broadcast_payload<P, E>(
    transport: &dyn Transport,
    round: RoundId,
    sender: NodeId,
    payload: &P,
    shard: ShardId,
) -> Result<(), E>
where
    P: Payload,
    E: From<TransportError> + From<CodecError>,
{
    let message = Message::encapsulate(round, sender, payload)?;
    transport.shard_broadcast(message, shard).await?;
    Ok(())
}

/// Wait for the next `P` in `round` and decode it.
///
/// A payload that does not decode is a contract violation and is returned
/// as an error rather than skipped.
pub async fn receive<P, E>(transport: &dyn Transport, round: &RoundId) -> Result<(NodeId, P), E>
where
    P: Payload,
    E: From<TransportError> + From<CodecError>,
{
    let message = transport.get_message(P::MESSAGE_TYPE, round).await?;
    let payload = message.decapsulate::<P>()?;
    Ok((message.sender(), payload))
}
