//! The message envelope and the closed set of message types.

use crate::codec::{self, CodecError};
use bincode::{Decode, Encode};
use kronos_types::{NodeId, RoundId};
use std::fmt;

/// Every message type the Kronos protocols exchange.
///
/// Intra-shard consensus traffic belongs to the ordering engine and is not
/// part of this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageType {
    TxsInform,
    InputBftResult,
    NoLiveness,
    NlResponse,
    NlConfirm,
    NoSafety,
    NsChoice,
    ReConfig,
    RcCheckOk,
    RcNewEpoch,
}

impl MessageType {
    /// All message types.
    pub const ALL: [MessageType; 10] = [
        MessageType::TxsInform,
        MessageType::InputBftResult,
        MessageType::NoLiveness,
        MessageType::NlResponse,
        MessageType::NlConfirm,
        MessageType::NoSafety,
        MessageType::NsChoice,
        MessageType::ReConfig,
        MessageType::RcCheckOk,
        MessageType::RcNewEpoch,
    ];

    /// Stable wire tag.
    pub fn tag(&self) -> &'static str {
        match self {
            MessageType::TxsInform => "TXs_Inform",
            MessageType::InputBftResult => "InputBFT_Result",
            MessageType::NoLiveness => "NoLiveness",
            MessageType::NlResponse => "NL_Response",
            MessageType::NlConfirm => "NL_Confirm",
            MessageType::NoSafety => "NoSafety",
            MessageType::NsChoice => "NS_Choice",
            MessageType::ReConfig => "ReConfig",
            MessageType::RcCheckOk => "RC_CheckOK",
            MessageType::RcNewEpoch => "RC_NewEpoch",
        }
    }

    /// Look up a type by wire tag.
    pub fn from_tag(tag: &str) -> Result<Self, CodecError> {
        Self::ALL
            .into_iter()
            .find(|t| t.tag() == tag)
            .ok_or_else(|| CodecError::UnknownTag(tag.to_string()))
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A typed payload bound to exactly one [`MessageType`].
pub trait Payload: Encode + Decode<()> + Sized {
    /// The message type this payload travels as.
    const MESSAGE_TYPE: MessageType;
}

/// A protocol message: type, round, sender and an encoded payload.
///
/// Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    message_type: MessageType,
    round: RoundId,
    sender: NodeId,
    payload: Vec<u8>,
}

/// On-the-wire form; the type travels as its tag.
#[derive(Encode, Decode)]
struct WireEnvelope {
    tag: String,
    round: RoundId,
    sender: u32,
    payload: Vec<u8>,
}

impl Message {
    /// Encode `payload` into an envelope tagged with its message type.
    pub fn encapsulate<P: Payload>(
        round: RoundId,
        sender: NodeId,
        payload: &P,
    ) -> Result<Self, CodecError> {
        Ok(Self {
            message_type: P::MESSAGE_TYPE,
            round,
            sender,
            payload: codec::encode(payload)?,
        })
    }

    /// Decode the payload as `P`.
    ///
    /// Fails if the envelope carries a different message type or the bytes
    /// do not match `P`'s schema.
    pub fn decapsulate<P: Payload>(&self) -> Result<P, CodecError> {
        if self.message_type != P::MESSAGE_TYPE {
            return Err(CodecError::TypeMismatch {
                expected: P::MESSAGE_TYPE.tag(),
                actual: self.message_type.tag(),
            });
        }
        codec::decode(&self.payload)
    }

    /// Message type.
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// Round the message belongs to.
    pub fn round(&self) -> &RoundId {
        &self.round
    }

    /// Sending node.
    pub fn sender(&self) -> NodeId {
        self.sender
    }

    /// Encoded payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Encode the whole envelope for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        codec::encode(&WireEnvelope {
            tag: self.message_type.tag().to_string(),
            round: self.round.clone(),
            sender: self.sender.0,
            payload: self.payload.clone(),
        })
    }

    /// Decode an envelope from the wire.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let wire: WireEnvelope = codec::decode(bytes)?;
        Ok(Self {
            message_type: MessageType::from_tag(&wire.tag)?,
            round: wire.round,
            sender: NodeId(wire.sender),
            payload: wire.payload,
        })
    }
}
