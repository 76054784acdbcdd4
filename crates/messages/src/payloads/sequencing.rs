//! Cross-shard sequencing payloads.

use crate::{MessageType, Payload};
use bincode::{Decode, Encode};
use kronos_types::Record;

/// Records an output shard asks one input shard to order.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct TxsInform {
    pub records: Vec<Record>,
}

impl TxsInform {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }
}

impl Payload for TxsInform {
    const MESSAGE_TYPE: MessageType = MessageType::TxsInform;
}

/// Records an input shard finalized for one output shard.
///
/// Sent even when empty so the destination can count senders.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct InputBftResult {
    pub records: Vec<Record>,
}

impl InputBftResult {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }
}

impl Payload for InputBftResult {
    const MESSAGE_TYPE: MessageType = MessageType::InputBftResult;
}
