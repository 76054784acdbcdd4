//! Network messages for the Kronos protocols.
//!
//! A [`Message`] envelope carries a message type, the round it belongs to,
//! the sender and a bincode-encoded payload. Payload types implement
//! [`Payload`], which ties each of them to exactly one [`MessageType`], so
//! `Message::encapsulate(round, sender, &payload)` and
//! `message.decapsulate::<P>()` cannot disagree about the schema.

mod codec;
mod envelope;
pub mod payloads;

pub use codec::CodecError;
pub use envelope::{Message, MessageType, Payload};
pub use payloads::{
    InputBftResult, NlConfirm, NlResponse, NoLiveness, NoSafety, NsChoice, RcCheckOk, RcNewEpoch,
    ReConfig, TxsInform,
};
