//! Core seams for Kronos.
//!
//! The protocols only ever talk to two collaborators:
//!
//! - [`Transport`]: broadcast, shard broadcast and a blocking receive keyed
//!   by `(message type, round)`.
//! - [`IntraShardBft`]: a finalizing ordering service run once per round.
//!
//! [`MailboxRegistry`] is the receive side a transport can build on.

mod error;
mod mailbox;
mod traits;

pub use error::{BftError, TransportError};
pub use mailbox::MailboxRegistry;
pub use traits::{
    broadcast_payload, receive, shard_broadcast_payload, IntraShardBft, Transport,
};
