//! Typed payloads, one per message type.
//!
//! Claims travel as their minimal big-endian byte string and are exposed as
//! [`ClaimValue`](kronos_types::ClaimValue) through accessors.

mod liveness;
mod reconfig;
mod safety;
mod sequencing;

pub use liveness::{NlConfirm, NlResponse, NoLiveness};
pub use reconfig::{RcCheckOk, RcNewEpoch, ReConfig};
pub use safety::{NoSafety, NsChoice};
pub use sequencing::{InputBftResult, TxsInform};
