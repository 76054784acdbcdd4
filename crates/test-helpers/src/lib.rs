//! Test helpers for Kronos.
//!
//! - [`TestCommittee`]: deterministic keys and topologies for an N x M
//!   committee, plus properly signed certificates.
//! - [`ScriptedTransport`]: a single node's transport whose inbox is filled
//!   by the test and whose sends are captured.
//! - [`RecordingBft`]: an ordering service that returns its input and
//!   remembers every call.

mod bft;
mod committee;
mod transport;

pub use bft::RecordingBft;
pub use committee::TestCommittee;
pub use transport::ScriptedTransport;
