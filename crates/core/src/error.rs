//! Errors raised at the transport and ordering seams.

use kronos_types::ShardId;
use thiserror::Error;

/// Errors that can occur during network operations.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The destination shard does not exist.
    #[error("unknown shard: {0}")]
    UnknownShard(ShardId),

    /// The message could not be sent.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The network is shut down.
    #[error("network closed")]
    Closed,
}

/// Errors reported by an ordering service.
#[derive(Debug, Clone, Error)]
pub enum BftError {
    /// The instance could not reach a decision.
    #[error("ordering round {round} failed: {reason}")]
    Failed { round: String, reason: String },

    /// The ordering service is not running.
    #[error("ordering service unavailable")]
    Unavailable,
}
