//! Sequencer errors.

use kronos_core::{BftError, TransportError};
use kronos_messages::CodecError;
use thiserror::Error;

/// Fatal errors of a sequencer role.
#[derive(Debug, Error)]
pub enum KronosError {
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    #[error("protocol violation: {0}")]
    Codec(#[from] CodecError),

    #[error("ordering: {0}")]
    Bft(#[from] BftError),

    #[error("{0} task panicked or was aborted")]
    TaskFailed(&'static str),
}
