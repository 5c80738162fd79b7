//! Error types for circuit-switch.

use circuit_common::TransportError;
use circuit_protocol::{CircuitState, ProtocolError};
use thiserror::Error;

/// Errors from the light switch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SwitchError {
    /// Level above 100.
    #[error("invalid level {0} (max 100)")]
    InvalidLevel(u8),

    /// State that cannot be requested.
    #[error("state {0} cannot be requested")]
    InvalidState(CircuitState),

    /// The binding refused an operation.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The command could not be encoded.
    #[error("encoding error: {0}")]
    Encoding(#[from] ProtocolError),
}

impl SwitchError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            SwitchError::InvalidLevel(_) | SwitchError::InvalidState(_) => "invalid_request",
            SwitchError::Transport(TransportError::NoMemory) => "no_memory",
            SwitchError::Transport(_) => "transport",
            SwitchError::Encoding(_) => "encoding",
        }
    }
}

/// Result type alias for switch operations.
pub type SwitchResult<T> = Result<T, SwitchError>;
