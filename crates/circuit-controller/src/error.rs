//! Error types for circuit-controller.

use circuit_common::PublishError;
use circuit_protocol::{CircuitState, ProtocolError};
use thiserror::Error;

/// Errors from the light controller's local operations.
///
/// Remote commands never produce these; they are answered with a status report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    /// Level above 100.
    #[error("invalid level {0} (max 100)")]
    InvalidLevel(u8),

    /// State that cannot be requested.
    #[error("state {0} cannot be set")]
    InvalidState(CircuitState),

    /// Publishing a trait failed during initialisation.
    #[error("failed to publish trait: {0}")]
    Publish(#[from] PublishError),

    /// Property data could not be encoded.
    #[error("failed to encode property data: {0}")]
    Encoding(#[from] ProtocolError),
}

/// Result type alias for controller operations.
pub type ControllerResult<T> = Result<T, ControllerError>;
