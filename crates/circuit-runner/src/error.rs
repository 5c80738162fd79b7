//! Error types for circuit-runner.

use circuit_common::TransportError;
use circuit_controller::ControllerError;
use circuit_protocol::ProtocolError;
use circuit_switch::SwitchError;
use thiserror::Error;

/// Errors running a simulation.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// I/O error reading a scenario.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Scenario file could not be parsed.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Report could not be serialised.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The controller could not be created or refused a local change.
    #[error("controller error: {0}")]
    Controller(#[from] ControllerError),

    /// The switch could not be created or refused a change.
    #[error("switch error: {0}")]
    Switch(#[from] SwitchError),

    /// The loopback transport refused an injected message.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A command or snapshot could not be encoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A command step's expiry does not fit in microseconds since the epoch.
    #[error("step {step}: expiry offset {offset_ms} ms out of range")]
    ExpiryOutOfRange {
        /// 1-based step number.
        step: usize,
        /// Offset from the scenario.
        offset_ms: i64,
    },

    /// Deliveries kept coming after the round limit.
    #[error("simulation did not settle after {0} rounds")]
    NotQuiescent(usize),

    /// An `expect` step did not hold.
    #[error("step {step}: expected {field} {expected}, found {actual}")]
    ExpectationFailed {
        /// 1-based step number.
        step: usize,
        /// Checked field.
        field: &'static str,
        /// Expected value.
        expected: String,
        /// Actual value.
        actual: String,
    },

    /// The thread running a UI step panicked.
    #[error("UI thread panicked")]
    UiThreadPanicked,
}

/// Result type alias for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;
