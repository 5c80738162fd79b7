//! Logical-circuit remote control protocol.
//!
//! A switch drives a light controller by sending SetLogicalCircuitState custom
//! commands addressed to the controller's LogicalCircuitControlTrait. The controller
//! publishes its state through the LogicalCircuitStateTrait and answers every command
//! with either a response carrying the trait version or a status report.
//!
//! # Message Flow
//!
//! ```text
//! switch                                 controller
//!   | -- one-way command (WDM) ----------> |
//!   |    { path, type, [expiry], [version], argument { state, level } }
//!   | <--------- response { version } ---- |   applied
//!   | <--- status report (profile, code) - |   rejected
//! ```
//!
//! # Example
//!
//! ```rust
//! use circuit_protocol::{CircuitState, CommandEnvelope, CommandRequest, SetCircuitStateArgs};
//!
//! let request = CommandRequest::set_circuit_state(SetCircuitStateArgs::new(CircuitState::On, 75));
//! let payload = request.encode().unwrap();
//!
//! let envelope = CommandEnvelope::decode(&payload).unwrap();
//! let args = SetCircuitStateArgs::decode(envelope.argument.unwrap()).unwrap();
//! assert_eq!(args.state, Some(CircuitState::On));
//! assert_eq!(args.level, Some(75));
//! ```

mod command;
mod constants;
mod error;
mod reply;
mod types;

pub use command::*;
pub use constants::*;
pub use error::*;
pub use reply::*;
pub use types::*;
