//! Light controller.
//!
//! Owns the authoritative state of one light, publishes it through the
//! LogicalCircuitStateTrait and accepts SetLogicalCircuitState commands through the
//! LogicalCircuitControlTrait. Every command is answered exactly once, with either the
//! new trait version or a status report; rejected commands leave the light untouched.

mod config;
mod controller;
mod error;
mod light;
mod processor;
mod publication;

#[cfg(test)]
mod test_support;

pub use config::*;
pub use controller::*;
pub use error::*;
pub use light::*;
pub use processor::*;
pub use publication::*;
